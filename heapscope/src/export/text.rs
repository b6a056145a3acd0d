use std::io::Write;
use std::sync::Arc;

use crate::classification::FrameClassifier;
use crate::domain::{AllocationRecord, RawAddress};

/// Plain-text allocation dump ("Save..." in the native heap panel)
///
/// One line per record, in the order given:
///
/// ```text
/// Z size=128 count=1 total=128 zygote=true Foo::alloc (libfoo.so) foo.c:99
///   size=64 count=10 total=640 zygote=false 40011a2c
/// ```
///
/// The trailing frame is the record's relevant frame, or its first non-null
/// raw address in hex while the record is unresolved.
#[derive(Debug, Clone, Default)]
pub struct TextExporter {
    classifier: FrameClassifier,
}

impl TextExporter {
    #[must_use]
    pub fn new(classifier: FrameClassifier) -> Self {
        Self { classifier }
    }

    /// Summary line for one record
    #[must_use]
    pub fn format_record(&self, record: &AllocationRecord) -> String {
        let top = record
            .resolved_backtrace()
            .and_then(|backtrace| self.classifier.relevant_frame(backtrace))
            .map(ToString::to_string)
            .or_else(|| record.raw_backtrace.iter().find(|a| !a.is_null()).map(|a| a.to_hex()))
            .unwrap_or_else(|| "<no backtrace>".to_string());

        format!(
            "{}size={} count={} total={} zygote={} {top}",
            if record.is_zygote_child { "Z " } else { "  " },
            record.size,
            record.count,
            record.total_size(),
            record.is_zygote_child,
        )
    }

    /// Write every record as one line
    ///
    /// # Errors
    /// Returns an error if writing fails
    pub fn export<W: Write>(&self, records: &[Arc<AllocationRecord>], mut writer: W) -> std::io::Result<()> {
        for record in records {
            writeln!(writer, "{}", self.format_record(record))?;
        }
        writer.flush()
    }
}

/// Multi-line backtrace listing, one line per raw address
///
/// ```text
/// #0  40011a2c Foo::alloc (libfoo.so) foo.c:42
/// #1  00000000 <null>
/// #2  4000b120 <unresolved>
/// ```
#[must_use]
pub fn format_backtrace(record: &AllocationRecord) -> String {
    let resolved = record.resolved_backtrace();
    record
        .raw_backtrace
        .iter()
        .enumerate()
        .map(|(i, &addr)| {
            let frame = match resolved.and_then(|b| b.slots().get(i)) {
                _ if addr == RawAddress(0) => "<null>".to_string(),
                Some(Some(frame)) => frame.to_string(),
                _ => "<unresolved>".to_string(),
            };
            format!("#{i:<2} {addr} {frame}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
