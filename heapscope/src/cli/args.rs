//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

use crate::analysis::AllocDisplay;
use crate::classification::DEFAULT_INSTRUMENTATION_LIBRARY;

#[derive(Parser)]
#[command(
    name = "heapscope",
    about = "Symbolicate and aggregate native heap allocations",
    after_help = "\
EXAMPLES:
    heapscope --capture heap.json --maps maps.txt                  Symbolicate and rank libraries
    heapscope --capture heap2.json --backup heap1.json --maps m    Show only new allocations
    heapscope --capture heap.json --maps maps.txt --save heap.txt  Save a text dump

ENVIRONMENT:
    ANDROID_SYMBOLS      Directory holding unstripped libraries
    ANDROID_ADDR2LINE    Symbolizer executable
    HEAPSCOPE_CONFIG     User config file (default ~/.config/heapscope/config.json)"
)]
pub struct Args {
    /// Allocation capture to analyze (JSON)
    #[arg(short, long, value_name = "FILE")]
    pub capture: PathBuf,

    /// Library mappings of the captured process (/proc/<pid>/maps format)
    #[arg(short, long, value_name = "FILE")]
    pub maps: PathBuf,

    /// Previous capture of the same session; only new allocations are shown
    #[arg(short, long, value_name = "FILE")]
    pub backup: Option<PathBuf>,

    /// Directory holding unstripped libraries
    #[arg(long, value_name = "DIR")]
    pub symbols: Option<PathBuf>,

    /// Symbolizer executable (addr2line compatible)
    #[arg(long, value_name = "PATH")]
    pub symbolizer: Option<PathBuf>,

    /// Which allocations to show
    #[arg(short, long, default_value_t = AllocDisplay::All)]
    pub display: AllocDisplay,

    /// Extra library skipped when attributing an allocation (repeatable,
    /// libc_malloc_debug_leak.so is always skipped)
    #[arg(long = "skip-library", value_name = "NAME")]
    pub skip_libraries: Vec<String>,

    /// Also list the allocations of this library
    #[arg(short, long, value_name = "NAME")]
    pub library: Option<String>,

    /// Number of libraries to list (0 = all)
    #[arg(short, long, default_value = "20")]
    pub top: usize,

    /// Save the allocations as text
    #[arg(short, long, value_name = "FILE")]
    pub save: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Libraries the classifier looks past: the debug allocator plus `--skip-library`
    #[must_use]
    pub fn instrumentation_libraries(&self) -> Vec<String> {
        let mut libraries = vec![DEFAULT_INSTRUMENTATION_LIBRARY.to_string()];
        for library in &self.skip_libraries {
            if !libraries.contains(library) {
                libraries.push(library.clone());
            }
        }
        libraries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_arguments() {
        let args = Args::try_parse_from(["heapscope", "--capture", "a.json", "--maps", "maps.txt"]).unwrap();

        assert_eq!(args.capture, PathBuf::from("a.json"));
        assert_eq!(args.display, AllocDisplay::All);
        assert!(args.skip_libraries.is_empty());
        assert_eq!(args.instrumentation_libraries(), vec![DEFAULT_INSTRUMENTATION_LIBRARY.to_string()]);
        assert_eq!(args.top, 20);
        assert!(args.backup.is_none());
    }

    #[test]
    fn test_display_mode_parsed() {
        let args = Args::try_parse_from([
            "heapscope", "-c", "a.json", "-m", "maps.txt", "--display", "zygote-child",
        ])
        .unwrap();

        assert_eq!(args.display, AllocDisplay::ZygoteChild);
    }

    #[test]
    fn test_skip_library_adds_to_default() {
        let args = Args::try_parse_from([
            "heapscope", "-c", "a.json", "-m", "maps.txt", "--skip-library", "libmy_alloc.so",
        ])
        .unwrap();

        assert_eq!(
            args.instrumentation_libraries(),
            vec![DEFAULT_INSTRUMENTATION_LIBRARY.to_string(), "libmy_alloc.so".to_string()]
        );
    }

    #[test]
    fn test_capture_is_required() {
        assert!(Args::try_parse_from(["heapscope", "--maps", "maps.txt"]).is_err());
    }
}
