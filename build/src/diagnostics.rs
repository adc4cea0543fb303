//! Classification of captured tool diagnostics.

/// The substring that marks a diagnostic stream as a failure.
const FAILURE_MARKER: &str = "error";

/// Whether captured stderr indicates the tool failed.
///
/// Deliberately coarse: any occurrence of the marker counts, including inside
/// warning text that happens to contain it. Callers treat this as the single
/// source of truth for success/failure, so tightening the heuristic only ever
/// happens here.
#[must_use]
pub fn indicates_failure(stderr: &str) -> bool {
    stderr.contains(FAILURE_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compiler_error_is_failure() {
        assert!(indicates_failure(
            "main.cpp:3:5: error: expected ';' after expression"
        ));
    }

    #[test]
    fn test_linker_error_is_failure() {
        assert!(indicates_failure("ld.lld: error: undefined symbol: main"));
    }

    #[test]
    fn test_empty_and_warning_output_pass() {
        assert!(!indicates_failure(""));
        assert!(!indicates_failure("main.cpp:7:9: warning: unused variable 'x'"));
    }

    #[test]
    fn test_marker_inside_warning_text_still_counts() {
        // The heuristic is a plain substring match; a warning that merely
        // mentions the word trips it. That is the documented contract.
        assert!(indicates_failure(
            "warning: variable 'error_count' set but not used"
        ));
    }

    #[test]
    fn test_marker_is_case_sensitive() {
        assert!(!indicates_failure("Error handling disabled"));
    }
}
