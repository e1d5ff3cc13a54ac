//! Exit codes for the rescache binary.
//!
//! Nothing inside the cache core is fatal to the host: configuration
//! problems and per-file I/O failures degrade to "try again next cycle."
//! The binary therefore only distinguishes clean exit, unexpected error,
//! and user interruption.

/// Exit codes for the rescache application.
///
/// - 0: Success (ran to completion or was shut down cleanly)
/// - 1: General error (unexpected failure during startup)
/// - 130: Interrupted by user (Ctrl+C, Unix convention 128 + SIGINT)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Ran to completion or shut down cleanly.
    Success = 0,
    /// An unexpected error occurred.
    GeneralError = 1,
    /// Interrupted by the user (Ctrl+C).
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::GeneralError.as_i32(), 1);
        assert_eq!(ExitCode::Interrupted.as_i32(), 130);
    }
}
