use std::path::Path;

use flexi_logger::{Cleanup, Criterion, Duplicate, FileSpec, FlexiLoggerError, Logger, LoggerHandle, Naming};

/// Start the global logger.
///
/// `RUST_LOG` overrides `level` when set. Without `log_dir` everything goes to
/// stderr; with it records go to a size-rotated file in that directory and
/// warnings are echoed to stderr. Keep the returned handle alive for the
/// lifetime of the program so buffered records are flushed.
pub fn setup_logging(level: &str, log_dir: Option<&Path>) -> Result<LoggerHandle, FlexiLoggerError> {
    let logger = Logger::try_with_env_or_str(level)?.format(flexi_logger::detailed_format);

    match log_dir {
        None => logger.log_to_stderr().start(),
        Some(dir) => logger
            .log_to_file(FileSpec::default().directory(dir).basename("thermal-overlay"))
            .duplicate_to_stderr(Duplicate::Warn)
            .rotate(
                Criterion::Size(1024 * 1024), //1MB
                Naming::Timestamps,
                Cleanup::KeepLogFiles(5),
            )
            .start(),
    }
}
