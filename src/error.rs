//! Error types for the voice tree builder.
//!
//! Every phase of a build reports failures through [`Error`]. The variants
//! follow the failure classes of the pipeline: malformed binary input,
//! malformed tree text, missing acoustic data for a unit, and a failed
//! learner process, plus the ambient I/O and configuration failures.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed binary input: bad magic, wrong version, truncated record.
    #[error("format error in {context}: {message}")]
    Format { context: String, message: String },

    /// Malformed skeleton or learner tree text.
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Acoustic data for a referenced unit could not be read.
    #[error("data error for unit {unit}: {reason}")]
    Data { unit: u32, reason: String },

    /// The learner exited unsuccessfully or could not be started.
    #[error("learner job {job} failed ({status}){}", stderr_suffix(.stderr))]
    ExternalProcess {
        job: usize,
        status: String,
        stderr: String,
    },

    /// Invalid build configuration.
    #[error("config error: {0}")]
    Config(String),

    /// I/O errors, with the path that was being accessed when known.
    #[error("I/O error on {}: {source}", path.display())]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

impl Error {
    pub fn format(context: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Format {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Error::Parse {
            line,
            message: message.into(),
        }
    }

    pub fn data(unit: u32, reason: impl Into<String>) -> Self {
        Error::Data {
            unit,
            reason: reason.into(),
        }
    }

    /// Attaches a path to an I/O error.
    pub fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::IoAt {
            path: path.into(),
            source,
        }
    }

    /// Whether the error aborts a whole build rather than a single leaf.
    ///
    /// Missing coefficient data only spoils the leaf being refined, though the
    /// refine call as a whole still reports it once running jobs have drained.
    pub fn is_fatal_to_build(&self) -> bool {
        !matches!(self, Error::Data { .. })
    }
}

/// Helper trait to annotate `std::io::Result` with the path involved.
pub(crate) trait IoContext<T> {
    fn at_path(self, path: &std::path::Path) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn at_path(self, path: &std::path::Path) -> Result<T> {
        self.map_err(|e| Error::io_at(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = Error::format("cart.mry", "bad magic 0x00000000");
        assert_eq!(err.to_string(), "format error in cart.mry: bad magic 0x00000000");

        let err = Error::parse(7, "unbalanced parenthesis");
        assert_eq!(err.to_string(), "parse error at line 7: unbalanced parenthesis");
    }

    #[test]
    fn external_process_appends_stderr_when_present() {
        let err = Error::ExternalProcess {
            job: 3,
            status: "exit status: 1".into(),
            stderr: String::new(),
        };
        assert_eq!(err.to_string(), "learner job 3 failed (exit status: 1)");

        let err = Error::ExternalProcess {
            job: 3,
            status: "exit status: 1".into(),
            stderr: "no such feature".into(),
        };
        assert!(err.to_string().ends_with(": no such feature"));
    }

    #[test]
    fn only_data_errors_are_leaf_local() {
        assert!(!Error::data(4, "missing").is_fatal_to_build());
        assert!(Error::Config("x".into()).is_fatal_to_build());
        assert!(Error::parse(1, "x").is_fatal_to_build());
    }
}
