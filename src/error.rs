use crate::queue::QueueName;
use std::path::PathBuf;
use subprocess::{ExitStatus, PopenError};
use thiserror::Error;

/// Exit code for unusable command line arguments
pub const EXIT_INVALID: i32 = 128;
/// Exit code after SIGINT/SIGTERM
pub const EXIT_INTERRUPTED: i32 = 130;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("no total row after header")]
    MissingTotal,
    #[error("expected {expected} bucket counts, found {found}")]
    TokenCount { expected: usize, found: usize },
    #[error("invalid bucket count '{0}'")]
    BadCount(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{} not found or not executable", .0.display())]
    ToolMissing(PathBuf),
    #[error("failed to execute `{cmd}`")]
    Launch {
        cmd: String,
        #[source]
        source: PopenError,
    },
    #[error("`{cmd}` status: {status:?}")]
    ExitStatus { cmd: String, status: ExitStatus },
    #[error("failed to parse qshape output for queue {queue}")]
    Parse {
        queue: QueueName,
        #[source]
        source: ParseError,
    },
    #[error("check interrupted")]
    Interrupted,
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::ToolMissing(_) => 127,
            Error::Interrupted => EXIT_INTERRUPTED,
            _ => 3,
        }
    }
}
