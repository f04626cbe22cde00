use std::io;

/// Controlled errors raised by the dump pipeline.
///
/// Each variant maps to a distinct process exit code so automation can tell a
/// truncated dump (broken pipe) apart from a configuration problem.
#[derive(Debug, thiserror::Error)]
pub enum DumpError {
    /// Invalid configuration or an inconsistent dump plan. Every problem
    /// found while planning is accumulated and reported together.
    #[error("{}", .messages.join("\n"))]
    Config { messages: Vec<String> },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Runtime failure while planning or emitting the dump.
    #[error("{0}")]
    Dump(String),

    #[error("the output stream was closed")]
    BrokenPipe,

    #[error("interrupted")]
    Interrupted,
}

impl DumpError {
    pub fn config(message: impl Into<String>) -> Self {
        DumpError::Config {
            messages: vec![message.into()],
        }
    }

    /// The process exit code for this error: 1 for controlled failures,
    /// 128 + SIGPIPE for a closed output pipe, 128 + SIGINT on interrupt.
    pub fn exit_code(&self) -> i32 {
        match self {
            DumpError::BrokenPipe => 128 + 13,
            DumpError::Interrupted => 128 + 2,
            DumpError::Config { .. } | DumpError::Database(_) | DumpError::Dump(_) => 1,
        }
    }
}

impl From<io::Error> for DumpError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::BrokenPipe {
            DumpError::BrokenPipe
        } else {
            DumpError::Dump(format!("I/O error: {err}"))
        }
    }
}
