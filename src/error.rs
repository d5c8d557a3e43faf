use thiserror::Error;

/// Main error type for the Mica compiler.
///
/// Parse and semantic errors render in the `path(line): ERROR: msg` form the
/// driver prints to stderr. `Unsupported` marks constructs the active backend
/// cannot express; it names the offending node and is a defect in the input
/// rather than a recoverable condition.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("{path}({line}): ERROR: {msg}")]
    Parse { path: String, line: u32, msg: String },

    #[error("{path}({line}): ERROR: {msg}")]
    Semantic { path: String, line: u32, msg: String },

    #[error("not implemented: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Usage(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl CompileError {
    pub fn parse(path: &str, line: u32, msg: impl Into<String>) -> CompileError {
        CompileError::Parse {
            path: path.to_string(),
            line,
            msg: msg.into(),
        }
    }

    pub fn semantic(path: &str, line: u32, msg: impl Into<String>) -> CompileError {
        CompileError::Semantic {
            path: path.to_string(),
            line,
            msg: msg.into(),
        }
    }
}
