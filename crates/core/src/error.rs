use thiserror::Error;

/// A rule module could not be parsed.
#[derive(Error, Debug, Clone)]
#[error("{path}{}: {message}", .line.map(|l| format!(":{l}")).unwrap_or_default())]
pub struct ParseError {
    pub path: String,
    pub line: Option<usize>,
    pub message: String,
}

impl ParseError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            line: None,
            message: message.into(),
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

/// One problem reported while compiling a complete module set.
#[derive(Error, Debug, Clone)]
#[error("{}{message}", .path.as_ref().map(|p| format!("{p}: ")).unwrap_or_default())]
pub struct CompileError {
    pub path: Option<String>,
    pub message: String,
}

/// All problems reported by one compile call.
#[derive(Error, Debug, Clone)]
#[error("{} compile error(s): {}", .0.len(), join(.0))]
pub struct CompileErrors(pub Vec<CompileError>);

fn join(errors: &[CompileError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure of a single query against a compiled set.
#[derive(Error, Debug, Clone)]
pub enum RuntimeError {
    #[error("query cancelled")]
    Cancelled,

    #[error("evaluation error: {0}")]
    Evaluation(String),

    #[error("unexpected value: {0}")]
    Conversion(String),
}
