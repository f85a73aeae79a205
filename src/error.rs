//! Error types for parsing, transforming and font loading.

use std::io;

use thiserror::Error;

/// A statement carried an argument we could not turn into a number.
///
/// Raised by the parser; a plot containing one of these is rejected as a whole.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("line {line}: malformed {command} statement: {detail}")]
pub struct FormatError {
    /// 1-based source line, 0 if the statement was parsed outside of a stream.
    pub line: usize,
    pub command: String,
    pub detail: String,
}

impl FormatError {
    pub fn new<C: Into<String>, D: Into<String>>(command: C, detail: D) -> Self {
        FormatError {
            line: 0,
            command: command.into(),
            detail: detail.into(),
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = line;
        self
    }
}

/// The mirror transform needs both `IP` and `SC` to have been seen.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot mirror plot: {reason} ({command})")]
pub struct MissingSetupError {
    pub command: &'static str,
    pub reason: &'static str,
}

/// Errors while reading a CXF stroke font.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("font line {line}: {detail}")]
pub struct FontError {
    pub line: usize,
    pub detail: String,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    MissingSetup(#[from] MissingSetupError),

    #[error(transparent)]
    Font(#[from] FontError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
