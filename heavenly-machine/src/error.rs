use heavenly_membrane::MembraneError;
use std::fmt;

/// Byte range into the machine's accumulated source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Smallest span covering both
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Errors raised while loading or running sandbox code
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MachineError {
    #[error("Lexer error at {span}: {message}")]
    LexerError { span: Span, message: String },

    #[error("Parser error at {span}: {message}")]
    ParserError { span: Span, message: String },

    #[error("ReferenceError at {span}: {name} is not defined")]
    ReferenceError { span: Span, name: String },

    #[error("TypeError at {span}: {message}")]
    TypeError { span: Span, message: String },

    /// A host native failed; the original error is kept intact
    #[error("Native error at {span}: {error}")]
    NativeError { span: Span, error: MembraneError },
}

impl MachineError {
    pub fn type_error(span: Span, message: impl Into<String>) -> Self {
        MachineError::TypeError {
            span,
            message: message.into(),
        }
    }

    pub fn span(&self) -> Span {
        match self {
            MachineError::LexerError { span, .. } => *span,
            MachineError::ParserError { span, .. } => *span,
            MachineError::ReferenceError { span, .. } => *span,
            MachineError::TypeError { span, .. } => *span,
            MachineError::NativeError { span, .. } => *span,
        }
    }
}

/// Native failures leave the machine as the error the host produced;
/// everything else is a sandbox fault.
impl From<MachineError> for MembraneError {
    fn from(err: MachineError) -> Self {
        match err {
            MachineError::NativeError { error, .. } => error,
            other => MembraneError::Sandbox(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, MachineError>;

/// Display context for better error messages
pub struct ErrorContext<'a> {
    pub source: &'a str,
    pub error: &'a MachineError,
}

impl<'a> ErrorContext<'a> {
    pub fn new(source: &'a str, error: &'a MachineError) -> Self {
        Self { source, error }
    }

    fn start(&self) -> usize {
        let mut start = self.error.span().start.min(self.source.len());
        while !self.source.is_char_boundary(start) {
            start -= 1;
        }
        start
    }

    /// Get the source line containing the error
    pub fn source_line(&self) -> &'a str {
        let start = self.start();
        let line_start = self.source[..start]
            .rfind('\n')
            .map(|pos| pos + 1)
            .unwrap_or(0);
        let line_end = self.source[start..]
            .find('\n')
            .map(|pos| start + pos)
            .unwrap_or(self.source.len());
        &self.source[line_start..line_end]
    }

    /// Get line and column numbers (1-indexed)
    pub fn line_col(&self) -> (usize, usize) {
        let start = self.start();
        let line = self.source[..start].matches('\n').count() + 1;
        let line_start = self.source[..start]
            .rfind('\n')
            .map(|pos| pos + 1)
            .unwrap_or(0);
        (line, start - line_start + 1)
    }
}

impl<'a> fmt::Display for ErrorContext<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (line, col) = self.line_col();
        writeln!(f, "Error at line {}, column {}:", line, col)?;
        writeln!(f, "  {}", self.error)?;

        let source_line = self.source_line();
        if !source_line.is_empty() {
            writeln!(f)?;
            writeln!(f, "  {}", source_line)?;
            let col_start = col - 1;
            let width = self
                .error
                .span()
                .len()
                .min(source_line.len().saturating_sub(col_start))
                .max(1);
            writeln!(f, "  {}{}", " ".repeat(col_start), "^".repeat(width))?;
        }

        Ok(())
    }
}
