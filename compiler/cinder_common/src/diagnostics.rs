//! Diagnostic message handling for the cinder compiler

use crate::CinderError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity level for diagnostic messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Info,
    Hint,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
            Severity::Hint => write!(f, "hint"),
        }
    }
}

/// A diagnostic message pointing at an instruction in a function body.
///
/// IR passes report positions as instruction indices into the flat body
/// rather than source spans; the driver maps them back to source locations
/// when it still has the AST at hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// Index of the offending instruction, if the diagnostic points at one.
    pub instr: Option<usize>,
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, instr: usize) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            instr: Some(instr),
            help: None,
        }
    }

    pub fn warning(message: impl Into<String>, instr: usize) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            instr: Some(instr),
            help: None,
        }
    }

    pub fn global(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            instr: None,
            help: None,
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)?;

        if let Some(instr) = self.instr {
            write!(f, " (instruction {})", instr)?;
        }

        if let Some(help) = &self.help {
            write!(f, "\n  help: {}", help)?;
        }

        Ok(())
    }
}

/// Collection of diagnostic messages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub messages: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, diagnostic: Diagnostic) {
        self.messages.push(diagnostic);
    }

    pub fn error(&mut self, message: impl Into<String>, instr: usize) {
        self.add(Diagnostic::error(message, instr));
    }

    pub fn warning(&mut self, message: impl Into<String>, instr: usize) {
        self.add(Diagnostic::warning(message, instr));
    }

    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.messages.iter().filter(|d| d.severity == Severity::Error).count()
    }

    pub fn warning_count(&self) -> usize {
        self.messages.iter().filter(|d| d.severity == Severity::Warning).count()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.messages.extend(other.messages);
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.messages.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.messages.iter()
    }
}

impl From<CinderError> for Diagnostic {
    fn from(error: CinderError) -> Self {
        Diagnostic::global(Severity::Error, error.to_string())
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for message in &self.messages {
            writeln!(f, "{}", message)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_counting() {
        let mut diags = Diagnostics::new();
        diags.error("bad return type", 3);
        diags.warning("unused label", 0);
        assert!(diags.has_errors());
        assert_eq!(diags.error_count(), 1);
        assert_eq!(diags.warning_count(), 1);
        assert_eq!(diags.len(), 2);
    }

    #[test]
    fn display_points_at_instruction() {
        let diag = Diagnostic::error("Operands must have the same type", 7);
        assert_eq!(
            diag.to_string(),
            "error: Operands must have the same type (instruction 7)"
        );
    }
}
