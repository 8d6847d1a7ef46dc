//! Error handling utilities for the cinder compiler

use thiserror::Error;

/// The main error type for the cinder compiler
#[derive(Error, Debug, Clone)]
pub enum CinderError {
    #[error("Lexical error: {message}")]
    LexError { message: String },

    #[error("Parse error: {message}")]
    ParseError { message: String },

    #[error("Semantic error: {message}")]
    SemaError { message: String },

    #[error("IR error: {message}")]
    IrError { message: String },

    #[error("Code generation error: {message}")]
    CodegenError { message: String },

    #[error("Unsupported target: {triple}")]
    UnsupportedTarget { triple: String },

    #[error("I/O error: {message}")]
    IoError { message: String },
}

/// Result type alias for cinder compiler operations
pub type CinderResult<T> = Result<T, CinderError>;

impl CinderError {
    pub fn lex_error(message: impl Into<String>) -> Self {
        Self::LexError { message: message.into() }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::ParseError { message: message.into() }
    }

    pub fn sema_error(message: impl Into<String>) -> Self {
        Self::SemaError { message: message.into() }
    }

    pub fn ir_error(message: impl Into<String>) -> Self {
        Self::IrError { message: message.into() }
    }

    pub fn codegen_error(message: impl Into<String>) -> Self {
        Self::CodegenError { message: message.into() }
    }

    pub fn unsupported_target(triple: impl Into<String>) -> Self {
        Self::UnsupportedTarget { triple: triple.into() }
    }

    pub fn io_error(message: impl Into<String>) -> Self {
        Self::IoError { message: message.into() }
    }
}
