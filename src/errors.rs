use std::{fmt, io};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReleaseError>;

/// Error kinds the core distinguishes, per the error-handling design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Workspace,
    Analysis,
    Publish,
    Record,
    Plugin,
    Internal,
}

impl ErrorKind {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Configuration => 2,
            Self::Workspace
            | Self::Analysis
            | Self::Publish
            | Self::Record
            | Self::Plugin
            | Self::Internal => 1,
        }
    }
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct ReleaseError {
    pub kind: ErrorKind,
    pub message: String,
    pub package: Option<String>,
}

impl ReleaseError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            package: None,
        }
    }

    pub fn for_package(kind: ErrorKind, package: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            package: Some(package.into()),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn workspace(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Workspace, message)
    }

    pub fn analysis(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Analysis, message)
    }

    pub fn publish(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Publish, message)
    }

    pub fn record(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Record, message)
    }

    pub fn plugin(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Plugin, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn exit_code(&self) -> i32 {
        self.kind.exit_code()
    }
}

impl From<io::Error> for ReleaseError {
    fn from(value: io::Error) -> Self {
        Self::internal(format!("I/O error: {value}"))
    }
}

impl From<cargo_metadata::Error> for ReleaseError {
    fn from(value: cargo_metadata::Error) -> Self {
        Self::workspace(format!("cargo metadata error: {value}"))
    }
}

impl From<serde_json::Error> for ReleaseError {
    fn from(value: serde_json::Error) -> Self {
        Self::internal(format!("JSON error: {value}"))
    }
}

impl From<semver::Error> for ReleaseError {
    fn from(value: semver::Error) -> Self {
        Self::configuration(format!("Invalid semantic version: {value}"))
    }
}

impl From<toml_edit::TomlError> for ReleaseError {
    fn from(value: toml_edit::TomlError) -> Self {
        Self::internal(format!("TOML error: {value}"))
    }
}

impl From<reqwest::Error> for ReleaseError {
    fn from(value: reqwest::Error) -> Self {
        Self::publish(format!("registry request failed: {value}"))
    }
}

impl From<ReleaseError> for io::Error {
    fn from(value: ReleaseError) -> Self {
        io::Error::other(value.to_string())
    }
}

pub fn with_context<E: fmt::Display>(kind: ErrorKind, context: &str, error: E) -> ReleaseError {
    ReleaseError::new(kind, format!("{context}: {error}"))
}
