//! Error taxonomy for the lint pipeline.
//!
//! Per-file parse failures are not errors; they become lint items. What
//! remains here either aborts a plugin candidate (adapter/class-format
//! errors, swallowed by discovery) or aborts the whole run.

use std::fmt;
use std::path::PathBuf;

/// Errors raised by pipeline components.
#[derive(Debug, thiserror::Error)]
pub enum LintError {
    #[error(
        "no service registration '{contract}' found for plugin '{plugin}' ({class}); \
         searched {searched} locations"
    )]
    MissingServiceRegistration {
        plugin: String,
        class: String,
        contract: String,
        searched: usize,
    },

    #[error(transparent)]
    AdapterInvocation(#[from] AdapterInvocationError),

    #[error("invalid class file {name}: {message}")]
    ClassFormat { name: String, message: String },

    #[error("class not found on classpath: {0}")]
    ClassNotFound(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("archive error in {path}: {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    Input(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("build failed: {0}")]
    Build(String),

    #[error("report template error: {0}")]
    Template(#[from] handlebars::TemplateError),

    #[error("report rendering error: {0}")]
    Render(#[from] handlebars::RenderError),
}

impl LintError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn zip(path: impl Into<PathBuf>, source: zip::result::ZipError) -> Self {
        Self::Zip {
            path: path.into(),
            source,
        }
    }

    /// True for errors the pipeline recognizes as domain failures
    /// (configuration, resources, inputs) rather than unexpected faults.
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            Self::MissingServiceRegistration { .. }
                | Self::Io { .. }
                | Self::Zip { .. }
                | Self::Json(_)
                | Self::Input(_)
                | Self::Config(_)
                | Self::Build(_)
        )
    }
}

/// A plugin-definition getter could not produce its declared type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{class}.{method}() could not be evaluated: {reason}")]
pub struct AdapterInvocationError {
    pub class: String,
    pub method: String,
    pub reason: String,
}

impl AdapterInvocationError {
    pub fn new(
        class: impl Into<String>,
        method: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            class: class.into(),
            method: method.into(),
            reason: reason.into(),
        }
    }
}

/// Pipeline phase, used to label run failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Setup,
    Linting,
    Reporting,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Setup => "setup",
            Phase::Linting => "linting",
            Phase::Reporting => "report generation",
        })
    }
}

/// Normalized run-level failure returned by the façade.
#[derive(Debug, thiserror::Error)]
#[error("lint run failed during {phase}: {cause}")]
pub struct RunError {
    pub phase: Phase,
    #[source]
    pub cause: LintError,
}

impl RunError {
    pub fn new(phase: Phase, cause: LintError) -> Self {
        Self { phase, cause }
    }

    pub fn is_missing_registration(&self) -> bool {
        matches!(self.cause, LintError::MissingServiceRegistration { .. })
    }
}

pub type Result<T, E = LintError> = std::result::Result<T, E>;
