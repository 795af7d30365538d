//! Error types for relq.

use std::path::PathBuf;

use thiserror::Error;

use crate::dialect::Finding;

/// Main error type for schema and migration operations.
#[derive(Error, Debug)]
pub enum RelqError {
    /// Missing or invalid configuration, or no usable connection settings.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The desired schema source does not parse.
    #[error("{}:{line}:{column}: {message}", .file.display())]
    SchemaSyntax {
        file: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    /// Database connectivity or permission failure while reading the catalog.
    #[error("Introspection failed: {0}")]
    Introspection(String),

    /// Ignore patterns hide an object that a kept object depends on.
    #[error("Ignore patterns hide objects that kept columns depend on:\n{}", .violations.join("\n"))]
    DiffDependency { violations: Vec<String> },

    /// Emitted SQL cannot run on the target dialect.
    #[error("SQL is not compatible with {dialect}: {} blocking issue(s)", .findings.len())]
    DialectIncompatibility {
        dialect: String,
        findings: Vec<Finding>,
    },

    /// A DDL statement failed while applying changes.
    #[error("Statement {} failed: {message}\n  SQL: {statement}", .index + 1)]
    Execution {
        statement: String,
        index: usize,
        rolled_back: bool,
        message: String,
    },

    /// Driver-level failure outside of schema execution.
    #[error("Database error: {0}")]
    Database(String),

    /// An interactive confirmation was declined or cancelled.
    #[error("Cancelled")]
    UserCancel,

    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML deserialization error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Maximum number of characters of a failing statement kept in an error.
const STATEMENT_PREVIEW: usize = 200;

impl RelqError {
    /// Create an Execution error, truncating the statement text.
    pub fn execution(
        statement: &str,
        index: usize,
        rolled_back: bool,
        message: impl Into<String>,
    ) -> Self {
        let statement = if statement.chars().count() > STATEMENT_PREVIEW {
            let head: String = statement.chars().take(STATEMENT_PREVIEW).collect();
            format!("{head}...")
        } else {
            statement.to_string()
        };
        RelqError::Execution {
            statement,
            index,
            rolled_back,
            message: message.into(),
        }
    }

    /// Create a SchemaSyntax error.
    pub fn syntax(
        file: impl Into<PathBuf>,
        line: usize,
        column: usize,
        message: impl Into<String>,
    ) -> Self {
        RelqError::SchemaSyntax {
            file: file.into(),
            line,
            column,
            message: message.into(),
        }
    }

    /// One-line hint shown under the error summary.
    pub fn hint(&self) -> Option<String> {
        match self {
            RelqError::Config(_) => Some(
                "Run `relq init`, or set DATABASE_URL / [database].url in relq.toml".to_string(),
            ),
            RelqError::SchemaSyntax { file, .. } => {
                Some(format!("Fix the statement in {} and retry", file.display()))
            }
            RelqError::Introspection(_) => {
                Some("Check that the database is reachable and the user can read pg_catalog".to_string())
            }
            RelqError::DiffDependency { .. } => Some(
                "Edit .relqignore: ignore the dependent column too, or un-ignore the referenced object"
                    .to_string(),
            ),
            RelqError::DialectIncompatibility { findings, .. } => findings
                .iter()
                .find_map(|f| f.alternative.clone())
                .map(|alt| format!("Try: {alt}")),
            RelqError::Execution { rolled_back, .. } => Some(if *rolled_back {
                "Transaction rolled back - database unchanged.".to_string()
            } else {
                "Statements before the failing one were applied; run `relq pull` to resync the snapshot."
                    .to_string()
            }),
            _ => None,
        }
    }

    /// Process exit code: 0 for a declined prompt, 1 for user errors, 2 for fatal ones.
    pub fn exit_code(&self) -> u8 {
        match self {
            RelqError::UserCancel => 0,
            RelqError::Config(_)
            | RelqError::SchemaSyntax { .. }
            | RelqError::DiffDependency { .. }
            | RelqError::DialectIncompatibility { .. }
            | RelqError::Toml(_) => 1,
            _ => 2,
        }
    }

    /// Format error with full details including error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("{}", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for relq operations.
pub type Result<T> = std::result::Result<T, RelqError>;
