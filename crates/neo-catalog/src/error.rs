//! Error types for the catalog library.

use thiserror::Error;

/// Exit code for configuration errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for database connectivity or query errors.
pub const EXIT_DATABASE_ERROR: u8 = 2;
/// Exit code for ingest failures.
pub const EXIT_LOAD_ERROR: u8 = 3;
/// Exit code for script generation or restore failures.
pub const EXIT_SCRIPT_ERROR: u8 = 4;
/// Exit code for failed validation (bad alert input, verification mismatch).
pub const EXIT_VALIDATION_ERROR: u8 = 5;
/// Exit code when the operation was cancelled by a signal.
pub const EXIT_CANCELLED: u8 = 6;
/// Exit code for file system errors.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for catalog operations.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// SQL Server connection or query error
    #[error("Database error: {0}")]
    Database(#[from] tiberius::error::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// A delimited file could not be interpreted
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Loading an entity into the catalog failed
    #[error("Load failed for {entity}: {message}")]
    Load { entity: String, message: String },

    /// A SQL script batch failed or the script could not be built
    #[error("Script error in batch {batch}: {message}")]
    Script { batch: usize, message: String },

    /// Input or catalog state failed validation
    #[error("Validation failed: {0}")]
    Validation(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Operation was cancelled (SIGINT, etc.)
    #[error("Operation cancelled")]
    Cancelled,
}

impl CatalogError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl std::fmt::Display, context: impl Into<String>) -> Self {
        CatalogError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Load error
    pub fn load(entity: impl Into<String>, message: impl Into<String>) -> Self {
        CatalogError::Load {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Create a Script error for a 1-based batch number (0 = whole script)
    pub fn script(batch: usize, message: impl Into<String>) -> Self {
        CatalogError::Script {
            batch,
            message: message.into(),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            CatalogError::Config(_) | CatalogError::Yaml(_) | CatalogError::Json(_) => {
                EXIT_CONFIG_ERROR
            }
            CatalogError::Database(_) | CatalogError::Pool { .. } => EXIT_DATABASE_ERROR,
            CatalogError::Parse { .. } | CatalogError::Load { .. } => EXIT_LOAD_ERROR,
            CatalogError::Script { .. } => EXIT_SCRIPT_ERROR,
            CatalogError::Validation(_) => EXIT_VALIDATION_ERROR,
            CatalogError::Cancelled => EXIT_CANCELLED,
            CatalogError::Io(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

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

/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;
