use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to parse Python source: {0}")]
    ParseError(String),

    #[error("invalid Python syntax at line {line}, column {column}")]
    SyntaxError { line: usize, column: usize },

    #[error("package directory not found: {}", .0.display())]
    PackageNotFound(PathBuf),

    #[error("schema directory not found: {}", .0.display())]
    SchemaDirNotFound(PathBuf),

    #[error("could not resolve source file for {fqn} (tried '{}' and '{}')", module_file.display(), init_file.display())]
    SourceNotFound {
        fqn: String,
        module_file: PathBuf,
        init_file: PathBuf,
    },

    #[error("function or method '{0}' not found in source")]
    FunctionNotFound(String),

    #[error("_function_map in {} is not a literal dict of strings", .0.display())]
    InvalidFunctionMap(PathBuf),

    #[error("failed to parse docstring: {0}")]
    DocstringError(String),

    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl SchemaError {
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SchemaError>;
