//! Configuration resolution error types

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while resolving a configuration chain
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be parsed as HCL
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: hcl::Error,
    },

    /// An expression inside the file could not be evaluated
    #[error("Failed to evaluate expression in {path}: {message}")]
    Eval { path: PathBuf, message: String },

    /// No ancestor configuration file exists up to the filesystem root
    #[error("No {file} found in any parent folder of {start}")]
    NoParentConfig { file: &'static str, start: PathBuf },

    /// An `include.path` points at a file that does not exist
    #[error("Include target {target} referenced from {referenced_from} not found")]
    IncludeNotFound {
        target: PathBuf,
        referenced_from: PathBuf,
    },

    /// The include chain loops back on itself
    #[error("Include cycle detected at {path}")]
    Cycle { path: PathBuf },

    /// A block that may appear at most once appears twice
    #[error("Duplicate {block} block in {path}")]
    DuplicateBlock { path: PathBuf, block: &'static str },

    /// A named block is missing its name label
    #[error("Unlabeled {block} block in {path}: a name label is required")]
    UnlabeledBlock { path: PathBuf, block: &'static str },

    /// A block is missing a required attribute
    #[error("{block} block in {path} is missing required attribute {attribute}")]
    MissingAttribute {
        path: PathBuf,
        block: &'static str,
        attribute: &'static str,
    },

    /// An attribute has the wrong type (e.g. a list where a string is expected)
    #[error("Invalid value for {attribute} in {path}: expected {expected}")]
    InvalidValue {
        path: PathBuf,
        attribute: String,
        expected: &'static str,
    },

    /// Filesystem error while reading a configuration file
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for configuration resolution
pub type ConfigResult<T> = Result<T, ConfigError>;
