//! Vela Configuration Resolution
//!
//! This crate resolves a module's `vela.hcl` into a single merged
//! configuration. Resolution has three stages:
//!
//! - **Finding**: locate an ancestor configuration file by walking up the
//!   directory tree ([`find::find_in_parent_folders`]).
//! - **Parsing**: parse one HCL file into a [`ConfigNode`], evaluating the
//!   built-in expression functions (`find_in_parent_folders()`,
//!   `path_relative_to_include()`, `get_env(name, default)`) against that
//!   file's own location.
//! - **Merging**: fold the include chain root-to-leaf into a
//!   [`ResolvedConfig`] under deterministic override rules ([`merge::resolve`]).
//!
//! # Example
//!
//! ```ignore
//! use vela_config::merge::resolve;
//!
//! let resolved = resolve(Path::new("mysql/vela.hcl"))?;
//! if let Some(remote_state) = &resolved.remote_state {
//!     println!("backend: {}", remote_state.backend);
//! }
//! ```

pub mod config;
pub mod error;
pub mod find;
pub mod functions;
pub mod merge;
pub mod parser;

// Re-export main types for convenience
pub use config::{ConfigNode, ExtraArgs, Hook, IncludeRef, RemoteStateSpec, ResolvedConfig};
pub use error::{ConfigError, ConfigResult};
pub use merge::resolve;

/// File name recognized as a Vela configuration file
pub const CONFIG_FILE_NAME: &str = "vela.hcl";
