//! Configuration data model
//!
//! [`ConfigNode`] is one parsed file; [`ResolvedConfig`] is the result of
//! merging an include chain. Block collections use [`hcl::Map`] (an ordered
//! map) because block order determines the order in which extra arguments and
//! hooks are applied.

use std::path::PathBuf;

use hcl::{Map, Value};

/// Environment variable that forces `disable_init` on
pub const DISABLE_INIT_ENV_VAR: &str = "VELA_DISABLE_INIT";

/// Keys inside `remote_state.config` consumed by the engine itself and never
/// forwarded to the wrapped tool.
pub const ENGINE_ONLY_KEYS: &[&str] = &[
    "disable_init",
    "skip_bucket_creation",
    "skip_bucket_versioning",
    "skip_bucket_ssencryption",
    "skip_bucket_accesslogging",
    "enable_lock_table_ssencryption",
    "s3_bucket_tags",
    "dynamodb_table_tags",
    "gcs_bucket_labels",
];

/// Reference from a child configuration to the parent it inherits from
#[derive(Debug, Clone, PartialEq)]
pub struct IncludeRef {
    /// The `path` expression's value as written (after evaluation)
    pub raw_path: String,
    /// Absolute path of the include target
    pub target: PathBuf,
}

/// A named command executed before or after the wrapped tool's action
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hook {
    /// Command and arguments to execute
    pub execute: Vec<String>,
    /// Wrapped-tool commands this hook applies to (empty = all)
    pub commands: Vec<String>,
}

impl Hook {
    /// Whether this hook applies when running the given wrapped-tool command
    pub fn applies_to(&self, command: &str) -> bool {
        self.commands.is_empty() || self.commands.iter().any(|c| c == command)
    }
}

/// A named group of additional command-line arguments for the wrapped tool
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtraArgs {
    /// Literal arguments appended to the command line
    pub arguments: Vec<String>,
    /// Var files that must exist; each becomes a `-var-file=` argument
    pub required_var_files: Vec<String>,
    /// Var files passed only when present on disk
    pub optional_var_files: Vec<String>,
    /// Wrapped-tool commands these arguments apply to (empty = all)
    pub commands: Vec<String>,
}

impl ExtraArgs {
    /// Whether this block applies when running the given wrapped-tool command
    pub fn applies_to(&self, command: &str) -> bool {
        self.commands.is_empty() || self.commands.iter().any(|c| c == command)
    }
}

/// Remote state declaration: backend kind plus its configuration mapping.
///
/// Engine-only keys are split out of the mapping at construction time, so
/// `config` holds exactly what is forwarded to the wrapped tool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteStateSpec {
    /// Backend kind (`s3`, `gcs`, or any pass-through kind)
    pub backend: String,
    /// Backend configuration forwarded to the wrapped tool
    pub config: Map<String, Value>,
    /// Skip backend initialization entirely (degraded init)
    pub disable_init: bool,
    /// Never create the bucket, even when absent
    pub skip_bucket_creation: bool,
    /// Leave bucket versioning off when creating
    pub skip_bucket_versioning: bool,
    /// Leave server-side encryption off when creating
    pub skip_bucket_ssencryption: bool,
    /// Leave access logging off when creating
    pub skip_bucket_accesslogging: bool,
    /// Server-side encryption for the lock table (defaults to on)
    pub enable_lock_table_ssencryption: bool,
    /// Tags applied to a newly created S3 bucket
    pub s3_bucket_tags: Map<String, String>,
    /// Tags applied to a newly created lock table
    pub dynamodb_table_tags: Map<String, String>,
    /// Labels applied to a newly created GCS bucket
    pub gcs_bucket_labels: Map<String, String>,
}

impl RemoteStateSpec {
    /// Build a spec from a backend kind and the raw configuration mapping,
    /// consuming the engine-only keys.
    pub fn from_config(backend: impl Into<String>, mut config: Map<String, Value>) -> Self {
        let flag = |config: &mut Map<String, Value>, key: &str, default: bool| {
            config
                .shift_remove(key)
                .as_ref()
                .and_then(Value::as_bool)
                .unwrap_or(default)
        };
        let string_map = |config: &mut Map<String, Value>, key: &str| {
            config
                .shift_remove(key)
                .as_ref()
                .and_then(Value::as_object)
                .map(|object| {
                    object
                        .iter()
                        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                        .collect()
                })
                .unwrap_or_default()
        };

        let disable_init = flag(&mut config, "disable_init", false);
        let skip_bucket_creation = flag(&mut config, "skip_bucket_creation", false);
        let skip_bucket_versioning = flag(&mut config, "skip_bucket_versioning", false);
        let skip_bucket_ssencryption = flag(&mut config, "skip_bucket_ssencryption", false);
        let skip_bucket_accesslogging = flag(&mut config, "skip_bucket_accesslogging", false);
        let enable_lock_table_ssencryption =
            flag(&mut config, "enable_lock_table_ssencryption", true);
        let s3_bucket_tags = string_map(&mut config, "s3_bucket_tags");
        let dynamodb_table_tags = string_map(&mut config, "dynamodb_table_tags");
        let gcs_bucket_labels = string_map(&mut config, "gcs_bucket_labels");

        Self {
            backend: backend.into(),
            config,
            disable_init,
            skip_bucket_creation,
            skip_bucket_versioning,
            skip_bucket_ssencryption,
            skip_bucket_accesslogging,
            enable_lock_table_ssencryption,
            s3_bucket_tags,
            dynamodb_table_tags,
            gcs_bucket_labels,
        }
    }

    /// Get a string attribute from the forwarded configuration
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }

    /// The configuration mapping forwarded to the wrapped tool.
    /// Engine-only keys were already consumed by [`Self::from_config`].
    pub fn forwarded_config(&self) -> &Map<String, Value> {
        &self.config
    }

    /// Apply environment overrides. `VELA_DISABLE_INIT=1|true|yes` forces
    /// `disable_init` on regardless of the configuration file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var(DISABLE_INIT_ENV_VAR) {
            if matches!(value.as_str(), "1" | "true" | "yes") {
                self.disable_init = true;
            }
        }
    }
}

/// One parsed configuration file. Immutable once constructed; consumed by the
/// merge engine.
#[derive(Debug, Clone, Default)]
pub struct ConfigNode {
    /// Absolute path of the file this node was parsed from
    pub path: PathBuf,
    /// Reference to the parent configuration, if any
    pub include: Option<IncludeRef>,
    /// Remote state declaration, if any
    pub remote_state: Option<RemoteStateSpec>,
    /// Named `before_hook` blocks in file order
    pub before_hooks: Map<String, Hook>,
    /// Named `after_hook` blocks in file order
    pub after_hooks: Map<String, Hook>,
    /// Named `extra_arguments` blocks in file order
    pub extra_args: Map<String, ExtraArgs>,
    /// Module source for the wrapped tool
    pub source: Option<String>,
    /// Other top-level scalar fields, passed through untouched
    pub fields: Map<String, Value>,
}

/// The result of merging an include chain from root to leaf
#[derive(Debug, Clone, Default)]
pub struct ResolvedConfig {
    /// Final remote state declaration (child fully overrides parent)
    pub remote_state: Option<RemoteStateSpec>,
    /// Merged `before_hook` blocks, parent-originated names first
    pub before_hooks: Map<String, Hook>,
    /// Merged `after_hook` blocks, parent-originated names first
    pub after_hooks: Map<String, Hook>,
    /// Merged `extra_arguments` blocks, parent-originated names first.
    /// Map order is application order.
    pub extra_args: Map<String, ExtraArgs>,
    /// Final module source (child wins)
    pub source: Option<String>,
    /// Merged pass-through scalar fields (child wins per key)
    pub fields: Map<String, Value>,
}
