//! Parse one `vela.hcl` file into a [`ConfigNode`]
//!
//! Parsing evaluates every attribute expression against the file's own
//! location. The `include` block's `path` is evaluated first (only
//! `find_in_parent_folders` and `get_env` are meaningful there); once the
//! include target is known, `path_relative_to_include` becomes available for
//! the rest of the file.

use std::fs;
use std::path::{Path, PathBuf};

use hcl::eval::Evaluate;
use hcl::{Attribute, Block, Body, Map, Structure, Value};

use crate::config::{ConfigNode, ExtraArgs, Hook, IncludeRef, RemoteStateSpec};
use crate::error::{ConfigError, ConfigResult};
use crate::functions::{self, FileScope};

/// Parse the configuration file at `path`.
///
/// `resolving_from` is the path of the configuration file on whose behalf the
/// resolution started, set when `path` is being parsed as an include target.
pub fn parse_config_file(path: &Path, resolving_from: Option<&Path>) -> ConfigResult<ConfigNode> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let body = hcl::parse(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let config_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/"));
    let resolving_dir = resolving_from
        .and_then(Path::parent)
        .map(Path::to_path_buf);

    let ctx = functions::eval_context();
    let eval = |expr: &hcl::Expression, scope: FileScope| -> ConfigResult<Value> {
        functions::with_scope(scope, || {
            expr.evaluate(&ctx).map_err(|e| ConfigError::Eval {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
        })
    };

    // The include block is handled first so that the rest of the file can be
    // evaluated with path_relative_to_include available.
    let include = parse_include(path, &body, &config_dir, resolving_dir.as_deref(), &eval)?;

    let scope = FileScope {
        config_dir: config_dir.clone(),
        include_dir: include
            .as_ref()
            .and_then(|i| i.target.parent().map(Path::to_path_buf)),
        resolving_dir,
    };

    let mut node = ConfigNode {
        path: path.to_path_buf(),
        include,
        ..ConfigNode::default()
    };

    for structure in body {
        match structure {
            Structure::Attribute(attr) => {
                let value = eval(&attr.expr, scope.clone())?;
                if attr.key.as_str() == "source" {
                    node.source = Some(expect_string(path, "source", value)?);
                } else {
                    node.fields.insert(attr.key.as_str().to_string(), value);
                }
            }
            Structure::Block(block) => match block.identifier.as_str() {
                "include" => {}
                "remote_state" => {
                    if node.remote_state.is_some() {
                        return Err(ConfigError::DuplicateBlock {
                            path: path.to_path_buf(),
                            block: "remote_state",
                        });
                    }
                    node.remote_state =
                        Some(parse_remote_state(path, &block, &scope, &eval)?);
                }
                "before_hook" => {
                    let (name, hook) = parse_hook(path, &block, &scope, &eval)?;
                    node.before_hooks.insert(name, hook);
                }
                "after_hook" => {
                    let (name, hook) = parse_hook(path, &block, &scope, &eval)?;
                    node.after_hooks.insert(name, hook);
                }
                "extra_arguments" => {
                    let (name, args) = parse_extra_args(path, &block, &scope, &eval)?;
                    node.extra_args.insert(name, args);
                }
                other => {
                    tracing::warn!(file = %path.display(), block = other, "ignoring unknown block");
                }
            },
        }
    }

    Ok(node)
}

fn parse_include(
    path: &Path,
    body: &Body,
    config_dir: &Path,
    resolving_dir: Option<&Path>,
    eval: &impl Fn(&hcl::Expression, FileScope) -> ConfigResult<Value>,
) -> ConfigResult<Option<IncludeRef>> {
    let mut blocks = body.blocks().filter(|b| b.identifier.as_str() == "include");
    let Some(block) = blocks.next() else {
        return Ok(None);
    };
    if blocks.next().is_some() {
        return Err(ConfigError::DuplicateBlock {
            path: path.to_path_buf(),
            block: "include",
        });
    }

    let attr = find_attribute(block, "path").ok_or(ConfigError::MissingAttribute {
        path: path.to_path_buf(),
        block: "include",
        attribute: "path",
    })?;

    let scope = FileScope {
        config_dir: config_dir.to_path_buf(),
        include_dir: None,
        resolving_dir: resolving_dir.map(Path::to_path_buf),
    };
    let raw_path = expect_string(path, "include.path", eval(&attr.expr, scope)?)?;

    let target = if Path::new(&raw_path).is_absolute() {
        PathBuf::from(&raw_path)
    } else {
        config_dir.join(&raw_path)
    };

    Ok(Some(IncludeRef { raw_path, target }))
}

fn parse_remote_state(
    path: &Path,
    block: &Block,
    scope: &FileScope,
    eval: &impl Fn(&hcl::Expression, FileScope) -> ConfigResult<Value>,
) -> ConfigResult<RemoteStateSpec> {
    let backend_attr = find_attribute(block, "backend").ok_or(ConfigError::MissingAttribute {
        path: path.to_path_buf(),
        block: "remote_state",
        attribute: "backend",
    })?;
    let backend = expect_string(
        path,
        "remote_state.backend",
        eval(&backend_attr.expr, scope.clone())?,
    )?;

    // `config` may be written as an object attribute or as a nested block
    let mut config: Map<String, Value> = Map::new();
    if let Some(attr) = find_attribute(block, "config") {
        let value = eval(&attr.expr, scope.clone())?;
        match value {
            Value::Object(object) => config = object,
            _ => {
                return Err(ConfigError::InvalidValue {
                    path: path.to_path_buf(),
                    attribute: "remote_state.config".to_string(),
                    expected: "object",
                });
            }
        }
    } else if let Some(nested) = block.body.blocks().find(|b| b.identifier.as_str() == "config") {
        for attr in nested.body.attributes() {
            let value = eval(&attr.expr, scope.clone())?;
            config.insert(attr.key.as_str().to_string(), value);
        }
    }

    Ok(RemoteStateSpec::from_config(backend, config))
}

fn parse_hook(
    path: &Path,
    block: &Block,
    scope: &FileScope,
    eval: &impl Fn(&hcl::Expression, FileScope) -> ConfigResult<Value>,
) -> ConfigResult<(String, Hook)> {
    let name = block_name(path, block)?;
    let hook = Hook {
        execute: optional_string_list(path, block, "execute", scope, eval)?,
        commands: optional_string_list(path, block, "commands", scope, eval)?,
    };
    Ok((name, hook))
}

fn parse_extra_args(
    path: &Path,
    block: &Block,
    scope: &FileScope,
    eval: &impl Fn(&hcl::Expression, FileScope) -> ConfigResult<Value>,
) -> ConfigResult<(String, ExtraArgs)> {
    let name = block_name(path, block)?;
    let args = ExtraArgs {
        arguments: optional_string_list(path, block, "arguments", scope, eval)?,
        required_var_files: optional_string_list(path, block, "required_var_files", scope, eval)?,
        optional_var_files: optional_string_list(path, block, "optional_var_files", scope, eval)?,
        commands: optional_string_list(path, block, "commands", scope, eval)?,
    };
    Ok((name, args))
}

fn block_name(path: &Path, block: &Block) -> ConfigResult<String> {
    block
        .labels
        .first()
        .map(|label| label.as_str().to_string())
        .ok_or_else(|| ConfigError::UnlabeledBlock {
            path: path.to_path_buf(),
            block: match block.identifier.as_str() {
                "before_hook" => "before_hook",
                "after_hook" => "after_hook",
                _ => "extra_arguments",
            },
        })
}

fn find_attribute<'a>(block: &'a Block, key: &str) -> Option<&'a Attribute> {
    block.body.attributes().find(|a| a.key.as_str() == key)
}

fn expect_string(path: &Path, attribute: &str, value: Value) -> ConfigResult<String> {
    match value {
        Value::String(s) => Ok(s),
        _ => Err(ConfigError::InvalidValue {
            path: path.to_path_buf(),
            attribute: attribute.to_string(),
            expected: "string",
        }),
    }
}

fn optional_string_list(
    path: &Path,
    block: &Block,
    key: &str,
    scope: &FileScope,
    eval: &impl Fn(&hcl::Expression, FileScope) -> ConfigResult<Value>,
) -> ConfigResult<Vec<String>> {
    let Some(attr) = find_attribute(block, key) else {
        return Ok(Vec::new());
    };
    match eval(&attr.expr, scope.clone())? {
        Value::Array(items) => items
            .into_iter()
            .map(|item| expect_string(path, key, item))
            .collect(),
        _ => Err(ConfigError::InvalidValue {
            path: path.to_path_buf(),
            attribute: key.to_string(),
            expected: "list of strings",
        }),
    }
}
