//! Merge an include chain into a single [`ResolvedConfig`]
//!
//! Resolution walks the chain leaf-to-root, then folds it back root-to-leaf
//! so the merge is a plain left-to-right fold: each child is merged onto the
//! accumulated parent result. Merging the same chain in any grouping yields
//! the same result (the named-block override is last-writer-wins per name).

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use hcl::Map;

use crate::config::{ConfigNode, ResolvedConfig};
use crate::error::{ConfigError, ConfigResult};
use crate::parser;

/// Resolve the configuration chain rooted at `path`.
///
/// Fails with [`ConfigError::Cycle`] when an include chain revisits a file
/// and [`ConfigError::IncludeNotFound`] when an include target is missing.
pub fn resolve(path: &Path) -> ConfigResult<ResolvedConfig> {
    let mut visited = HashSet::new();
    resolve_inner(path, None, &mut visited)
}

fn resolve_inner(
    path: &Path,
    resolving_from: Option<&Path>,
    visited: &mut HashSet<PathBuf>,
) -> ConfigResult<ResolvedConfig> {
    let canonical = fs::canonicalize(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if !visited.insert(canonical.clone()) {
        return Err(ConfigError::Cycle {
            path: path.to_path_buf(),
        });
    }

    let node = parser::parse_config_file(&canonical, resolving_from)?;

    let parent = match &node.include {
        Some(include) => {
            if !include.target.is_file() {
                return Err(ConfigError::IncludeNotFound {
                    target: include.target.clone(),
                    referenced_from: canonical.clone(),
                });
            }
            tracing::debug!(
                child = %canonical.display(),
                parent = %include.target.display(),
                "resolving include"
            );
            resolve_inner(&include.target, Some(&canonical), visited)?
        }
        None => ResolvedConfig::default(),
    };

    Ok(merge_node(parent, node))
}

/// Merge a child node onto an already-resolved parent.
///
/// Named blocks override wholesale by name (an empty child block erases the
/// parent's effect for that name); names unique to the child are appended
/// after all parent-originated entries, so child-originated extra arguments
/// apply later and win for colliding variable definitions. `remote_state`
/// replaces as a whole; scalars are child-wins.
pub fn merge_node(mut parent: ResolvedConfig, child: ConfigNode) -> ResolvedConfig {
    merge_blocks(&mut parent.before_hooks, child.before_hooks);
    merge_blocks(&mut parent.after_hooks, child.after_hooks);
    merge_blocks(&mut parent.extra_args, child.extra_args);

    if child.remote_state.is_some() {
        parent.remote_state = child.remote_state;
    }
    if child.source.is_some() {
        parent.source = child.source;
    }
    for (key, value) in child.fields {
        parent.fields.insert(key, value);
    }

    parent
}

/// Name-keyed block merge. `Map::insert` keeps the original position for an
/// existing name, which preserves "parent-originated names first" ordering.
fn merge_blocks<T>(parent: &mut Map<String, T>, child: Map<String, T>) {
    for (name, block) in child {
        parent.insert(name, block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExtraArgs, Hook};
    use std::fs;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn config_in(dir: &Path, content: &str) -> PathBuf {
        write(dir, crate::CONFIG_FILE_NAME, content)
    }

    #[test]
    fn test_resolve_inherits_remote_state_and_relative_key() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("infra");
        let child = root.join("mysql");
        fs::create_dir_all(&child).unwrap();

        config_in(
            &root,
            r#"
remote_state {
  backend = "s3"
  config = {
    bucket = "my-state"
    key    = "${path_relative_to_include()}/terraform.tfstate"
    region = "eu-west-1"
  }
}
"#,
        );
        let leaf = config_in(
            &child,
            r#"
include {
  path = find_in_parent_folders()
}

source = "git::modules/mysql"
"#,
        );

        let resolved = resolve(&leaf).unwrap();
        assert_eq!(resolved.source.as_deref(), Some("git::modules/mysql"));

        let remote_state = resolved.remote_state.unwrap();
        assert_eq!(remote_state.backend, "s3");
        // The parent's expression is evaluated on behalf of the child
        assert_eq!(remote_state.get_string("key"), Some("mysql/terraform.tfstate"));
    }

    #[test]
    fn test_child_remote_state_fully_replaces_parent() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("infra");
        let child = root.join("mysql");
        fs::create_dir_all(&child).unwrap();

        config_in(
            &root,
            r#"
remote_state {
  backend = "s3"
  config = {
    bucket = "parent-bucket"
    region = "eu-west-1"
  }
}
"#,
        );
        let leaf = config_in(
            &child,
            r#"
include {
  path = find_in_parent_folders()
}

remote_state {
  backend = "gcs"
  config = {
    bucket = "child-bucket"
  }
}
"#,
        );

        let resolved = resolve(&leaf).unwrap();
        let remote_state = resolved.remote_state.unwrap();
        assert_eq!(remote_state.backend, "gcs");
        assert_eq!(remote_state.get_string("bucket"), Some("child-bucket"));
        // No field-level merge with the parent's block
        assert_eq!(remote_state.get_string("region"), None);
    }

    #[test]
    fn test_named_block_override_and_ordering() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("infra");
        let child = root.join("mysql");
        fs::create_dir_all(&child).unwrap();

        config_in(
            &root,
            r#"
extra_arguments "common" {
  arguments = ["-var=env=parent"]
}
"#,
        );
        let leaf = config_in(
            &child,
            r#"
include {
  path = find_in_parent_folders()
}

extra_arguments "common" {
  arguments = ["-var=env=child"]
}

extra_arguments "extra" {
  arguments = ["-no-color"]
}
"#,
        );

        let resolved = resolve(&leaf).unwrap();
        let names: Vec<&String> = resolved.extra_args.keys().collect();
        assert_eq!(names, ["common", "extra"]);
        assert_eq!(
            resolved.extra_args.get("common").unwrap().arguments,
            vec!["-var=env=child"]
        );
        assert_eq!(
            resolved.extra_args.get("extra").unwrap().arguments,
            vec!["-no-color"]
        );
    }

    #[test]
    fn test_empty_child_block_removes_parent_effect() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("infra");
        let child = root.join("mysql");
        fs::create_dir_all(&child).unwrap();

        config_in(
            &root,
            r#"
before_hook "guard" {
  execute = ["false"]
}
"#,
        );
        let leaf = config_in(
            &child,
            r#"
include {
  path = find_in_parent_folders()
}

before_hook "guard" {
}
"#,
        );

        let resolved = resolve(&leaf).unwrap();
        let guard = resolved.before_hooks.get("guard").unwrap();
        assert!(guard.execute.is_empty());
    }

    #[test]
    fn test_hooks_of_distinct_names_both_survive_parent_first() {
        // Ordering across distinct names in the same phase is parent before
        // child; this pins down the assumption.
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("infra");
        let child = root.join("mysql");
        fs::create_dir_all(&child).unwrap();

        config_in(
            &root,
            r#"
before_hook "parent_hook" {
  execute = ["echo", "parent"]
}
"#,
        );
        let leaf = config_in(
            &child,
            r#"
include {
  path = find_in_parent_folders()
}

before_hook "child_hook" {
  execute = ["echo", "child"]
}
"#,
        );

        let resolved = resolve(&leaf).unwrap();
        let names: Vec<&String> = resolved.before_hooks.keys().collect();
        assert_eq!(names, ["parent_hook", "child_hook"]);
    }

    #[test]
    fn test_three_level_chain_folds_left_to_right() {
        let dir = tempfile::tempdir().unwrap();
        let top = dir.path().join("org");
        let mid = top.join("prod");
        let leaf_dir = mid.join("mysql");
        fs::create_dir_all(&leaf_dir).unwrap();

        config_in(&top, r#"source = "git::modules/top""#);
        // The middle level must reference the top level explicitly;
        // find_in_parent_folders would resolve to the same file.
        config_in(
            &mid,
            r#"
include {
  path = "../vela.hcl"
}

extra_arguments "mid" {
  arguments = ["-lock-timeout=10m"]
}
"#,
        );
        let leaf = config_in(
            &leaf_dir,
            r#"
include {
  path = find_in_parent_folders()
}

extra_arguments "leaf" {
  arguments = ["-no-color"]
}
"#,
        );

        let resolved = resolve(&leaf).unwrap();
        // Manual left-to-right fold over (top, mid, leaf)
        let top_node = parser::parse_config_file(&top.join(crate::CONFIG_FILE_NAME), None).unwrap();
        let mid_node = parser::parse_config_file(&mid.join(crate::CONFIG_FILE_NAME), None).unwrap();
        let leaf_node = parser::parse_config_file(&leaf, None).unwrap();
        let folded = merge_node(
            merge_node(merge_node(ResolvedConfig::default(), top_node), mid_node),
            leaf_node,
        );

        assert_eq!(resolved.source, folded.source);
        let resolved_names: Vec<&String> = resolved.extra_args.keys().collect();
        let folded_names: Vec<&String> = folded.extra_args.keys().collect();
        assert_eq!(resolved_names, folded_names);
        assert_eq!(resolved_names, ["mid", "leaf"]);
        assert_eq!(resolved.source.as_deref(), Some("git::modules/top"));
    }

    #[test]
    fn test_include_cycle_detected() {
        let dir = tempfile::tempdir().unwrap();
        let a_dir = dir.path().join("a");
        let b_dir = dir.path().join("b");
        fs::create_dir_all(&a_dir).unwrap();
        fs::create_dir_all(&b_dir).unwrap();

        let a = config_in(
            &a_dir,
            r#"
include {
  path = "../b/vela.hcl"
}
"#,
        );
        config_in(
            &b_dir,
            r#"
include {
  path = "../a/vela.hcl"
}
"#,
        );

        let error = resolve(&a).unwrap_err();
        assert!(matches!(error, ConfigError::Cycle { .. }));
    }

    #[test]
    fn test_self_include_cycle_detected() {
        let dir = tempfile::tempdir().unwrap();
        let leaf = config_in(
            dir.path(),
            r#"
include {
  path = "vela.hcl"
}
"#,
        );

        let error = resolve(&leaf).unwrap_err();
        assert!(matches!(error, ConfigError::Cycle { .. }));
    }

    #[test]
    fn test_missing_include_target() {
        let dir = tempfile::tempdir().unwrap();
        let leaf = config_in(
            dir.path(),
            r#"
include {
  path = "does/not/exist/vela.hcl"
}
"#,
        );

        let error = resolve(&leaf).unwrap_err();
        assert!(matches!(error, ConfigError::IncludeNotFound { .. }));
    }

    #[test]
    fn test_merge_node_scalar_inheritance() {
        let parent = ResolvedConfig {
            source: Some("parent-source".to_string()),
            ..ResolvedConfig::default()
        };
        let child = ConfigNode::default();
        let merged = merge_node(parent, child);
        assert_eq!(merged.source.as_deref(), Some("parent-source"));

        let parent = ResolvedConfig {
            source: Some("parent-source".to_string()),
            ..ResolvedConfig::default()
        };
        let child = ConfigNode {
            source: Some("child-source".to_string()),
            ..ConfigNode::default()
        };
        let merged = merge_node(parent, child);
        assert_eq!(merged.source.as_deref(), Some("child-source"));
    }

    #[test]
    fn test_merge_blocks_preserves_parent_position_on_collision() {
        let mut parent: Map<String, ExtraArgs> = Map::new();
        parent.insert("first".to_string(), ExtraArgs::default());
        parent.insert("second".to_string(), ExtraArgs::default());

        let mut child: Map<String, ExtraArgs> = Map::new();
        child.insert(
            "first".to_string(),
            ExtraArgs {
                arguments: vec!["-replaced".to_string()],
                ..ExtraArgs::default()
            },
        );

        merge_blocks(&mut parent, child);
        let names: Vec<&String> = parent.keys().collect();
        assert_eq!(names, ["first", "second"]);
        assert_eq!(parent.get("first").unwrap().arguments, vec!["-replaced"]);
    }

    #[test]
    fn test_empty_hook_map_entry_type_checks() {
        // Hook and ExtraArgs share the override semantics; spot-check hooks
        let mut parent: Map<String, Hook> = Map::new();
        parent.insert(
            "guard".to_string(),
            Hook {
                execute: vec!["false".to_string()],
                commands: vec![],
            },
        );
        let mut child: Map<String, Hook> = Map::new();
        child.insert("guard".to_string(), Hook::default());

        merge_blocks(&mut parent, child);
        assert!(parent.get("guard").unwrap().execute.is_empty());
    }
}
