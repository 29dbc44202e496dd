//! Locate ancestor configuration files by walking up the directory tree

use std::path::{Component, Path, PathBuf};

use crate::error::{ConfigError, ConfigResult};

/// Find the nearest ancestor configuration file above `child_dir`.
///
/// The search starts at the *parent* of `child_dir`, so the configuration
/// file inside `child_dir` itself is never returned. Each ancestor is checked
/// in turn until the filesystem root has been passed, at which point the
/// search fails with [`ConfigError::NoParentConfig`]. The walk is iterative
/// and bounded by the depth of `child_dir`.
pub fn find_in_parent_folders(child_dir: &Path) -> ConfigResult<PathBuf> {
    for ancestor in child_dir.ancestors().skip(1) {
        let candidate = ancestor.join(crate::CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    Err(ConfigError::NoParentConfig {
        file: crate::CONFIG_FILE_NAME,
        start: child_dir.to_path_buf(),
    })
}

/// Compute the relative path from the directory `from` to the path `to`.
///
/// Both paths must be absolute. Returns `.` when they are equal.
pub fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from_components: Vec<Component> = from.components().collect();
    let to_components: Vec<Component> = to.components().collect();

    let common = from_components
        .iter()
        .zip(to_components.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut result = PathBuf::new();
    for _ in common..from_components.len() {
        result.push("..");
    }
    for component in &to_components[common..] {
        result.push(component);
    }

    if result.as_os_str().is_empty() {
        result.push(".");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_find_in_parent_folders() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("infra");
        let child = root.join("prod").join("mysql");
        fs::create_dir_all(&child).unwrap();
        fs::write(root.join(crate::CONFIG_FILE_NAME), "").unwrap();

        let found = find_in_parent_folders(&child).unwrap();
        assert_eq!(found, root.join(crate::CONFIG_FILE_NAME));
    }

    #[test]
    fn test_find_skips_own_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("infra");
        let child = root.join("mysql");
        fs::create_dir_all(&child).unwrap();
        fs::write(root.join(crate::CONFIG_FILE_NAME), "").unwrap();
        fs::write(child.join(crate::CONFIG_FILE_NAME), "").unwrap();

        // The child's own file must not satisfy the search
        let found = find_in_parent_folders(&child).unwrap();
        assert_eq!(found, root.join(crate::CONFIG_FILE_NAME));
    }

    #[test]
    fn test_find_fails_at_filesystem_root() {
        // A fresh temp directory has no vela.hcl anywhere above it; the walk
        // must terminate at the root with an error rather than loop.
        let dir = tempfile::tempdir().unwrap();
        let result = find_in_parent_folders(dir.path());
        assert!(matches!(result, Err(ConfigError::NoParentConfig { .. })));
    }

    #[test]
    fn test_relative_path_child() {
        assert_eq!(
            relative_path(Path::new("/infra"), Path::new("/infra/mysql")),
            PathBuf::from("mysql")
        );
    }

    #[test]
    fn test_relative_path_sibling() {
        assert_eq!(
            relative_path(Path::new("/infra/mysql"), Path::new("/infra/redis")),
            PathBuf::from("../redis")
        );
    }

    #[test]
    fn test_relative_path_parent_file() {
        assert_eq!(
            relative_path(Path::new("/infra/prod/mysql"), Path::new("/infra/vela.hcl")),
            PathBuf::from("../../vela.hcl")
        );
    }

    #[test]
    fn test_relative_path_equal() {
        assert_eq!(
            relative_path(Path::new("/infra"), Path::new("/infra")),
            PathBuf::from(".")
        );
    }
}
