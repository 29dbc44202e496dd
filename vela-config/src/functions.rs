//! Built-in expression functions
//!
//! Three functions are available in any expression position:
//!
//! - `find_in_parent_folders()` — path of the nearest ancestor `vela.hcl`,
//!   relative to the current file's directory
//! - `path_relative_to_include()` — relative path between the included
//!   (parent) file's directory and the directory of the configuration being
//!   resolved
//! - `get_env(name, default)` — environment variable lookup with a fallback
//!
//! All three are pure functions of filesystem location and environment.
//! [`hcl::eval::FuncDef`] takes plain function pointers, so the per-file
//! location is carried in a thread-local [`FileScope`] installed for the
//! duration of one file's evaluation. Evaluation is synchronous, so the scope
//! never outlives the call that set it.

use std::cell::RefCell;
use std::path::PathBuf;

use hcl::Value;
use hcl::eval::{Context, FuncArgs, FuncDef, ParamType};

use crate::find;

/// Location of the file whose expressions are being evaluated
#[derive(Debug, Clone)]
pub(crate) struct FileScope {
    /// Directory containing the current file
    pub config_dir: PathBuf,
    /// Directory of the current file's own include target, once known
    pub include_dir: Option<PathBuf>,
    /// Directory of the configuration being resolved, when the current file
    /// is itself being parsed as an include target
    pub resolving_dir: Option<PathBuf>,
}

thread_local! {
    static SCOPE: RefCell<Option<FileScope>> = const { RefCell::new(None) };
}

/// Run `f` with the given scope installed for the built-in functions
pub(crate) fn with_scope<T>(scope: FileScope, f: impl FnOnce() -> T) -> T {
    SCOPE.with(|cell| *cell.borrow_mut() = Some(scope));
    let result = f();
    SCOPE.with(|cell| *cell.borrow_mut() = None);
    result
}

fn current_scope() -> Result<FileScope, String> {
    SCOPE.with(|cell| {
        cell.borrow()
            .clone()
            .ok_or_else(|| "no configuration file in scope".to_string())
    })
}

/// Build the evaluation context exposing the built-in functions
pub(crate) fn eval_context() -> Context<'static> {
    let mut ctx = Context::new();
    ctx.declare_func(
        "find_in_parent_folders",
        FuncDef::builder().build(func_find_in_parent_folders),
    );
    ctx.declare_func(
        "path_relative_to_include",
        FuncDef::builder().build(func_path_relative_to_include),
    );
    ctx.declare_func(
        "get_env",
        FuncDef::builder()
            .param(ParamType::String)
            .param(ParamType::String)
            .build(func_get_env),
    );
    ctx
}

fn func_find_in_parent_folders(_args: FuncArgs) -> Result<Value, String> {
    let scope = current_scope()?;
    let found = find::find_in_parent_folders(&scope.config_dir).map_err(|e| e.to_string())?;
    let relative = find::relative_path(&scope.config_dir, &found);
    Ok(Value::from(relative.to_string_lossy().into_owned()))
}

fn func_path_relative_to_include(_args: FuncArgs) -> Result<Value, String> {
    let scope = current_scope()?;

    // Inside an include target the path runs from this file towards the
    // configuration being resolved; inside the leaf it runs from the include
    // target towards this file. Both directions yield the child-relative
    // path, e.g. "mysql" for mysql/vela.hcl including the folder above.
    let (from, to) = if let Some(resolving_dir) = &scope.resolving_dir {
        (scope.config_dir.clone(), resolving_dir.clone())
    } else if let Some(include_dir) = &scope.include_dir {
        (include_dir.clone(), scope.config_dir.clone())
    } else {
        return Err("path_relative_to_include() requires an include block".to_string());
    };

    let relative = find::relative_path(&from, &to);
    Ok(Value::from(relative.to_string_lossy().into_owned()))
}

fn func_get_env(args: FuncArgs) -> Result<Value, String> {
    let name = args[0].as_str().unwrap_or_default();
    let default = args[1].as_str().unwrap_or_default();
    let value = std::env::var(name).unwrap_or_else(|_| default.to_string());
    Ok(Value::from(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hcl::eval::Evaluate;
    use std::fs;

    fn eval(scope: FileScope, expression: &str) -> Result<Value, String> {
        let body = hcl::parse(&format!("x = {}\n", expression)).unwrap();
        let attr = body.attributes().next().unwrap();
        let ctx = eval_context();
        with_scope(scope, || {
            attr.expr.evaluate(&ctx).map_err(|e| e.to_string())
        })
    }

    #[test]
    fn test_get_env_default() {
        let scope = FileScope {
            config_dir: PathBuf::from("/"),
            include_dir: None,
            resolving_dir: None,
        };
        let value = eval(scope, r#"get_env("VELA_TEST_SURELY_UNSET", "fallback")"#).unwrap();
        assert_eq!(value, Value::from("fallback"));
    }

    #[test]
    fn test_get_env_set() {
        unsafe { std::env::set_var("VELA_TEST_FUNCTIONS_SET", "from-env") };
        let scope = FileScope {
            config_dir: PathBuf::from("/"),
            include_dir: None,
            resolving_dir: None,
        };
        let value = eval(scope, r#"get_env("VELA_TEST_FUNCTIONS_SET", "fallback")"#).unwrap();
        assert_eq!(value, Value::from("from-env"));
    }

    #[test]
    fn test_find_in_parent_folders_relative_result() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("infra");
        let child = root.join("mysql");
        fs::create_dir_all(&child).unwrap();
        fs::write(root.join(crate::CONFIG_FILE_NAME), "").unwrap();

        let scope = FileScope {
            config_dir: child,
            include_dir: None,
            resolving_dir: None,
        };
        let value = eval(scope, "find_in_parent_folders()").unwrap();
        assert_eq!(value, Value::from("../vela.hcl"));
    }

    #[test]
    fn test_path_relative_to_include_in_leaf() {
        let scope = FileScope {
            config_dir: PathBuf::from("/infra/mysql"),
            include_dir: Some(PathBuf::from("/infra")),
            resolving_dir: None,
        };
        let value = eval(scope, "path_relative_to_include()").unwrap();
        assert_eq!(value, Value::from("mysql"));
    }

    #[test]
    fn test_path_relative_to_include_in_parent() {
        // Same file location, but parsed as the include target of a child
        let scope = FileScope {
            config_dir: PathBuf::from("/infra"),
            include_dir: None,
            resolving_dir: Some(PathBuf::from("/infra/mysql")),
        };
        let value = eval(scope, "path_relative_to_include()").unwrap();
        assert_eq!(value, Value::from("mysql"));
    }

    #[test]
    fn test_path_relative_to_include_without_include() {
        let scope = FileScope {
            config_dir: PathBuf::from("/infra"),
            include_dir: None,
            resolving_dir: None,
        };
        let result = eval(scope, "path_relative_to_include()");
        assert!(result.is_err());
    }

    #[test]
    fn test_interpolation_inside_template() {
        let scope = FileScope {
            config_dir: PathBuf::from("/infra"),
            include_dir: None,
            resolving_dir: Some(PathBuf::from("/infra/mysql")),
        };
        let value = eval(scope, r#""${path_relative_to_include()}/terraform.tfstate""#).unwrap();
        assert_eq!(value, Value::from("mysql/terraform.tfstate"));
    }
}
