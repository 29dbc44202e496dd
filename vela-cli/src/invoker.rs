//! Wrapped-tool invocation
//!
//! Runs the external tool with the resolved configuration: initialization
//! first (with the reconciled backend configuration, or with the backend
//! disabled), then the requested command with merged extra arguments, framed
//! by before/after hooks.

use std::path::{Path, PathBuf};

use colored::Colorize;
use hcl::{Map, Value};
use tokio::process::Command;
use vela_backend::InitMode;
use vela_config::{Hook, ResolvedConfig};

/// Environment variable overriding the wrapped tool binary
pub const TOOL_BINARY_ENV_VAR: &str = "VELA_TF_BINARY";

/// Wrapped tool binary used when no override is set
const DEFAULT_BINARY: &str = "terraform";

/// The external tool a module's commands are forwarded to
pub struct WrappedTool {
    binary: String,
    working_dir: PathBuf,
    config: ResolvedConfig,
}

impl WrappedTool {
    /// Create an invoker for the module at `working_dir`
    pub fn new(working_dir: &Path, config: ResolvedConfig) -> Self {
        let binary =
            std::env::var(TOOL_BINARY_ENV_VAR).unwrap_or_else(|_| DEFAULT_BINARY.to_string());
        Self::with_binary(binary, working_dir, config)
    }

    /// Create an invoker with an explicit binary
    pub fn with_binary(
        binary: impl Into<String>,
        working_dir: &Path,
        config: ResolvedConfig,
    ) -> Self {
        Self {
            binary: binary.into(),
            working_dir: working_dir.to_path_buf(),
            config,
        }
    }

    /// Run `command` against the wrapped tool.
    ///
    /// Order: before hooks, initialization, the command itself (unless the
    /// command *is* `init`), after hooks. A failing before hook aborts the
    /// module before anything touches the wrapped tool.
    pub async fn run(
        &self,
        command: &str,
        user_args: &[String],
        mode: &InitMode,
    ) -> Result<(), String> {
        self.run_hooks(&self.config.before_hooks, command).await?;

        let init_user_args: &[String] = if command == "init" { user_args } else { &[] };
        self.run_init(mode, init_user_args).await?;

        if command != "init" {
            let mut args = vec![command.to_string()];
            args.extend(self.extra_arguments(command)?);
            args.extend(user_args.iter().cloned());
            self.exec(&args).await?;
        }

        self.run_hooks(&self.config.after_hooks, command).await
    }

    async fn run_init(&self, mode: &InitMode, user_args: &[String]) -> Result<(), String> {
        let mut args = vec!["init".to_string()];
        match mode {
            InitMode::BackendDisabled => args.push("-backend=false".to_string()),
            InitMode::Full(backend_config) => {
                for (key, value) in backend_config {
                    args.push(format!("-backend-config={}={}", key, render_value(value)));
                }
            }
        }
        // init is a command like any other to extra_arguments blocks
        args.extend(self.extra_arguments("init")?);
        args.extend(user_args.iter().cloned());
        self.exec(&args).await
    }

    /// Arguments contributed by `extra_arguments` blocks that apply to
    /// `command`, in merged (parent-first) order.
    fn extra_arguments(&self, command: &str) -> Result<Vec<String>, String> {
        let mut args = Vec::new();
        for (name, block) in &self.config.extra_args {
            if !block.applies_to(command) {
                continue;
            }
            args.extend(block.arguments.iter().cloned());
            for file in &block.required_var_files {
                if !self.working_dir.join(file).is_file() {
                    return Err(format!(
                        "Required var file {} from extra_arguments \"{}\" not found",
                        file, name
                    ));
                }
                args.push(format!("-var-file={}", file));
            }
            for file in &block.optional_var_files {
                if self.working_dir.join(file).is_file() {
                    args.push(format!("-var-file={}", file));
                }
            }
        }
        Ok(args)
    }

    async fn run_hooks(&self, hooks: &Map<String, Hook>, command: &str) -> Result<(), String> {
        for (name, hook) in hooks {
            if !hook.applies_to(command) || hook.execute.is_empty() {
                continue;
            }
            println!("{} hook {}", "Running".cyan(), name.bold());
            let status = Command::new(&hook.execute[0])
                .args(&hook.execute[1..])
                .current_dir(&self.working_dir)
                .status()
                .await
                .map_err(|e| format!("Hook \"{}\" failed to start: {}", name, e))?;
            if !status.success() {
                return Err(format!("Hook \"{}\" exited with {}", name, status));
            }
        }
        Ok(())
    }

    async fn exec(&self, args: &[String]) -> Result<(), String> {
        tracing::debug!(binary = %self.binary, ?args, "invoking wrapped tool");
        let status = Command::new(&self.binary)
            .args(args)
            .current_dir(&self.working_dir)
            .status()
            .await
            .map_err(|e| format!("Failed to start {}: {}", self.binary, e))?;
        if !status.success() {
            return Err(format!("{} {} exited with {}", self.binary, args[0], status));
        }
        Ok(())
    }
}

/// Render a backend-config value for the command line: strings verbatim,
/// everything else as JSON.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}
