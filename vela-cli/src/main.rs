use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use hcl::Map;
use tokio::task::JoinSet;

use vela_backend::InitMode;

mod invoker;

use invoker::WrappedTool;

#[derive(Parser)]
#[command(name = "vela")]
#[command(about = "Configuration inheritance and remote state for wrapped infrastructure tools", long_about = None)]
struct Cli {
    /// Directory containing the module's vela.hcl
    #[arg(long, global = true, default_value = ".")]
    working_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the wrapped tool with the reconciled backend
    Init {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Show the wrapped tool's execution plan
    Plan {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Apply changes through the wrapped tool
    Apply {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Destroy resources through the wrapped tool
    Destroy {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Validate the module through the wrapped tool
    Validate {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Read outputs from the wrapped tool
    Output {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Run a command in every module under the working directory
    RunAll {
        /// Wrapped-tool command to run (e.g. plan, apply)
        command: String,

        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,

        /// Abort remaining modules after the first failure
        #[arg(long)]
        fail_fast: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { args } => run_module(cli.working_dir, "init".into(), args).await,
        Commands::Plan { args } => run_module(cli.working_dir, "plan".into(), args).await,
        Commands::Apply { args } => run_module(cli.working_dir, "apply".into(), args).await,
        Commands::Destroy { args } => run_module(cli.working_dir, "destroy".into(), args).await,
        Commands::Validate { args } => run_module(cli.working_dir, "validate".into(), args).await,
        Commands::Output { args } => run_module(cli.working_dir, "output".into(), args).await,
        Commands::RunAll {
            command,
            args,
            fail_fast,
        } => run_all(&cli.working_dir, command, args, fail_fast).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Resolve, reconcile, and invoke one module
async fn run_module(dir: PathBuf, command: String, user_args: Vec<String>) -> Result<(), String> {
    let config_path = dir.join(vela_config::CONFIG_FILE_NAME);
    let mut resolved = vela_config::resolve(&config_path).map_err(|e| e.to_string())?;

    let mode = match resolved.remote_state.as_mut() {
        Some(spec) => {
            spec.apply_env_overrides();
            vela_backend::reconcile_spec(spec).await.map_err(|e| {
                if e.is_retryable() {
                    format!("{} (retry the command)", e)
                } else {
                    e.to_string()
                }
            })?
        }
        // No remote_state block: plain initialization with no backend config
        None => InitMode::Full(Map::new()),
    };

    let tool = WrappedTool::new(&dir, resolved);
    tool.run(&command, &user_args, &mode).await
}

/// Run a command across every module found under `dir`, concurrently.
/// Each module owns its resolution and reconciliation; one module's failure
/// leaves siblings running unless `fail_fast` is set.
async fn run_all(
    dir: &Path,
    command: String,
    user_args: Vec<String>,
    fail_fast: bool,
) -> Result<(), String> {
    let modules = find_modules(dir)?;
    if modules.is_empty() {
        return Err(format!(
            "No {} found under {}",
            vela_config::CONFIG_FILE_NAME,
            dir.display()
        ));
    }
    println!(
        "{} {} in {} module(s)",
        "Running".cyan(),
        command.bold(),
        modules.len()
    );

    let mut tasks = JoinSet::new();
    for module in modules {
        let command = command.clone();
        let user_args = user_args.clone();
        tasks.spawn(async move {
            let result = run_module(module.clone(), command, user_args).await;
            (module, result)
        });
    }

    let mut failed = 0usize;
    while let Some(joined) = tasks.join_next().await {
        let (module, result) = joined.map_err(|e| e.to_string())?;
        match result {
            Ok(()) => println!("{} {}", "ok".green(), module.display()),
            Err(e) => {
                eprintln!("{} {}: {}", "failed".red().bold(), module.display(), e);
                failed += 1;
                if fail_fast {
                    tasks.abort_all();
                    return Err(format!("Aborted after failure in {}", module.display()));
                }
            }
        }
    }

    if failed > 0 {
        Err(format!("{} module(s) failed", failed))
    } else {
        Ok(())
    }
}

/// Collect every directory under `root` containing a configuration file,
/// skipping hidden directories (including the wrapped tool's caches).
fn find_modules(root: &Path) -> Result<Vec<PathBuf>, String> {
    let mut modules = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(current) = stack.pop() {
        if current.join(vela_config::CONFIG_FILE_NAME).is_file() {
            modules.push(current.clone());
        }
        let entries = fs::read_dir(&current)
            .map_err(|e| format!("Failed to read directory {}: {}", current.display(), e))?;
        for entry in entries {
            let entry = entry.map_err(|e| e.to_string())?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            stack.push(path);
        }
    }

    modules.sort();
    Ok(modules)
}
