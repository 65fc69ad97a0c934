use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use serde_json::{Map, Value as JsonValue};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use userscript_config::{AfterRunAction, ConfigProvider, FileConfigProvider};
use userscript_core::{EngineError, ExecutionTask, TaskTermination, UserScript};
use userscript_execution::FsScriptStorage;
use userscript_packages::InstallOptions;

mod cli;
mod engine;
mod host;
mod output;

use cli::{Cli, Commands, ConfigCommands, ScriptCommands};
use engine::Engine;
use host::LocalHost;

fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("userscript").join("config.yaml"))
        .ok_or_else(|| anyhow!("Cannot determine the configuration directory; pass --config"))
}

fn script_storage(cli: &Cli) -> Result<FsScriptStorage> {
    match &cli.data_dir {
        Some(dir) => Ok(FsScriptStorage::new(dir)),
        None => FsScriptStorage::default_location()
            .ok_or_else(|| anyhow!("Cannot determine the data directory; pass --data-dir")),
    }
}

/// Parse the `--args` JSON; no arguments means "use the defaults"
fn parse_args_json(args: Option<&String>) -> Result<JsonValue> {
    match args {
        Some(text) => serde_json::from_str(text).context("Failed to parse --args JSON"),
        None => Ok(JsonValue::Null),
    }
}

/// Build the JSON patch setting the dotted `key` to `value`
fn config_patch(key: &str, value: &str) -> Result<JsonValue> {
    if key.is_empty() || key.split('.').any(str::is_empty) {
        bail!("Invalid configuration key '{}'", key);
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| JsonValue::String(value.to_string()));
    Ok(key.rsplit('.').fold(value, |inner, segment| {
        let mut object = Map::new();
        object.insert(segment.to_string(), inner);
        JsonValue::Object(object)
    }))
}

fn report_termination(task: &ExecutionTask, termination: &TaskTermination) {
    debug!(task_id = %task.task_id, "Task terminated: {:?}", termination);
    if let Some(result) = &termination.result {
        output::print_json(result);
    }
}

/// Keep mounted tasks alive until Ctrl-C, then clean them all up
async fn hold_until_interrupted(engine: &Engine) -> Result<()> {
    output::print_info("Script mounted; press Ctrl-C to clean up and exit");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    let cleaned = engine.manager.clean_up_all(true).await;
    output::print_success(&format!("Cleaned up {} task(s)", cleaned));
    Ok(())
}

/// A token cancelled on Ctrl-C
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    token
}

async fn handle_run(engine: &Engine, name: &str, args: Option<&String>, keep: bool) -> Result<()> {
    let script = engine.library.get_script(name).await?;
    let params = parse_args_json(args)?;

    let (task, termination) = engine.manager.execute_and_wait(&script, params).await?;
    report_termination(&task, &termination);
    if termination.has_error {
        bail!("Script '{}' failed", name);
    }

    if termination.has_clean_up {
        if keep {
            engine.manager.mount_task(&task.task_id).await;
            hold_until_interrupted(engine).await?;
        } else {
            engine.manager.clean_up(&task.task_id).await?;
            debug!(task_id = %task.task_id, "Cleaned up after run");
        }
    }
    Ok(())
}

async fn handle_run_current(engine: &Engine) -> Result<()> {
    let run = engine.manager.execute_current().await?;
    report_termination(&run.task, &run.termination);
    if run.termination.has_error {
        bail!("Script '{}' failed", run.task.task_name);
    }

    match run.action {
        Some(AfterRunAction::Mount) | Some(AfterRunAction::Keep) => hold_until_interrupted(engine).await,
        Some(AfterRunAction::CleanUp) => {
            output::print_success("Cleaned up");
            Ok(())
        }
        Some(AfterRunAction::Prompt) | None => Ok(()),
    }
}

async fn handle_start_up(engine: &Engine) -> Result<()> {
    let report = engine.manager.run_start_up_scripts(&engine.library).await;
    for name in &report.finished {
        output::print_success(&format!("{} finished", name));
    }
    for name in &report.failed {
        output::print_error(&format!("{} failed", name));
    }
    if report.mounted.is_empty() {
        return Ok(());
    }
    for task in &report.mounted {
        output::print_info(&format!("{} mounted as task {}", task.task_name, task.task_id));
    }
    hold_until_interrupted(engine).await
}

async fn handle_scripts(engine: &Engine, command: &ScriptCommands) -> Result<()> {
    match command {
        ScriptCommands::List => {
            let rows: Vec<Vec<String>> = engine
                .library
                .list_scripts()
                .await?
                .into_iter()
                .map(|script| vec![script.name, script.lang.to_string(), script.description])
                .collect();
            output::print_table(&["NAME", "LANG", "DESCRIPTION"], &rows);
        }
        ScriptCommands::Create {
            name,
            lang,
            description,
        } => {
            let mut script = UserScript::new(name.as_str(), (*lang).into());
            if let Some(description) = description {
                script = script.with_description(description.as_str());
            }
            engine.library.create_script(&script, None).await?;
            output::print_success(&format!(
                "Created {}",
                engine.library.source_path(&script).display()
            ));
        }
        ScriptCommands::Delete { name } => {
            engine.library.delete_script(name).await?;
            output::print_success(&format!("Deleted script '{}'", name));
        }
        ScriptCommands::Import { file, name } => {
            let script = engine.library.import_script(file, name.as_deref()).await?;
            output::print_success(&format!("Imported script '{}'", script.name));
        }
    }
    Ok(())
}

async fn handle_install(engine: &Engine, modules: &[String], options: InstallOptions) -> Result<()> {
    engine
        .packages
        .install_modules(modules.to_vec(), options, Some(interrupt_token()))
        .await?;
    Ok(())
}

async fn handle_versions(engine: &Engine, package: &str, limit: Option<usize>) -> Result<()> {
    let versions = engine.packages.list_versions(package).await?;
    for version in versions.iter().take(limit.unwrap_or(usize::MAX)) {
        println!("{}", version);
    }
    Ok(())
}

fn handle_config_show(config: &FileConfigProvider, format: &str) -> Result<()> {
    let value = serde_json::to_value(config.configs()).context("Failed to serialize config")?;
    match format.to_lowercase().as_str() {
        "yaml" | "yml" => {
            let yaml = serde_yaml::to_string(&value).context("Failed to serialize to YAML")?;
            print!("{}", yaml);
        }
        "json" => output::print_json(&value),
        _ => bail!("Unknown output format: {}. Valid formats: yaml, json", format),
    }
    Ok(())
}

async fn handle_config_set(config: &FileConfigProvider, key: &str, value: &str) -> Result<()> {
    config
        .update_configs(config_patch(key, value)?)
        .await
        .with_context(|| format!("Failed to set {}", key))?;
    output::print_success(&format!("Saved {} to {}", key, config.path().display()));
    Ok(())
}

fn init_logging(cli: &Cli, config: &FileConfigProvider) -> Result<()> {
    match &cli.log_level {
        Some(level) => userscript_logging::init_simple_tracing(level),
        None => userscript_logging::init_logging_from_config(&config.configs().logging),
    }
}

fn open_config(path: &Path) -> Result<FileConfigProvider> {
    let provider = FileConfigProvider::open(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    provider
        .configs()
        .validate_all()
        .context("Invalid configuration")?;
    Ok(provider)
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    let config = Arc::new(open_config(&config_path)?);
    init_logging(&cli, &config)?;
    info!("Userscript CLI starting");

    let Some(command) = &cli.command else {
        use clap::CommandFactory;
        Cli::command().print_help().context("Failed to print help")?;
        println!();
        return Ok(());
    };

    if let Commands::Config { config_cmd } = command {
        return match config_cmd {
            ConfigCommands::Show { format } => handle_config_show(&config, format),
            ConfigCommands::Set { key, value } => handle_config_set(&config, key, value).await,
            ConfigCommands::Path => {
                println!("{}", config.path().display());
                Ok(())
            }
        };
    }

    let active_document = match command {
        Commands::RunCurrent { file } => Some(std::path::absolute(file).context("Invalid --file path")?),
        _ => None,
    };
    let host = Arc::new(LocalHost::new(active_document, cli.yes));
    let engine = Engine::new(config, host, script_storage(&cli)?);

    match command {
        Commands::Run { name, args, keep } => handle_run(&engine, name, args.as_ref(), *keep).await,
        Commands::RunCurrent { .. } => handle_run_current(&engine).await,
        Commands::StartUp => handle_start_up(&engine).await,
        Commands::Scripts { scripts_cmd } => handle_scripts(&engine, scripts_cmd).await,
        Commands::Install { modules, global, dev } => {
            handle_install(
                &engine,
                modules,
                InstallOptions {
                    global: *global,
                    dev: *dev,
                },
            )
            .await
        }
        Commands::InstallDeps => {
            engine
                .packages
                .install_extension_dependencies(Some(interrupt_token()))
                .await?;
            Ok(())
        }
        Commands::Versions { package, limit } => handle_versions(&engine, package, *limit).await,
        Commands::Config { .. } => Ok(()),
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run(Cli::parse()).await {
        // Engine errors carry a message meant for the user
        let message = match e.downcast_ref::<EngineError>() {
            Some(engine_error) => engine_error.user_message(),
            None => format!("{:#}", e),
        };
        output::print_error(&message);
        std::process::exit(1);
    }
}
