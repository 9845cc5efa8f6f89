mod config;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use log::debug;

use rsform_core::differ::{create_destroy_plan, create_plan};
use rsform_core::effect::Effect;
use rsform_core::interpreter::{ApplyResult, EffectOutcome, Interpreter};
use rsform_core::plan::Plan;
use rsform_core::provider::Provider;
use rsform_core::resource::{Resource, ResourceId, State, Value};
use rsform_core::schema::ResourceSchema;
use rsform_provider_rs::RsProvider;
use rsform_state::{BackendConfig, StateBackend, StateFile, create_backend};

use config::{ConfigFile, load_config};

#[derive(Parser)]
#[command(name = "rsform")]
#[command(about = "Manage RightScale deployments from a declarative configuration", long_about = None)]
struct Cli {
    /// Path to the state file
    #[arg(long, global = true, default_value = "rsform.state.json")]
    state: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration file
    Validate {
        /// Path to the JSON configuration
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// Show execution plan without applying changes
    Plan {
        /// Path to the JSON configuration
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// Apply changes to reach the desired state
    Apply {
        /// Path to the JSON configuration
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// Destroy all resources defined in the configuration file
    Destroy {
        /// Path to the JSON configuration
        #[arg(default_value = "main.json")]
        file: PathBuf,

        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Show the resources recorded in the state file
    Show,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { file } => run_validate(&file),
        Commands::Plan { file } => run_plan(&file, &cli.state).await,
        Commands::Apply { file } => run_apply(&file, &cli.state).await,
        Commands::Destroy { file, auto_approve } => {
            run_destroy(&file, &cli.state, auto_approve).await
        }
        Commands::Show => run_show(&cli.state).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn get_schemas() -> HashMap<String, ResourceSchema> {
    let mut all_schemas = HashMap::new();
    for schema in rsform_provider_rs::schemas() {
        all_schemas.insert(schema.resource_type.clone(), schema);
    }
    all_schemas
}

fn load_resources(file: &Path) -> Result<(ConfigFile, Vec<Resource>), String> {
    let config = load_config(file)?;
    let resources = config.resources(&get_schemas())?;
    Ok((config, resources))
}

fn get_provider(config: &ConfigFile) -> Result<RsProvider, String> {
    let provider_config = config.provider_config()?;
    RsProvider::new(&provider_config).map_err(|e| format!("Failed to configure provider: {}", e))
}

fn get_backend(state_path: &Path) -> Result<Box<dyn StateBackend>, String> {
    let config = BackendConfig::local(state_path.to_string_lossy());
    create_backend(&config).map_err(|e| e.to_string())
}

async fn read_state_file(backend: &dyn StateBackend) -> Result<StateFile, String> {
    let state_file = backend
        .read_state()
        .await
        .map_err(|e| format!("Failed to read state: {}", e))?;
    Ok(state_file.unwrap_or_default())
}

/// Refresh every recorded resource, dropping the ones that are gone
async fn refresh_states<P: Provider>(
    interpreter: &Interpreter<P>,
    state_file: &mut StateFile,
) -> Result<HashMap<ResourceId, State>, String> {
    let mut current_states = HashMap::new();
    for stored in state_file.states().into_values() {
        let state = interpreter
            .refresh(&stored)
            .await
            .map_err(|e| format!("Failed to refresh state: {}", e))?;
        if !state.exists {
            debug!("{} is gone, dropping it from state", stored.id);
        }
        state_file.record(&state, interpreter.provider().name());
        current_states.insert(state.id.clone(), state);
    }
    Ok(current_states)
}

fn run_validate(file: &Path) -> Result<(), String> {
    let (config, resources) = load_resources(file)?;
    if let Some(provider) = &config.provider {
        provider
            .validate()
            .map_err(|e| format!("Invalid provider configuration: {}", e))?;
    }

    println!("{}", "Validating...".cyan());
    println!(
        "{}",
        format!("✓ {} resources validated successfully.", resources.len()).green()
    );
    for resource in &resources {
        println!("  • {}", resource.id);
    }
    Ok(())
}

async fn run_plan(file: &Path, state_path: &Path) -> Result<(), String> {
    let (config, resources) = load_resources(file)?;
    let interpreter = Interpreter::new(get_provider(&config)?);
    let backend = get_backend(state_path)?;

    let mut state_file = read_state_file(backend.as_ref()).await?;
    let current_states = refresh_states(&interpreter, &mut state_file).await?;

    let plan = create_plan(&resources, &current_states, &get_schemas());
    print_plan(&plan);
    Ok(())
}

async fn run_apply(file: &Path, state_path: &Path) -> Result<(), String> {
    let (config, resources) = load_resources(file)?;
    let interpreter = Interpreter::new(get_provider(&config)?);
    let backend = get_backend(state_path)?;

    let mut state_file = read_state_file(backend.as_ref()).await?;
    let current_states = refresh_states(&interpreter, &mut state_file).await?;

    let plan = create_plan(&resources, &current_states, &get_schemas());
    if plan.is_empty() {
        println!("{}", "No changes needed.".green());
        return write_state_file(backend.as_ref(), &mut state_file).await;
    }

    print_plan(&plan);
    println!();
    println!("{}", "Applying changes...".cyan().bold());
    println!();

    let result = interpreter.apply(&plan).await;
    print_apply_result(&plan, &result);
    record_apply_result(&mut state_file, &result, interpreter.provider().name());
    write_state_file(backend.as_ref(), &mut state_file).await?;

    finish(&result, "Apply")
}

async fn run_destroy(file: &Path, state_path: &Path, auto_approve: bool) -> Result<(), String> {
    let (config, resources) = load_resources(file)?;
    if resources.is_empty() {
        println!("{}", "No resources defined in configuration.".yellow());
        return Ok(());
    }

    let interpreter = Interpreter::new(get_provider(&config)?);
    let backend = get_backend(state_path)?;

    let mut state_file = read_state_file(backend.as_ref()).await?;
    let mut current_states = refresh_states(&interpreter, &mut state_file).await?;
    current_states.retain(|id, _| resources.iter().any(|r| &r.id == id));

    let plan = create_destroy_plan(&current_states);
    if plan.is_empty() {
        println!("{}", "No resources to destroy.".green());
        return write_state_file(backend.as_ref(), &mut state_file).await;
    }

    print_plan(&plan);
    println!();

    if !auto_approve && !confirm_destroy()? {
        println!();
        println!("{}", "Destroy cancelled.".yellow());
        return Ok(());
    }

    println!("{}", "Destroying resources...".red().bold());
    println!();

    let result = interpreter.apply(&plan).await;
    print_apply_result(&plan, &result);
    record_apply_result(&mut state_file, &result, interpreter.provider().name());
    write_state_file(backend.as_ref(), &mut state_file).await?;

    finish(&result, "Destroy")
}

async fn run_show(state_path: &Path) -> Result<(), String> {
    let backend = get_backend(state_path)?;
    let Some(state_file) = backend
        .read_state()
        .await
        .map_err(|e| format!("Failed to read state: {}", e))?
    else {
        println!("{}", "No state recorded.".yellow());
        return Ok(());
    };

    println!(
        "{} serial {}, lineage {}",
        "State:".cyan().bold(),
        state_file.serial,
        state_file.lineage
    );
    println!();
    for resource in &state_file.resources {
        println!(
            "{}.{} {}",
            resource.resource_type.bold(),
            resource.name.bold(),
            format!("({})", resource.identifier).dimmed()
        );
        let mut keys: Vec<&String> = resource.attributes.keys().collect();
        keys.sort();
        for key in keys {
            println!("    {}: {}", key, format_value(&resource.attributes[key]));
        }
    }
    Ok(())
}

fn confirm_destroy() -> Result<bool, String> {
    println!(
        "{}",
        "Do you really want to destroy these resources?"
            .yellow()
            .bold()
    );
    println!(
        "  {}",
        "This action cannot be undone. Type 'yes' to confirm.".yellow()
    );
    print!("\n  Enter a value: ");
    std::io::Write::flush(&mut std::io::stdout()).map_err(|e| e.to_string())?;

    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .map_err(|e| e.to_string())?;
    println!();
    Ok(input.trim() == "yes")
}

/// Persist every state the interpreter reported, including the partial
/// state of failed effects
fn record_apply_result(state_file: &mut StateFile, result: &ApplyResult, provider: &str) {
    for outcome in &result.outcomes {
        match outcome {
            Ok(EffectOutcome::Created { state })
            | Ok(EffectOutcome::Updated { state })
            | Ok(EffectOutcome::Replaced { state }) => state_file.record(state, provider),
            Ok(EffectOutcome::Deleted { id }) => {
                state_file.remove_resource(&id.resource_type, &id.name);
            }
            Ok(EffectOutcome::Skipped { .. }) => {}
            Err(failure) => {
                if let Some(state) = &failure.state {
                    state_file.record(state, provider);
                }
            }
        }
    }
}

async fn write_state_file(
    backend: &dyn StateBackend,
    state_file: &mut StateFile,
) -> Result<(), String> {
    state_file.increment_serial();
    backend
        .write_state(state_file)
        .await
        .map_err(|e| format!("Failed to write state: {}", e))
}

fn finish(result: &ApplyResult, action: &str) -> Result<(), String> {
    println!();
    if result.is_success() {
        println!(
            "{}",
            format!("{} complete! {} changes applied.", action, result.success_count)
                .green()
                .bold()
        );
        Ok(())
    } else {
        Err(format!(
            "{} failed. {} succeeded, {} failed.",
            action, result.success_count, result.failure_count
        ))
    }
}

fn print_plan(plan: &Plan) {
    if plan.is_empty() {
        println!("{}", "No changes. Infrastructure is up-to-date.".green());
        return;
    }

    println!("{}", "Execution Plan:".cyan().bold());
    println!();

    for effect in plan.effects() {
        match effect {
            Effect::Create(r) => {
                println!("  {} {}", "+".green().bold(), r.id.to_string().cyan().bold());
                let mut keys: Vec<&String> = r.attributes.keys().collect();
                keys.sort();
                for key in keys {
                    println!(
                        "      {}: {}",
                        key,
                        format_value(&r.attributes[key]).green()
                    );
                }
            }
            Effect::Update {
                id,
                from,
                to,
                changed_attributes,
            } => {
                println!("  {} {}", "~".yellow().bold(), id.to_string().cyan().bold());
                for key in changed_attributes {
                    println!(
                        "      {}: {} → {}",
                        key,
                        format_optional(from.attributes.get(key)).red(),
                        format_optional(to.attributes.get(key)).green()
                    );
                }
            }
            Effect::Replace {
                id,
                from,
                to,
                forced_by,
            } => {
                println!(
                    "  {} {} {}",
                    "-/+".magenta().bold(),
                    id.to_string().cyan().bold(),
                    format!("(forced by {})", forced_by.join(", ")).dimmed()
                );
                for key in forced_by {
                    println!(
                        "      {}: {} → {}",
                        key,
                        format_optional(from.attributes.get(key)).red(),
                        format_optional(to.attributes.get(key)).green()
                    );
                }
            }
            Effect::Delete(state) => {
                println!("  {} {}", "-".red().bold(), state.id.to_string().cyan().bold());
            }
        }
    }

    println!();
    println!("{}", plan.summary());
}

fn print_apply_result(plan: &Plan, result: &ApplyResult) {
    for (effect, outcome) in plan.effects().iter().zip(&result.outcomes) {
        match outcome {
            Ok(EffectOutcome::Skipped { reason }) => {
                println!("  {} {} - {}", "•".dimmed(), format_effect(effect), reason)
            }
            Ok(_) => println!("  {} {}", "✓".green(), format_effect(effect)),
            Err(failure) => println!(
                "  {} {} - {}",
                "✗".red(),
                format_effect(effect),
                failure.error
            ),
        }
    }
}

fn format_effect(effect: &Effect) -> String {
    match effect {
        Effect::Create(r) => format!("Create {}", r.id),
        Effect::Update { id, .. } => format!("Update {}", id),
        Effect::Replace { id, .. } => format!("Replace {}", id),
        Effect::Delete(state) => format!("Delete {}", state.id),
    }
}

fn format_optional(value: Option<&Value>) -> String {
    value.map(format_value).unwrap_or_else(|| "(none)".to_string())
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Int(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::List(items) => {
            let strs: Vec<_> = items.iter().map(format_value).collect();
            format!("[{}]", strs.join(", "))
        }
        Value::Map(map) => {
            let strs: Vec<_> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", k, format_value(v)))
                .collect();
            format!("{{{}}}", strs.join(", "))
        }
    }
}
