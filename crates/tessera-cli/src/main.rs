//! Tessera CLI - inspect plugin directories and dependency health

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tessera_plugins::config::Config;
use tessera_plugins::graph::{LoadPlan, load_order};
use tessera_plugins::manifest;
use tessera_plugins::prelude::*;
use tessera_plugins::resolver::VersionMismatch;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "tessera")]
#[command(author, version, about = "Plugin dependency inspector", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Plugin manifest directory (overrides config and TESSERA_PLUGIN_DIR)
    #[arg(long, global = true, value_name = "DIR")]
    plugin_dir: Option<PathBuf>,

    /// Installed library version, e.g. --lib serde=1.0.200 (repeatable)
    #[arg(long = "lib", global = true, value_name = "NAME=VERSION", value_parser = parse_library)]
    libraries: Vec<(String, Version)>,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, Debug, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List discovered plugins
    List,

    /// Resolve one plugin's dependencies
    Resolve {
        /// Plugin ID
        id: String,
    },

    /// Resolve every enabled plugin
    Check,

    /// Show the order plugins can be loaded in
    Order,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show config file path
    Path,
    /// Show the effective configuration
    Show,
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn parse_library(raw: &str) -> Result<(String, Version), String> {
    let (name, version) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VERSION, got '{}'", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("library name cannot be empty".to_string());
    }
    let version = Version::parse(version.trim()).map_err(|e| e.to_string())?;
    Ok((name.to_string(), version))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tessera=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Config { action } => cmd_config(action),
        Commands::List => {
            let env = PluginEnv::open(&cli).await?;
            cmd_list(&env, cli.format).await
        }
        Commands::Resolve { id } => {
            let env = PluginEnv::open(&cli).await?;
            cmd_resolve(&env, id, cli.format).await
        }
        Commands::Check => {
            let env = PluginEnv::open(&cli).await?;
            cmd_check(&env, cli.format).await
        }
        Commands::Order => {
            let env = PluginEnv::open(&cli).await?;
            cmd_order(&env, cli.format).await
        }
    }
}

/// Registry and resolver built from the plugin directory and configuration
struct PluginEnv {
    resolver: DependencyResolver,
}

impl PluginEnv {
    async fn open(cli: &Cli) -> anyhow::Result<Self> {
        let config = Config::load()?;
        let dir = match &cli.plugin_dir {
            Some(dir) => dir.clone(),
            None => config.plugin_dir()?,
        };

        let descriptors = manifest::discover(&dir, config.plugins.max_manifest_bytes)
            .with_context(|| format!("Failed to read plugin directory: {}", dir.display()))?;
        info!(dir = %dir.display(), plugins = descriptors.len(), "Discovered plugins");

        let mut libraries = config.library_versions()?;
        for (name, version) in &cli.libraries {
            debug!(library = %name, version = %version, "Library version from command line");
            libraries.insert(name.clone(), version.clone());
        }

        let registry = PluginRegistry::from_descriptors(descriptors);
        Ok(Self {
            resolver: DependencyResolver::new(registry, Arc::new(libraries)),
        })
    }

    fn registry(&self) -> &PluginRegistry {
        self.resolver.registry()
    }
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ============================================================================
// Command Implementations
// ============================================================================

#[derive(Serialize)]
struct PluginSummary<'a> {
    id: &'a str,
    name: &'a str,
    version: String,
    enabled: bool,
    required: usize,
    optional: usize,
}

async fn cmd_list(env: &PluginEnv, format: OutputFormat) -> anyhow::Result<()> {
    let descriptors = env.registry().descriptors().await;
    let summaries: Vec<_> = descriptors
        .iter()
        .map(|d| PluginSummary {
            id: &d.id,
            name: d.display_name(),
            version: d.version.to_string(),
            enabled: d.enabled,
            required: d.dependencies.required_count(),
            optional: d.dependencies.optional.plugins.len()
                + d.dependencies.optional.libraries.len(),
        })
        .collect();

    if format == OutputFormat::Json {
        return print_json(&summaries);
    }

    if summaries.is_empty() {
        println!("No plugins found.");
        return Ok(());
    }
    for s in &summaries {
        let state = if s.enabled { "" } else { " [disabled]" };
        println!(
            "{} v{}{} ({} required, {} optional)",
            s.id, s.version, state, s.required, s.optional
        );
    }
    Ok(())
}

async fn cmd_resolve(env: &PluginEnv, id: &str, format: OutputFormat) -> anyhow::Result<()> {
    let result = env.resolver.resolve(id).await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Text => print_resolution(&result),
    }

    if !result.satisfied {
        bail!("Plugin '{}' has unsatisfied dependencies", id);
    }
    Ok(())
}

fn print_resolution(result: &ResolutionResult) {
    let status = if result.satisfied {
        "satisfied"
    } else {
        "unsatisfied"
    };
    println!("Plugin '{}' v{}: {}", result.plugin_id, result.version, status);

    print_names("missing plugins", result.missing_plugins.iter());
    print_names("missing libraries", result.missing_libraries.iter());
    print_mismatches("incompatible plugins", &result.incompatible_plugins);
    print_mismatches("incompatible libraries", &result.incompatible_libraries);
    for (name, reason) in &result.invalid_specs {
        println!("  invalid spec for {}: {}", name, reason);
    }

    let optional = &result.optional;
    if !optional.is_clean() {
        println!("  optional:");
        print_names("  missing plugins", optional.missing_plugins.iter());
        print_names("  missing libraries", optional.missing_libraries.iter());
        print_mismatches("  incompatible plugins", &optional.incompatible_plugins);
        print_mismatches("  incompatible libraries", &optional.incompatible_libraries);
        for (name, reason) in &optional.invalid_specs {
            println!("    invalid spec for {}: {}", name, reason);
        }
    }
}

fn print_names<'a>(label: &str, names: impl ExactSizeIterator<Item = &'a String>) {
    if names.len() > 0 {
        let names: Vec<_> = names.map(String::as_str).collect();
        println!("  {}: {}", label, names.join(", "));
    }
}

fn print_mismatches(label: &str, mismatches: &std::collections::BTreeMap<String, VersionMismatch>) {
    for (name, mismatch) in mismatches {
        println!(
            "  {}: {} requires {}, found {}",
            label, name, mismatch.required, mismatch.found
        );
    }
}

async fn cmd_check(env: &PluginEnv, format: OutputFormat) -> anyhow::Result<()> {
    let descriptors = env.registry().descriptors().await;

    let mut results = Vec::new();
    for descriptor in descriptors.iter().filter(|d| d.enabled) {
        results.push(env.resolver.resolve(&descriptor.id).await?);
    }
    let failed = results.iter().filter(|r| !r.satisfied).count();

    match format {
        OutputFormat::Json => print_json(&results)?,
        OutputFormat::Text => {
            for descriptor in descriptors.iter().filter(|d| !d.enabled) {
                println!("[--] {} v{}: disabled", descriptor.id, descriptor.version);
            }
            for result in &results {
                if result.satisfied {
                    println!("[OK] {} v{}", result.plugin_id, result.version);
                } else {
                    println!("[!!] {} v{}", result.plugin_id, result.version);
                    print_names("missing plugins", result.missing_plugins.iter());
                    print_names("missing libraries", result.missing_libraries.iter());
                    print_mismatches("incompatible plugins", &result.incompatible_plugins);
                    print_mismatches("incompatible libraries", &result.incompatible_libraries);
                    for (name, reason) in &result.invalid_specs {
                        println!("  invalid spec for {}: {}", name, reason);
                    }
                }
            }
            println!();
            println!(
                "{} of {} plugins satisfied",
                results.len() - failed,
                results.len()
            );
        }
    }

    if failed > 0 {
        bail!("{} plugin(s) have unsatisfied dependencies", failed);
    }
    Ok(())
}

#[derive(Serialize)]
struct PlanReport<'a> {
    order: &'a [String],
    loadable: Vec<&'a str>,
    unresolved: Vec<&'a str>,
    blocked: &'a std::collections::BTreeMap<String, Vec<String>>,
}

async fn cmd_order(env: &PluginEnv, format: OutputFormat) -> anyhow::Result<()> {
    let plan: LoadPlan = load_order(&env.resolver)
        .await
        .context("Cannot order plugins")?;

    if format == OutputFormat::Json {
        return print_json(&PlanReport {
            order: &plan.order,
            loadable: plan.loadable().collect(),
            unresolved: plan.unresolved.keys().map(String::as_str).collect(),
            blocked: &plan.blocked,
        });
    }

    for (index, id) in plan.order.iter().enumerate() {
        let note = if plan.unresolved.contains_key(id) {
            " (unresolved)".to_string()
        } else if let Some(blockers) = plan.blocked.get(id) {
            format!(" (blocked by {})", blockers.join(", "))
        } else {
            String::new()
        };
        println!("{}. {}{}", index + 1, id, note);
    }
    if plan.order.is_empty() {
        println!("No enabled plugins.");
    }
    Ok(())
}

fn cmd_config(action: &ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
        ConfigAction::Show => {
            let config = Config::load()?;
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            println!("{}", config.get(key)?);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(key, value)?;
            config.save()?;
            println!("Set {} = {}", key, value);
        }
        ConfigAction::List => {
            let config = Config::load()?;
            for (key, value) in config.list()? {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Init { force } => {
            let path = Config::config_path()?;
            if path.exists() && !*force {
                bail!(
                    "Config file already exists: {} (use --force to overwrite)",
                    path.display()
                );
            }
            Config::default().save_to(&path)?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod main_tests;
