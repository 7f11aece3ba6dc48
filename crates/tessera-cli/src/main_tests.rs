//! CLI tests

use clap::Parser;

use crate::{Cli, Commands, ConfigAction, OutputFormat, parse_library};

#[test]
fn test_parse_library() {
    let (name, version) = parse_library("serde=1.0.200").unwrap();
    assert_eq!(name, "serde");
    assert_eq!(version.to_string(), "1.0.200");

    let (name, _) = parse_library(" tokio = 1.43.0 ").unwrap();
    assert_eq!(name, "tokio");

    assert!(parse_library("serde").is_err());
    assert!(parse_library("=1.0.0").is_err());
    assert!(parse_library("serde=latest").is_err());
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from([
        "tessera",
        "resolve",
        "main",
        "--format",
        "json",
        "--lib",
        "serde=1.0.0",
        "--lib",
        "tokio=1.43.0",
    ])
    .unwrap();

    assert_eq!(cli.format, OutputFormat::Json);
    assert_eq!(cli.libraries.len(), 2);
    assert!(matches!(cli.command, Commands::Resolve { ref id } if id == "main"));
}

#[test]
fn test_config_subcommands() {
    let cli = Cli::try_parse_from(["tessera", "config", "init", "--force"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Config {
            action: ConfigAction::Init { force: true }
        }
    ));

    let cli = Cli::try_parse_from(["tessera", "config", "set", "libraries.serde", "1.0.0"]).unwrap();
    assert!(matches!(cli.command, Commands::Config { action: ConfigAction::Set { .. } }));
}

#[test]
fn test_resolve_requires_id() {
    assert!(Cli::try_parse_from(["tessera", "resolve"]).is_err());
    assert!(Cli::try_parse_from(["tessera", "--format", "yaml", "list"]).is_err());
}
