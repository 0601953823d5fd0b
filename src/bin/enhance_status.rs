//! enhance-status: 配置有效性检查与供应商路由目录查看的命令行工具
//!
//! Usage:
//!   enhance-status check [--config <path>] [--json]   Validate configuration and credentials
//!   enhance-status catalog [--config <path>]          Show eligible providers per tier
//!   enhance-status version                            Show version information

use anyhow::{bail, Context};
use doc_enhance_core::routing::ProviderCatalog;
use doc_enhance_core::types::{ProviderId, UserTier};
use doc_enhance_core::ServiceConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1) else {
        print_usage();
        std::process::exit(1);
    };

    match command.as_str() {
        "check" => cmd_check(&args[2..]),
        "catalog" => cmd_catalog(&args[2..]),
        "version" | "--version" | "-V" => {
            println!("enhance-status {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!(
        r#"enhance-status: 文档增强服务配置检查工具

USAGE:
    enhance-status <COMMAND> [OPTIONS]

COMMANDS:
    check [--config <path>] [--json]   Validate configuration and provider credentials
    catalog [--config <path>]          Show providers eligible for each tier
    version                            Show version information
    help                               Show this help message

ENVIRONMENT:
    DOC_ENHANCE_CONFIG                 Configuration file used when --config is absent
    DOC_ENHANCE_*                      Overrides applied on top of the file
    RUST_LOG                           Log filter (default: warn)"#
    );
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn load_config(args: &[String]) -> anyhow::Result<ServiceConfig> {
    let path = flag_value(args, "--config")
        .or_else(|| std::env::var("DOC_ENHANCE_CONFIG").ok())
        .map(PathBuf::from);
    let config = match path {
        Some(path) => ServiceConfig::from_yaml_file(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ServiceConfig::default(),
    };
    Ok(config.with_env_overrides())
}

fn cmd_check(args: &[String]) -> anyhow::Result<()> {
    let config = load_config(args)?;
    let report = config.validate();

    if args.iter().any(|a| a == "--json") {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Structure: {}", if report.structurally_valid { "ok" } else { "invalid" });
        println!();
        println!("{:<16} {:<8} {:<24} {}", "PROVIDER", "ENABLED", "CREDENTIAL", "PRESENT");
        for (id, status) in &report.providers {
            println!(
                "{:<16} {:<8} {:<24} {}",
                id.as_str(),
                if status.enabled { "yes" } else { "no" },
                status.api_key_env,
                if status.credential_present { "yes" } else { "no" },
            );
        }
        if !report.issues.is_empty() {
            println!();
            println!("Issues:");
            for issue in &report.issues {
                println!("  - {issue}");
            }
        }
    }

    if !report.is_configured() {
        bail!("configuration is not usable");
    }
    Ok(())
}

fn cmd_catalog(args: &[String]) -> anyhow::Result<()> {
    let config = load_config(args)?;
    let catalog = ProviderCatalog::default().with_reliable_default(config.default_provider);
    let enabled = |id: &ProviderId| config.providers.get(id).map_or(true, |s| s.enabled);

    for tier in UserTier::ALL {
        let providers: Vec<String> = catalog
            .tier_providers(tier)
            .iter()
            .filter(|id| enabled(*id))
            .map(|id| format!("{} (${:.5}/1k)", id, catalog.estimate_cost(*id, 1000)))
            .collect();
        println!(
            "{:<8} ceiling ${:.3}  {}",
            tier.as_str(),
            catalog.cost_ceiling(tier),
            if providers.is_empty() { "-".to_string() } else { providers.join(", ") }
        );
    }
    println!();
    println!("Reliable default: {}", catalog.reliable_default());
    Ok(())
}
