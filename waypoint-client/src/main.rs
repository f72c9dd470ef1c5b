//! Waypoint CLI - resolve services and bootstrap client credentials

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;
use waypoint_client::{
    CallContextBuilder, CallOptions, ConfigResolver, CredentialCache, RetryPolicy,
    ServiceClient, Settings,
};

/// Waypoint - service client bootstrap
#[derive(Parser)]
#[command(name = "waypoint", version, about)]
struct Cli {
    /// Credential cache root (default: system temp dir)
    #[arg(long, global = true)]
    cache_root: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Total attempts per network request (1 = no retry)
    #[arg(long, global = true)]
    retries: Option<u32>,

    /// Settings file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a service descriptor from the registry
    Resolve {
        /// Service key or Id
        name: String,

        #[command(flatten)]
        registry: RegistryArgs,
    },

    /// Resolve, enroll if needed, and build the channel
    Bootstrap {
        /// Service key or Id
        name: String,

        #[command(flatten)]
        registry: RegistryArgs,
    },

    /// Show the metadata a call would carry
    Metadata {
        /// Client domain
        #[arg(long)]
        domain: String,

        /// Explicit token (overrides the cached one)
        #[arg(long)]
        token: Option<String>,

        #[arg(long)]
        application: Option<String>,

        /// RPC method path
        #[arg(long)]
        path: Option<String>,
    },

    /// Show the credential cache layout for a domain
    Paths {
        domain: String,
    },
}

#[derive(clap::Args)]
struct RegistryArgs {
    /// Registry domain
    #[arg(long, default_value = "localhost")]
    domain: String,

    /// Registry configuration port
    #[arg(long, default_value = "10000")]
    config_port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = run(cli).await;

    if let Err(e) = &result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(&cli)?;

    match &cli.command {
        Commands::Resolve { name, registry } => cmd_resolve(&cli, settings, name, registry).await,
        Commands::Bootstrap { name, registry } => {
            cmd_bootstrap(&cli, settings, name, registry).await
        }
        Commands::Metadata {
            domain,
            token,
            application,
            path,
        } => {
            let opts = CallOptions {
                token: token.clone(),
                application: application.clone(),
                domain: None,
                path: path.clone(),
            };
            cmd_metadata(&cli, settings, domain, &opts)
        }
        Commands::Paths { domain } => cmd_paths(&cli, settings, domain),
    }
}

/// Defaults, then settings file and environment, then flags.
fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;

    if let Some(root) = &cli.cache_root {
        settings = settings.with_cache_root(root);
    }
    if let Some(secs) = cli.timeout {
        settings = settings.with_request_timeout(Duration::from_secs(secs));
    }
    if let Some(attempts) = cli.retries {
        let retry = RetryPolicy {
            max_attempts: attempts.max(1),
            ..settings.retry
        };
        settings = settings.with_retry(retry);
    }

    Ok(settings)
}

// ============================================================================
// Commands
// ============================================================================

async fn cmd_resolve(
    cli: &Cli,
    settings: Settings,
    name: &str,
    registry: &RegistryArgs,
) -> Result<()> {
    let http = waypoint_client::http::RegistryHttp::new(&settings)?;
    let descriptor = ConfigResolver::new(http)
        .resolve(&registry.domain, registry.config_port, name)
        .await
        .with_context(|| format!("Failed to resolve {name:?}"))?;

    if cli.json {
        println!("{}", serde_json::to_string(&descriptor)?);
    } else {
        println!("{}", descriptor.address());
        eprintln!(
            "{} ({}) proxy {} tls {}",
            descriptor.name,
            descriptor.id,
            descriptor.proxy_port,
            if descriptor.tls { "on" } else { "off" }
        );
    }

    Ok(())
}

async fn cmd_bootstrap(
    cli: &Cli,
    settings: Settings,
    name: &str,
    registry: &RegistryArgs,
) -> Result<()> {
    let client = ServiceClient::connect(name, &registry.domain, registry.config_port, settings)
        .await
        .with_context(|| format!("Failed to bootstrap {name:?}"))?;

    let performed: Vec<String> = client
        .enrollment()
        .map(|outcome| outcome.performed.iter().map(ToString::to_string).collect())
        .unwrap_or_default();

    if cli.json {
        let config = serde_json::to_value(client.config().as_ref())?;
        let output = json!({
            "config": config,
            "enrolled": client.enrollment().is_some(),
            "steps": performed,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("{}", client.address());
        if let (Some(ca), Some(cert), Some(key)) =
            (client.ca_file(), client.cert_file(), client.key_file())
        {
            eprintln!("ca:   {}", ca.display());
            eprintln!("cert: {}", cert.display());
            eprintln!("key:  {}", key.display());
        }
        match client.enrollment() {
            Some(_) if performed.is_empty() => eprintln!("Credentials reused from cache"),
            Some(_) => eprintln!("Enrolled: {}", performed.join(", ")),
            None => {}
        }
    }

    Ok(())
}

fn cmd_metadata(cli: &Cli, settings: Settings, domain: &str, opts: &CallOptions) -> Result<()> {
    let cache = CredentialCache::new(&settings.cache_root);
    let metadata = CallContextBuilder::new(&cache, domain)
        .build(opts)
        .context("Failed to build call metadata")?;

    let mut pairs: Vec<(String, String)> = Vec::new();
    for entry in metadata.iter() {
        if let tonic::metadata::KeyAndValueRef::Ascii(key, value) = entry {
            let value = value
                .to_str()
                .with_context(|| format!("Metadata value for {} is not printable", key.as_str()))?;
            pairs.push((key.as_str().to_string(), value.to_string()));
        }
    }

    if cli.json {
        let map: serde_json::Map<String, serde_json::Value> = pairs
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect();
        println!("{}", serde_json::to_string(&map)?);
    } else {
        for (key, value) in pairs {
            let shown = if key == "token" { redact(&value) } else { value };
            println!("{key}: {shown}");
        }
    }

    Ok(())
}

fn cmd_paths(cli: &Cli, settings: Settings, domain: &str) -> Result<()> {
    let cache = CredentialCache::new(&settings.cache_root);
    let token = cache.token_path(domain)?;
    let bundle = cache.bundle_paths(domain)?;

    let mut files = vec![("token", token.as_path())];
    files.extend([
        ("ca.crt", bundle.ca_cert.as_path()),
        ("client.key", bundle.key.as_path()),
        ("client.csr", bundle.csr.as_path()),
        ("client.crt", bundle.cert.as_path()),
        ("client.pem", bundle.portable_key.as_path()),
    ]);

    if cli.json {
        let entries: Vec<_> = files
            .iter()
            .map(|(name, path)| {
                json!({
                    "name": name,
                    "path": path.display().to_string(),
                    "exists": path.exists(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string(&entries)?);
    } else {
        for (name, path) in files {
            println!("{:<10}  {:<7}  {}", name, presence(path), path.display());
        }
    }

    Ok(())
}

fn presence(path: &Path) -> &'static str {
    if path.exists() {
        "present"
    } else {
        "missing"
    }
}

fn redact(token: &str) -> String {
    let prefix: String = token.chars().take(4).collect();
    format!("{prefix}...")
}
