use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use durastore::{Destination, Document, RemoteConfig, SaveStatus, StateManager, StoreConfig};
use serde::Deserialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "durastore")]
#[command(about = "Backup, restore and recovery tooling for a durastore data directory")]
struct Cli {
    /// Data directory holding the primary document and local snapshots
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show primary, snapshot and remote status
    Status,
    /// Snapshot the current primary to the chosen destinations
    Backup {
        /// local, remote or both
        #[arg(long, default_value = "local")]
        destination: String,
    },
    /// Promote a snapshot to primary (the current primary is snapshotted first)
    Restore {
        /// Snapshot file or remote object name
        name: String,
        #[arg(long)]
        remote: bool,
    },
    /// List snapshots, newest first
    List {
        #[arg(long)]
        remote: bool,
    },
    /// Delete snapshots beyond the retention limits
    Prune,
    /// Exchange an OAuth2 authorization code for tokens and append them to .env
    Setup {
        #[arg(long)]
        app_key: String,
        #[arg(long)]
        app_secret: String,
        #[arg(long)]
        auth_code: String,
        /// OAuth2 token endpoint of the remote storage service
        #[arg(long)]
        token_url: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Command::Setup {
        app_key,
        app_secret,
        auth_code,
        token_url,
    } = &cli.command
    {
        return setup(app_key, app_secret, auth_code, token_url);
    }

    let mut config = StoreConfig::new(&cli.data_dir);
    if let Some(remote) = RemoteConfig::from_env() {
        config = config.remote(remote);
    }
    let manager = StateManager::new(config).context("failed to initialize state manager")?;

    match cli.command {
        Command::Status => status(&cli.data_dir, &manager),
        Command::Backup { destination } => backup(&manager, &destination),
        Command::Restore { name, remote } => restore(&manager, &name, remote),
        Command::List { remote } => list(&manager, remote),
        Command::Prune => prune(&manager),
        Command::Setup { .. } => unreachable!("handled above"),
    }
}

fn status(data_dir: &std::path::Path, manager: &StateManager) -> Result<()> {
    let primary = manager.primary_path();
    println!("Data directory:  {}", data_dir.display());

    match std::fs::read(primary) {
        Ok(bytes) => match Document::from_slice(&bytes) {
            Ok(doc) => {
                println!("Primary:         {} ({} bytes)", primary.display(), bytes.len());
                for (key, value) in doc.as_map() {
                    let count = match value {
                        serde_json::Value::Array(items) => Some(items.len()),
                        serde_json::Value::Object(fields) => Some(fields.len()),
                        _ => None,
                    };
                    if let Some(count) = count {
                        println!("  {:<14} {} entries", key, count);
                    }
                }
            }
            Err(e) => println!("Primary:         {} (UNREADABLE: {})", primary.display(), e),
        },
        Err(_) => println!("Primary:         {} (missing)", primary.display()),
    }

    let snapshots = manager.local_snapshots()?;
    match snapshots.first() {
        Some(newest) => println!("Local snapshots: {} (newest: {})", snapshots.len(), newest),
        None => println!("Local snapshots: none"),
    }

    if manager.remote_enabled() {
        match manager.remote_snapshots() {
            Ok(objects) => match objects.first() {
                Some(newest) => {
                    println!("Remote:          {} snapshots (newest: {})", objects.len(), newest.name)
                }
                None => println!("Remote:          connected, no snapshots"),
            },
            Err(e) => println!("Remote:          unavailable ({})", e),
        }
    } else {
        println!("Remote:          not configured");
    }
    Ok(())
}

fn backup(manager: &StateManager, destination: &str) -> Result<()> {
    let destination: Destination = destination.parse().map_err(|e: String| anyhow!(e))?;
    let report = manager
        .backup_to(destination)
        .context("backup failed")?;

    if let Some(id) = &report.local_snapshot {
        println!("Local snapshot:  {}", id);
    }
    if let Some(name) = &report.remote_object {
        println!("Remote snapshot: {}", name);
    }
    match &report.status {
        SaveStatus::Full => println!("Backup complete ({})", report.destination),
        SaveStatus::Partial { failed, reason } => {
            println!("Backup partial: {} side failed ({})", failed, reason)
        }
    }
    Ok(())
}

fn restore(manager: &StateManager, name: &str, remote: bool) -> Result<()> {
    let doc = if remote {
        manager
            .restore_remote(name)
            .with_context(|| format!("failed to restore remote snapshot '{}'", name))?
    } else {
        manager
            .restore_local(&durastore::SnapshotId::new(name))
            .with_context(|| format!("failed to restore local snapshot '{}'", name))?
    };
    println!(
        "Restored {} top-level collections to {}",
        doc.len(),
        manager.primary_path().display()
    );
    Ok(())
}

fn list(manager: &StateManager, remote: bool) -> Result<()> {
    if remote {
        for object in manager.remote_snapshots().context("remote listing failed")? {
            println!("{}  {:>10} bytes  {}", object.name, object.size, object.modified);
        }
    } else {
        for id in manager.local_snapshots()? {
            println!("{}", id);
        }
    }
    Ok(())
}

fn prune(manager: &StateManager) -> Result<()> {
    let report = manager.prune().context("pruning failed")?;
    println!(
        "Pruned {} local and {} remote snapshots",
        report.local_removed, report.remote_removed
    );
    Ok(())
}

#[derive(Deserialize)]
struct SetupTokenResponse {
    access_token: String,
    refresh_token: String,
}

/// One-time remote setup: exchanges an authorization code for an access and
/// a refresh token, then appends the REMOTE_* variables to .env. The
/// refresh token does not expire; the access token is renewed automatically
/// from then on.
fn setup(app_key: &str, app_secret: &str, auth_code: &str, token_url: &str) -> Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .context("failed to build HTTP client")?;

    let params = [
        ("grant_type", "authorization_code"),
        ("code", auth_code),
        ("client_id", app_key),
        ("client_secret", app_secret),
    ];
    let response = client
        .post(token_url)
        .form(&params)
        .send()
        .context("token exchange request failed")?;
    let status = response.status();
    if !status.is_success() {
        return Err(anyhow!("token endpoint returned {}", status));
    }
    let tokens: SetupTokenResponse = response
        .json()
        .context("token endpoint returned an unexpected payload")?;

    let mut env_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(".env")
        .context("failed to open .env")?;
    writeln!(env_file, "\n# Remote backup credentials (durastore setup)")?;
    writeln!(env_file, "REMOTE_APP_KEY={}", app_key)?;
    writeln!(env_file, "REMOTE_APP_SECRET={}", app_secret)?;
    writeln!(env_file, "REMOTE_ACCESS_TOKEN={}", tokens.access_token)?;
    writeln!(env_file, "REMOTE_REFRESH_TOKEN={}", tokens.refresh_token)?;

    println!("Credentials written to .env");
    println!("Set REMOTE_BASE_URL and REMOTE_TOKEN_URL to enable remote backups.");
    Ok(())
}
