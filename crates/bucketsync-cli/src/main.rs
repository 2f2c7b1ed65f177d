//! bucketsync - mirror a local directory and an S3-compatible bucket prefix
//!
//! Only objects whose size or ETag differ are transferred, and objects with
//! no counterpart at the source are removed from the destination.

mod display;
mod json_output;
mod progress;

use anyhow::{Context, Result};
use bucketsync_config::{Config, ConfigLoader};
use bucketsync_s3::S3Store;
use bucketsync_sync::{keys, SyncEngine, SyncOptions, SyncRequest};
use bucketsync_types::{Concurrency, Error, SyncDirection};
use clap::{Args, Parser, Subcommand};
use console::style;
use json_output::{OperationMetadata, SyncResultJson};
use progress::SyncProgressBar;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

/// Exit status when some objects failed to transfer
const EXIT_INCOMPLETE: u8 = 2;

/// bucketsync - differential sync between a local directory and an S3 bucket
#[derive(Parser)]
#[command(
    name = "bucketsync",
    version = env!("CARGO_PKG_VERSION"),
    about = "Differential sync between a local directory and an S3-compatible bucket",
    long_about = "bucketsync mirrors a local directory into a bucket prefix, or a bucket prefix\n\
                  into a local directory. Objects are compared by size and ETag, so unchanged\n\
                  files are never transferred again."
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Verbose mode - detailed output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "BUCKETSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Print the sync result as JSON instead of a summary
    #[arg(long, global = true)]
    json: bool,

    /// Disable the progress bar
    #[arg(long, global = true)]
    no_progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mirror a local directory into the bucket
    Upload {
        /// Local directory
        local: PathBuf,
        /// Remote path, relative to the configured prefix
        remote: Option<String>,
        #[command(flatten)]
        sync: SyncArgs,
    },
    /// Mirror a bucket prefix into a local directory
    Download {
        /// Remote path, relative to the configured prefix ("/" for the prefix itself)
        remote: String,
        /// Local directory
        local: PathBuf,
        #[command(flatten)]
        sync: SyncArgs,
    },
    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
        /// Write the default configuration to a file
        #[arg(long, value_name = "PATH")]
        init: Option<PathBuf>,
    },
}

#[derive(Args)]
struct SyncArgs {
    /// Dry run - show what would be done
    #[arg(long)]
    dry_run: bool,
    /// Keep destination objects that don't exist at the source
    #[arg(long)]
    no_delete: bool,
    /// Bucket name (overrides storage.bucket)
    #[arg(long)]
    bucket: Option<String>,
    /// Key prefix (overrides storage.prefix)
    #[arg(long)]
    prefix: Option<String>,
    /// Number of objects transferred at the same time
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,
    /// Only sync objects directly under the prefix
    #[arg(long)]
    delimiter: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {:#}", style("Error:").red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&cli, &config) {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        return ExitCode::FAILURE;
    }

    info!("bucketsync v{} starting", env!("CARGO_PKG_VERSION"));

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let incomplete = matches!(
                e.downcast_ref::<Error>(),
                Some(Error::BatchIncomplete { .. })
            );
            eprintln!("{} {:#}", style("Error:").red().bold(), e);
            if incomplete {
                ExitCode::from(EXIT_INCOMPLETE)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => ConfigLoader::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ConfigLoader::load_default().context("Failed to load configuration")?,
    };
    Ok(config)
}

fn init_logging(cli: &Cli, config: &Config) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else if cli.quiet {
        "error"
    } else {
        config.logging.level.as_str()
    };

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr);

    if cli.json_logs || config.logging.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    }
    .map_err(|e| anyhow::anyhow!(e))
}

async fn run(cli: Cli, mut config: Config) -> Result<()> {
    let output = OutputMode {
        quiet: cli.quiet,
        json: cli.json,
        progress: !cli.no_progress,
    };

    match cli.command {
        Commands::Upload {
            local,
            remote,
            sync,
        } => {
            sync.apply(&mut config)?;
            sync_command(SyncDirection::Upload, &config, local, remote, output).await
        }
        Commands::Download {
            remote,
            local,
            sync,
        } => {
            sync.apply(&mut config)?;
            sync_command(SyncDirection::Download, &config, local, Some(remote), output).await
        }
        Commands::Config { default, init } => config_command(&config, default, init),
    }
}

impl SyncArgs {
    /// Fold command-line overrides into the loaded configuration
    fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(bucket) = &self.bucket {
            config.storage.bucket = Some(bucket.clone());
        }
        if let Some(prefix) = &self.prefix {
            config.storage.prefix = prefix.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.sync.concurrency = Concurrency::new(concurrency).map_err(anyhow::Error::msg)?;
        }
        config.sync.dry_run |= self.dry_run;
        config.sync.delimiter |= self.delimiter;
        if self.no_delete {
            config.sync.delete_extra = false;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct OutputMode {
    quiet: bool,
    json: bool,
    progress: bool,
}

async fn sync_command(
    direction: SyncDirection,
    config: &Config,
    local: PathBuf,
    remote: Option<String>,
    output: OutputMode,
) -> Result<()> {
    let prefix = join_prefix(&config.storage.prefix, remote.as_deref());
    let store = S3Store::connect(&config.storage, config.sync.chunk_size)
        .await
        .context("Failed to connect to object store")?;
    let bucket = config.storage.require_bucket()?.to_string();
    let remote_label = format!("s3://{}/{}", bucket, prefix);
    let local_label = local.display().to_string();

    let mut engine = SyncEngine::new(Arc::new(store));
    let cancel = engine.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling sync");
            cancel.cancel();
        }
    });

    let show_progress = output.progress
        && !output.quiet
        && !output.json
        && !config.progress.disable_progress_bar;
    let progress_task = match engine.take_event_receiver() {
        Some(events) if show_progress => Some(tokio::spawn(SyncProgressBar::new().run(events))),
        _ => None,
    };

    if !output.quiet && !output.json {
        display::display_header(direction, &local_label, &remote_label, config.sync.dry_run);
    }

    let request = match direction {
        SyncDirection::Upload => SyncRequest::upload(&local, prefix.as_str()),
        SyncDirection::Download => SyncRequest::download(prefix.as_str(), &local),
    }
    .with_options(SyncOptions::from_config(config));
    let result = engine.sync(request).await;

    // closes the event channel so the progress task can finish
    drop(engine);
    if let Some(task) = progress_task {
        let _ = task.await;
    }

    let metadata = || {
        OperationMetadata::new(direction, &bucket, &prefix, &local_label, config.sync.dry_run)
    };

    match result {
        Ok(report) => {
            if output.json {
                println!("{}", SyncResultJson::success(metadata(), &report).to_json()?);
            } else if !output.quiet {
                display::display_sync_report(&report);
            }
            info!("Sync completed successfully");
            Ok(())
        }
        Err(e) => {
            match &e {
                Error::BatchIncomplete { failures } if output.json => {
                    println!("{}", SyncResultJson::incomplete(metadata(), failures).to_json()?);
                }
                Error::BatchIncomplete { failures } => display::display_failures(failures),
                _ if output.json => {
                    println!("{}", SyncResultJson::error(metadata(), e.to_string()).to_json()?);
                }
                _ => {}
            }
            Err(e.into())
        }
    }
}

fn config_command(config: &Config, default: bool, init: Option<PathBuf>) -> Result<()> {
    if let Some(path) = init {
        ConfigLoader::generate_default_config(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!(
            "{} Wrote default configuration to {}",
            style("✓").green(),
            style(path.display()).cyan()
        );
        return Ok(());
    }

    let rendered = if default {
        println!("{} Default configuration:", style("⚙").blue().bold());
        ConfigLoader::render(&Config::default(), Path::new("bucketsync.yaml"))?
    } else {
        println!("{} Current configuration:", style("⚙").blue().bold());
        match ConfigLoader::config_exists() {
            Some(path) => println!("# loaded from {}", path.display()),
            None => println!("# no configuration file found, showing defaults"),
        }
        let mut shown = config.clone();
        if shown.storage.secret_key.is_some() {
            shown.storage.secret_key = Some("********".to_string());
        }
        ConfigLoader::render(&shown, Path::new("bucketsync.yaml"))?
    };

    println!("{}", rendered);
    Ok(())
}

/// Join the configured prefix with a remote path given on the command line
fn join_prefix(base: &str, remote: Option<&str>) -> String {
    let base = keys::normalize_prefix(base);
    let remote = remote.map(keys::normalize_prefix).unwrap_or_default();
    match (base.is_empty(), remote.is_empty()) {
        (_, true) => base,
        (true, false) => remote,
        (false, false) => format!("{}/{}", base, remote),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rstest::rstest;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[rstest]
    #[case("", None, "")]
    #[case("site", None, "site")]
    #[case("", Some("/assets/"), "assets")]
    #[case("/site/", Some("assets"), "site/assets")]
    fn test_join_prefix(#[case] base: &str, #[case] remote: Option<&str>, #[case] expected: &str) {
        assert_eq!(join_prefix(base, remote), expected);
    }

    #[test]
    fn test_sync_args_override_config() {
        let cli = Cli::parse_from([
            "bucketsync",
            "upload",
            "./public",
            "www",
            "--dry-run",
            "--no-delete",
            "--bucket",
            "assets",
            "-j",
            "4",
        ]);
        let Commands::Upload { sync, remote, .. } = cli.command else {
            panic!("expected upload");
        };

        let mut config = Config::default();
        sync.apply(&mut config).unwrap();

        assert_eq!(remote.as_deref(), Some("www"));
        assert_eq!(config.storage.bucket.as_deref(), Some("assets"));
        assert!(config.sync.dry_run);
        assert!(!config.sync.delete_extra);
        assert_eq!(config.sync.concurrency.get(), 4);
    }

    #[test]
    fn test_invalid_concurrency_is_rejected() {
        let cli = Cli::parse_from(["bucketsync", "download", "backup", "./restore", "-j", "0"]);
        let Commands::Download { sync, .. } = cli.command else {
            panic!("expected download");
        };

        assert!(sync.apply(&mut Config::default()).is_err());
    }

    #[rstest]
    #[case(&["bucketsync", "download", "backup", "./restore"], "backup")]
    #[case(&["bucketsync", "download", "/", "./restore", "--dry-run"], "")]
    fn test_download_takes_remote_then_local(#[case] args: &[&str], #[case] prefix: &str) {
        let cli = Cli::try_parse_from(args).unwrap();
        let Commands::Download { remote, local, .. } = cli.command else {
            panic!("expected download");
        };

        assert_eq!(local, PathBuf::from("./restore"));
        assert_eq!(join_prefix("", Some(&remote)), prefix);
    }

    #[test]
    fn test_download_requires_local_directory() {
        assert!(Cli::try_parse_from(["bucketsync", "download", "./restore"]).is_err());
    }

    #[test]
    fn test_upload_remote_is_optional() {
        let cli = Cli::try_parse_from(["bucketsync", "upload", "./public"]).unwrap();
        let Commands::Upload { remote, .. } = cli.command else {
            panic!("expected upload");
        };

        assert_eq!(remote, None);
    }
}
