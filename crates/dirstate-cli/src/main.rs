//! dirstate CLI
//!
//! Applies declarative LDAP entries and serves the hostgroup inventory in the
//! dynamic inventory format (`inventory --list` / `inventory --host <name>`).

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use dirstate_core::Reconciler;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::Output;
use config::CliConfig;

#[derive(Parser)]
#[command(name = "dirstate-cli")]
#[command(about = "Idempotent LDAP entry reconciliation and hostgroup inventory", long_about = None)]
struct Cli {
    /// Connection profile name or path
    #[arg(short, long, global = true, env = "DIRSTATE_PROFILE")]
    profile: Option<String>,

    /// Settings file (defaults to the daemon's search path)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use an empty in-memory directory
    #[arg(long, global = true)]
    memory: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    json_logs: bool,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Converge the entries in a TOML or JSON file
    Apply {
        file: PathBuf,
        /// Report what would change without writing
        #[arg(long)]
        check: bool,
        /// Re-read entries after writing
        #[arg(long)]
        verify: bool,
        /// Entries reconciled in parallel
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Ensure an entry does not exist
    Remove {
        dn: String,
        /// Report what would change without deleting
        #[arg(long)]
        check: bool,
    },
    /// Show the changes applying a file would make
    Plan { file: PathBuf },
    /// Print the hostgroup inventory
    Inventory {
        /// Print every group and host
        #[arg(long, conflicts_with = "host")]
        list: bool,
        /// Print the variables of one host
        #[arg(long)]
        host: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    let mut settings = CliConfig::load(cli.config.as_deref())?;
    let flag = cli.profile.as_deref();

    let output = match cli.command {
        Commands::Apply {
            file,
            check,
            verify,
            batch_size,
        } => {
            let file = commands::read_entry_file(&file)?;
            let profile =
                commands::resolve_profile(flag, file.profile(), settings.profile.as_deref());
            let directory = commands::open_directory(profile.as_deref(), cli.memory)?;

            settings.reconcile.check_mode |= check;
            settings.reconcile.verify |= verify;
            let batch_size = batch_size.unwrap_or(settings.reconcile.batch_size);
            let reconciler = Reconciler::new(directory.client, settings.reconcile);

            commands::apply(&reconciler, file.into_entries(), batch_size).await?
        }
        Commands::Remove { dn, check } => {
            let profile = commands::resolve_profile(flag, None, settings.profile.as_deref());
            let directory = commands::open_directory(profile.as_deref(), cli.memory)?;
            settings.reconcile.check_mode |= check;
            let reconciler = Reconciler::new(directory.client, settings.reconcile);

            commands::remove(&reconciler, &dn).await?
        }
        Commands::Plan { file } => {
            let file = commands::read_entry_file(&file)?;
            let profile =
                commands::resolve_profile(flag, file.profile(), settings.profile.as_deref());
            let directory = commands::open_directory(profile.as_deref(), cli.memory)?;
            let reconciler = Reconciler::new(directory.client, settings.reconcile);

            commands::plan(&reconciler, &file.into_entries()).await?
        }
        Commands::Inventory { list, host } => {
            let profile = commands::resolve_profile(flag, None, settings.profile.as_deref());
            let directory = commands::open_directory(profile.as_deref(), cli.memory)?;
            let document = commands::inventory(&directory, &settings.inventory).await?;

            match host {
                Some(host) => Output::HostVars(document.host(&host)),
                None if list => Output::Inventory(document),
                None => eyre::bail!("inventory needs --list or --host <name>"),
            }
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);

    let failed = output.failed();
    if failed > 0 {
        eyre::bail!("{failed} entries failed");
    }
    Ok(())
}

/// Logs go to stderr so stdout stays machine-readable
fn init_tracing(verbose: u8, json: bool) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
