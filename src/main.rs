use std::path::PathBuf;

use chrono::{Local, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use leasescan::report::join_task;
use leasescan::{Config, Report, Result, TimestampZone, create_vendor_database};

#[derive(Parser)]
#[command(name = "leasescan")]
#[command(author, version, about = "Report ISC dhcpd leases with hardware vendors", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "leasescan.json")]
    config: PathBuf,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct Overrides {
    /// Lease log to read (overrides DHCP_LEASES_FILE).
    #[arg(long, global = true)]
    leases_file: Option<PathBuf>,

    /// OUI registry text export (overrides OUI_FILE).
    #[arg(long, global = true)]
    oui_file: Option<PathBuf>,

    /// Vendor database location (overrides OUI_DATABASE).
    #[arg(long, global = true)]
    oui_database: Option<PathBuf>,

    #[arg(long, global = true, value_enum)]
    timestamp_zone: Option<TimestampZone>,

    /// Skip malformed lease blocks instead of aborting.
    #[arg(long, global = true)]
    lenient: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse the lease log and print the report (default).
    Report {
        #[arg(long)]
        json: bool,
    },
    /// Build the vendor database from the OUI registry.
    CreateDb,
    ShowConfig,
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        if let Some(path) = self.leases_file {
            config.leases_file = path;
        }
        if let Some(path) = self.oui_file {
            config.oui_file = path;
        }
        if let Some(path) = self.oui_database {
            config.oui_database = path;
        }
        if let Some(zone) = self.timestamp_zone {
            config.timestamp_zone = zone;
        }
        if self.lenient {
            config.strict = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load_or_default(&cli.config)?;
    config.apply_env();
    cli.overrides.apply(&mut config);
    config.validate()?;

    match cli.command.unwrap_or(Commands::Report { json: false }) {
        Commands::Report { json } => {
            let report = Report::generate(&config, Utc::now()).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.render(&Local));
            }
            Ok(())
        }
        Commands::CreateDb => {
            info!("Building vendor database {:?}", config.oui_database);
            let stats =
                join_task(tokio::task::spawn_blocking(move || create_vendor_database(&config)))
                    .await?;
            info!(
                "Vendor database ready: {} entries, {} lines skipped",
                stats.entries,
                stats.skipped()
            );
            Ok(())
        }
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
