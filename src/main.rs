use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
};

use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use celldb::{
    config, geolocate,
    import::{Filters, ImportMode, Importer},
    Locator, PgStore, RadioType, TowerStore,
};

#[derive(Debug, Parser)]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Answer geolocation requests over HTTP
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Import tower coordinates from an OpenCellID or MLS CSV export
    Import(ImportArgs),
    /// Print the number of towers in the database
    Count,
}

#[derive(Debug, Args)]
struct ImportArgs {
    /// Only import these radio types (comma separated)
    #[arg(long, value_delimiter = ',')]
    radio: Vec<RadioType>,
    /// Only import these mobile country codes (comma separated)
    #[arg(long, value_delimiter = ',')]
    country: Vec<u16>,
    /// Skip towers confirmed by fewer samples
    #[arg(long, default_value_t = 0)]
    min_samples: u32,
    /// Keep existing towers even if the file name does not contain "diff"
    #[arg(long, conflicts_with = "full")]
    incremental: bool,
    /// Replace all existing towers even if the file name contains "diff"
    #[arg(long)]
    full: bool,

    file: PathBuf,
}

impl ImportArgs {
    fn mode(&self) -> ImportMode {
        if self.incremental {
            ImportMode::Incremental
        } else if self.full {
            ImportMode::Full
        } else {
            ImportMode::detect(&self.file)
        }
    }

    fn filters(&self) -> Filters {
        Filters {
            radios: self.radio.iter().copied().collect::<HashSet<_>>(),
            countries: self.country.iter().copied().collect::<HashSet<_>>(),
            min_samples: self.min_samples,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let path = match cli.config.as_deref() {
        Some(x) => x,
        None => Path::new("config.toml"),
    };
    let config = config::load(path)?;

    info!("Connecting to database...");
    let store = PgStore::connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    match cli.command {
        Command::Serve { port } => {
            let locator = web::Data::new(Locator::new(Arc::new(store), config.default_radio));
            let port = port.unwrap_or(config.http_port);
            info!("Listening on port {port}");

            HttpServer::new(move || {
                App::new()
                    .app_data(locator.clone())
                    .app_data(web::JsonConfig::default().limit(1024 * 1024))
                    .service(geolocate::service)
            })
            .bind(("0.0.0.0", port))?
            .run()
            .await?;
        }

        Command::Import(args) => {
            let importer = Importer::new(args.filters(), args.mode())
                .batch_size(config.import.batch_size);
            info!("Import mode {:?}", importer.mode());
            let report = importer
                .run_path(&store, &args.file)
                .await
                .with_context(|| format!("Failed to import {:?}", args.file))?;
            info!(
                "Read {} rows: {} accepted, {} skipped, {} inserted, {} modified",
                report.rows,
                report.accepted,
                report.skipped,
                report.outcome.inserted,
                report.outcome.modified
            );
        }

        Command::Count => println!("{}", store.count().await?),
    };

    Ok(())
}
