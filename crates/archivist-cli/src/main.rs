mod cli;

use std::path::Path;

use clap::Parser;

use archivist_core::commands::{archive, extract};
use archivist_core::config::{ArchiveConfig, RunConfig};
use archivist_core::error::ArchivistError;
use archivist_core::sweep;
use archivist_storage::{RetryConfig, StoreConfig};

use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Err(e) = run(&cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), ArchivistError> {
    match &cli.command {
        Commands::Archive { name, max_size } => {
            let store = archivist_storage::backend_from_config(&store_config(cli)?)?;
            let cfg = ArchiveConfig {
                run: run_config(cli)?,
                name_prefix: name.clone(),
                max_bundle_bytes: *max_size,
            };
            let stats = archive::run(&cfg, store.as_ref())?;
            println!(
                "Archived {} file(s) in {} bundle(s)",
                stats.files_packed, stats.bundles_uploaded
            );
        }
        Commands::Extract => {
            let store = archivist_storage::backend_from_config(&store_config(cli)?)?;
            let stats = extract::run(&run_config(cli)?, store.as_ref())?;
            println!(
                "Restored {} file(s) from {} bundle(s)",
                stats.files_restored, stats.bundles_opened
            );
            if stats.bundles_absent > 0 {
                println!(
                    "{} referenced bundle(s) were not in the store",
                    stats.bundles_absent
                );
            }
        }
        Commands::Sweep {
            config,
            system,
            age,
        } => {
            let max_age = sweep::parse_age(age)?;
            let targets = sweep::load_config(Path::new(config))?;
            let stats = sweep::run(&targets, system, max_age)?;
            println!(
                "Deleted {} of {} matching file(s)",
                stats.deleted, stats.examined
            );
        }
    }
    Ok(())
}

fn run_config(cli: &Cli) -> Result<RunConfig, ArchivistError> {
    RunConfig::new(cli.directory.clone(), cli.state_file.clone())
}

fn store_config(cli: &Cli) -> Result<StoreConfig, ArchivistError> {
    let require = |value: &Option<String>, flag: &str| {
        value
            .clone()
            .ok_or_else(|| ArchivistError::Config(format!("{flag} is required")))
    };
    Ok(StoreConfig {
        bucket: require(&cli.bucket, "--bucket")?,
        region: cli.region.clone(),
        endpoint: require(&cli.endpoint_url, "--endpoint-url")?,
        access_key_id: require(&cli.key_id, "--key-id")?,
        secret_access_key: require(&cli.key_secret, "--key-secret")?,
        root: cli.prefix.clone(),
        allow_insecure_http: cli.allow_insecure_http,
        retry: RetryConfig::default(),
    })
}
