//! Command-line access to catalog queries and cross-matching.
//!
//! Subcommands:
//! - `query`: Run a filtered query against one catalog
//! - `crossmatch`: Cross-match a catalog query against the configured target
//! - `build`: Print the query text a filter set produces, without running it
//! - `config`: Print the effective configuration
//!
//! Responses are printed as JSON envelopes. The exit code is non-zero when the
//! request failed.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use catalog_access::config::DurationText;
use catalog_access::service::{parse_catalog_key, CatalogService, CrossMatchResponse, QueryResponse};
use catalog_access::{FilterSet, RequestParams, ServiceConfig};
use clap::{Parser, Subcommand};
use log::info;

#[derive(Parser, Debug)]
#[command(name = "stellaris_query")]
#[command(about = "Query astronomical catalogs and cross-match their results")]
#[command(version)]
struct Args {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// HTTP timeout per request (e.g. "30s")
    #[arg(long, global = true)]
    timeout: Option<DurationText>,

    /// Longest wait for a cross-match job (e.g. "5m")
    #[arg(long, global = true)]
    job_timeout: Option<DurationText>,

    /// Interval between job status polls (e.g. "500ms")
    #[arg(long, global = true)]
    poll_interval: Option<DurationText>,

    /// Cross-match radius in degrees
    #[arg(long, global = true)]
    match_radius: Option<f64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct FilterArgs {
    /// Filter object, e.g. '{"object_types": "Star", "min_parallax": 5}'
    #[arg(short, long, default_value = "{}")]
    params: String,

    /// Maximum number of rows
    #[arg(short, long)]
    limit: Option<u32>,

    /// Chunk size, accepted in place of --limit
    #[arg(long)]
    chunk_size: Option<u32>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a filtered query against one catalog
    Query {
        /// Catalog name (gaia, simbad, sdss, stellaris)
        #[arg(short = 'd', long)]
        catalog: String,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Cross-match rows from a source catalog against the target catalog
    Crossmatch {
        /// Source catalog name
        #[arg(short = 'd', long)]
        source: String,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Print the query text for a catalog without running it
    Build {
        /// Catalog name
        #[arg(short = 'd', long)]
        catalog: String,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Print the effective configuration as JSON
    Config,
}

fn load_config(args: &Args) -> Result<ServiceConfig> {
    let mut config = match &args.config {
        Some(path) => ServiceConfig::load_from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => ServiceConfig::default(),
    };

    if let Some(timeout) = args.timeout {
        config.http_timeout = timeout;
    }
    if let Some(job_timeout) = args.job_timeout {
        config.crossmatch.job_timeout = job_timeout;
    }
    if let Some(poll_interval) = args.poll_interval {
        config.crossmatch.poll_interval = poll_interval;
    }
    if let Some(radius) = args.match_radius {
        config.crossmatch.match_radius_deg = radius;
    }
    config.validate()?;
    Ok(config)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn exit_code(status: u16) -> ExitCode {
    if status == 200 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let config = load_config(&args)?;

    match args.command {
        Command::Query { catalog, filter } => {
            let service = CatalogService::from_config(&config)?;
            info!("Querying {catalog}");
            let (status, response) =
                match service.query_catalog(&catalog, &filter.params, filter.limit, filter.chunk_size) {
                    Ok(outcome) => (200, QueryResponse::success(outcome)),
                    Err(e) => (e.class().status_code(), QueryResponse::failure(&e)),
                };
            print_json(&response)?;
            Ok(exit_code(status))
        }
        Command::Crossmatch { source, filter } => {
            let service = CatalogService::from_config(&config)?;
            info!(
                "Cross-matching {source} against {}",
                service.crossmatch_target()
            );
            let (status, response) =
                match service.cross_match(&source, &filter.params, filter.limit, filter.chunk_size) {
                    Ok(outcome) => (200, CrossMatchResponse::success(outcome)),
                    Err(e) => (e.class().status_code(), CrossMatchResponse::failure(&e)),
                };
            print_json(&response)?;
            Ok(exit_code(status))
        }
        Command::Build { catalog, filter } => {
            let service = CatalogService::from_config(&config)?;
            let key = parse_catalog_key("catalog", Some(&catalog))?;
            let object: serde_json::Map<String, serde_json::Value> =
                serde_json::from_str(&filter.params).context("parsing --params")?;
            let params = RequestParams::new(
                FilterSet::from_json(&object)?,
                filter.limit,
                filter.chunk_size,
            )?;
            println!("{}", service.build_query(key, &params)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Config => {
            print_json(&config)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> Result<ExitCode> {
    env_logger::init();
    let args = Args::parse();
    run(args)
}
