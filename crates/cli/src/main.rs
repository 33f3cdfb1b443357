use crate::{
    error::CliError,
    output::{JobIdView, job_id_table, progress_table, to_json},
};
use clap::Parser;
use commands::Commands;
use engine_core::state::{ProgressStore, SledProgressStore};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod output;

#[derive(Parser)]
#[command(
    name = "pipeline",
    version = "0.1.0",
    about = "Inspect data pipeline jobs"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Progress {
            job,
            item,
            json,
            state,
        } => {
            let path = match state {
                Some(path) => path,
                None => default_state_dir()?,
            };
            show_progress(&path, &job, item, json).await?;
        }
        Commands::InspectJob { job, json } => {
            let view = JobIdView::decode(&job)?;
            if json {
                println!("{}", to_json(&view)?);
            } else {
                print!("{}", job_id_table(&view));
            }
        }
    }

    Ok(())
}

fn default_state_dir() -> Result<PathBuf, CliError> {
    let home = dirs::home_dir()
        .ok_or_else(|| CliError::Unexpected("Could not determine home directory".into()))?;
    Ok(home.join(".pipeline/state"))
}

fn open_progress_store(path: &Path) -> Result<SledProgressStore, CliError> {
    SledProgressStore::open(path).map_err(|source| CliError::StoreOpen {
        path: path.display().to_string(),
        source,
    })
}

async fn show_progress(
    path: &Path,
    job_id: &str,
    item: Option<u32>,
    as_json: bool,
) -> Result<(), CliError> {
    let store = open_progress_store(path)?;
    let items = match item {
        Some(item) => vec![item],
        None => store.list_items(job_id).await?,
    };
    debug!(job_id, items = items.len(), "Loading job item progress");

    let mut found = Vec::with_capacity(items.len());
    for sharding_item in items {
        let progress = store
            .load_progress(job_id, sharding_item)
            .await?
            .ok_or_else(|| CliError::ProgressNotFound {
                job_id: job_id.to_string(),
                sharding_item,
            })?;
        found.push(progress);
    }

    if as_json {
        println!("{}", to_json(&found)?);
    } else {
        for progress in &found {
            println!("{}", progress_table(progress));
        }
    }

    Ok(())
}
