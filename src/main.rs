use clap::Parser;
use serde_json::json;
use tracing_subscriber::EnvFilter;

mod app;
mod cli;
mod config;
mod semantic;
mod storage;
mod tasks;
mod web;

use config::Config;
use tasks::{TaskCreate, TaskUpdate};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = cli::Args::parse();

    let config = Config::load();
    let app = app::App::new(config)?;

    match args.command {
        cli::Command::Add {
            title,
            description,
            status,
        } => {
            let task = app.add_task(TaskCreate {
                title,
                description,
                status,
            })?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }

        cli::Command::List => {
            println!("{}", serde_json::to_string_pretty(&app.list_tasks())?);
        }

        cli::Command::Update {
            id,
            title,
            description,
            status,
        } => {
            let task = app.update_task(
                id,
                TaskUpdate {
                    title,
                    description,
                    status,
                },
            )?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }

        cli::Command::Delete { id } => {
            app.delete_task(id)?;
            println!("{}", json!({"message": "Task deleted successfully"}));
        }

        cli::Command::UpsertEmbedding { id, text } => {
            let success = app.upsert_embedding(id, text.as_deref());
            println!("{}", json!({"success": success}));
        }

        cli::Command::Search { query, limit } => {
            let hits = app.search(&query, limit);
            println!("{}", serde_json::to_string_pretty(&hits)?);
        }

        cli::Command::Reconcile => {
            let report = app.reconcile()?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        cli::Command::Daemon => {
            // best effort: stale or missing vectors should not keep the
            // daemon from coming up
            match app.reconcile() {
                Ok(report) => log::info!(
                    "Reconciled embeddings: {} embedded, {} unchanged, {} removed, {} failed",
                    report.embedded,
                    report.unchanged,
                    report.removed,
                    report.failed
                ),
                Err(err) => log::warn!("Embedding reconcile skipped: {err}"),
            }

            web::start_daemon(app);
        }
    }

    Ok(())
}
