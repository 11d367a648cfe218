//! Schema migration runner for the scheduler/tags/group-settings tables.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use server_core::config::Config;
use sqlx::PgPool;

#[derive(Parser)]
#[command(name = "migrate_cli")]
#[command(about = "Run or inspect schema migrations")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply all pending migrations.
    Run,
    /// List applied and pending migrations.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let pool = PgPool::connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    match cli.command {
        Commands::Run => {
            sqlx::migrate!("./migrations").run(&pool).await.context("migration run failed")?;
            tracing::info!("migrations applied");
        }
        Commands::Status => {
            let applied = sqlx::query_as::<_, (i64, String)>(
                "SELECT version, description FROM _sqlx_migrations ORDER BY version",
            )
            .fetch_all(&pool)
            .await
            .context("failed to read migration history (has `run` ever been called?)")?;
            for (version, description) in applied {
                println!("{version}\t{description}");
            }
        }
    }

    Ok(())
}
