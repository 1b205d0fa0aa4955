use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rental_booking_api::{
    config, db,
    migrator::Migrator,
    services::staff::{CreateStaffRequest, StaffService},
};
use sea_orm_migration::MigratorTrait;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "migration", about = "Database schema and bootstrap tasks")]
struct Cli {
    /// Overrides the configured database url
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending migrations
    Up {
        #[arg(long)]
        steps: Option<u32>,
    },
    /// Roll back applied migrations
    Down {
        #[arg(long, default_value_t = 1)]
        steps: u32,
    },
    /// Print applied and pending migrations
    Status,
    /// Create a dashboard account
    CreateStaff {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "STAFF_PASSWORD")]
        password: String,
        /// Grants staff management and bypasses permission checks
        #[arg(long)]
        superuser: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut cfg = config::load_config().context("failed to load configuration")?;
    if let Some(url) = cli.database_url {
        cfg.database_url = url;
    }
    config::init_tracing(cfg.log_level(), cfg.log_json);

    let pool = db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to database")?;

    match cli.command {
        Commands::Up { steps } => {
            Migrator::up(&pool, steps).await?;
            info!("Migration completed successfully");
        }
        Commands::Down { steps } => {
            Migrator::down(&pool, Some(steps)).await?;
            info!(steps, "Rolled back migrations");
        }
        Commands::Status => {
            Migrator::status(&pool).await?;
        }
        Commands::CreateStaff {
            username,
            email,
            password,
            superuser,
        } => {
            let staff = StaffService::new(Arc::new(pool));
            let user = staff
                .create(CreateStaffRequest {
                    username,
                    email,
                    password,
                    is_staff: true,
                    is_superuser: superuser,
                })
                .await
                .context("failed to create staff user")?;
            info!(user_id = user.id, username = %user.username, superuser, "staff user created");
        }
    }

    Ok(())
}
