use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use complio::codec::KeyCodec;
use complio::config::Config;
use complio::db::{AppState, DbPool, create_pool, init_audit_db, init_db, queries};
use complio::email::EmailService;
use complio::handlers;
use complio::issuance::{IssueLicense, issue_license};
use complio::models::{LicenseStatus, StatsRange, Tier};
use complio::util::expires_after_days;

#[derive(Parser, Debug)]
#[command(name = "complio", version, about = "Complio license validation service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,

    /// Issue a license and print its key and signature
    Issue {
        #[arg(long)]
        email: String,
        /// EARLY_ACCESS, STARTER, PRO or ENTERPRISE
        #[arg(long)]
        tier: Tier,
        #[arg(long)]
        expires_in_days: Option<i64>,
    },

    /// Change a license's status (ACTIVE, SUSPENDED, CANCELLED)
    SetStatus { license_key: String, status: LicenseStatus },

    /// Print a license as JSON
    Show { license_key: String },

    /// Print tier and daily validation statistics as JSON
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("complio=info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let db = create_pool(&config.database_path, config.db_pool_size)
        .context("failed to open license database")?;
    let audit = create_pool(&config.audit_database_path, config.db_pool_size)
        .context("failed to open audit database")?;
    init_db(&*db.get()?).context("failed to initialize license database")?;
    init_audit_db(&*audit.get()?).context("failed to initialize audit database")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, db, audit).await,
        Command::Issue {
            email,
            tier,
            expires_in_days,
        } => {
            let codec = KeyCodec::new(&config.signing_secret()?)?;
            let mut input = IssueLicense::new(email, tier);
            input.expires_at = expires_after_days(expires_in_days, Utc::now().timestamp())?;
            input.metadata = serde_json::json!({ "created_via": "cli" });

            let license = issue_license(&*db.get()?, &codec, &input)?;
            println!("License key: {}", license.license_key);
            println!("Signature:   {}", license.signature);
            Ok(())
        }
        Command::SetStatus {
            license_key,
            status,
        } => {
            let license = queries::set_license_status(&mut *db.get()?, &license_key, status)?;
            println!("{} is now {}", license.license_key, license.status);
            Ok(())
        }
        Command::Show { license_key } => {
            let license = queries::get_license_by_key(&*db.get()?, &license_key)?
                .with_context(|| format!("no license with key {}", license_key))?;
            println!("{}", serde_json::to_string_pretty(&license)?);
            Ok(())
        }
        Command::Stats => print_stats(&db, &audit),
    }
}

async fn serve(config: Config, db: DbPool, audit: DbPool) -> anyhow::Result<()> {
    let codec = KeyCodec::new(&config.signing_secret()?)?;

    if config.admin_api_key.is_none() {
        tracing::warn!("ADMIN_API_KEY not set, admin routes will reject every request");
    }

    let email = EmailService::new(config.resend_api_key.clone(), config.email_from.clone());
    if !email.is_enabled() {
        tracing::warn!("RESEND_API_KEY not set, license emails will not be sent");
    }

    let state = AppState {
        db,
        audit,
        codec: Arc::new(codec),
        admin_api_key: config.admin_api_key.clone(),
        email,
    };

    let app = handlers::app(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("Complio listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn print_stats(db: &DbPool, audit: &DbPool) -> anyhow::Result<()> {
    let tiers = queries::license_stats_by_tier(&*db.get()?)?;
    let daily = queries::daily_validation_stats(&*audit.get()?, &StatsRange::default())?;
    let report = serde_json::json!({ "tiers": tiers, "daily": daily });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
