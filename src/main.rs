//! Homestead - backend for a personal website

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use homestead::{
    api::{self, AppState},
    config::Config,
    db::{self, repositories::SqlxAirportRepository},
    gate,
    services::{GeocodeService, NominatimGeocoder, SeedData, SeedService},
};

#[derive(Debug, Parser)]
#[command(name = "homestead", version, about = "Personal website backend")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, env = "HOMESTEAD_CONFIG", default_value = "config.yml", value_name = "PATH")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Apply pending database migrations and exit
    Migrate,
    /// Load seed data; existing rows are left alone
    Seed(SeedArgs),
    /// Look up coordinates for airports that have none
    Geocode(GeocodeArgs),
    /// Check a running server against performance thresholds
    Gate(GateArgs),
}

#[derive(Debug, Args)]
struct SeedArgs {
    /// YAML seed file; the built-in data set is used when omitted
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct GeocodeArgs {
    /// Resolve coordinates without writing them
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct GateArgs {
    /// Server to check, overriding `gate.base_url`
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Path to fetch; repeat to check several, replacing `gate.paths`
    #[arg(long = "path", value_name = "PATH")]
    paths: Vec<String>,

    /// Fail instead of skipping when Lighthouse is not installed
    #[arg(long)]
    require_lighthouse: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "homestead=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// `Ok(false)` means the command ran but its checks did not pass
async fn run(cli: Cli) -> Result<bool> {
    let config = Config::load_with_env(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::debug!(path = %cli.config.display(), "Configuration loaded");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await.map(|_| true),
        Command::Migrate => migrate(config).await.map(|_| true),
        Command::Seed(args) => seed(config, args).await.map(|_| true),
        Command::Geocode(args) => geocode(config, args).await,
        Command::Gate(args) => run_gate(config, args).await,
    }
}

async fn open_database(config: &Config) -> Result<db::DynDatabasePool> {
    let pool = db::create_pool(&config.database).await?;
    tracing::info!(driver = config.database.driver.as_str(), "Database connected");

    let applied = db::migrations::run_migrations(&pool).await?;
    if applied > 0 {
        tracing::info!(applied, "Database migrations applied");
    }
    Ok(pool)
}

async fn serve(config: Config) -> Result<()> {
    tracing::info!("Starting Homestead {}", env!("CARGO_PKG_VERSION"));

    let pool = open_database(&config).await?;
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let state = AppState::new(pool.clone(), config);
    let app = api::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down");
    pool.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn migrate(config: Config) -> Result<()> {
    let pool = db::create_pool(&config.database).await?;
    let pending = db::migrations::pending_count(&pool).await?;
    let applied = db::migrations::run_migrations(&pool).await?;
    println!("Applied {} of {} pending migrations", applied, pending);
    pool.close().await;
    Ok(())
}

async fn seed(config: Config, args: SeedArgs) -> Result<()> {
    let data = SeedData::load(args.file.as_deref()).await?;
    let pool = open_database(&config).await?;
    let state = AppState::new(pool.clone(), config);

    let seeder = SeedService::new(
        state.post_service.clone(),
        state.category_service.clone(),
        state.portfolio_service.clone(),
        state.flight_service.clone(),
    );
    let report = seeder.apply(data).await?;

    for (section, count) in report.sections() {
        println!(
            "{:<14} {:>4} inserted {:>4} skipped",
            section, count.inserted, count.skipped
        );
    }
    println!(
        "Seeding complete: {} inserted, {} skipped",
        report.inserted(),
        report.skipped()
    );
    pool.close().await;
    Ok(())
}

async fn geocode(config: Config, args: GeocodeArgs) -> Result<bool> {
    let pool = open_database(&config).await?;
    let geocoder = NominatimGeocoder::new(&config.geocoding)?;
    let geocoding = config.geocoding.clone();
    let state = AppState::new(pool.clone(), config);
    let service = GeocodeService::new(
        SqlxAirportRepository::boxed(pool.clone()),
        state.flight_service.clone(),
        Arc::new(geocoder),
        geocoding,
    );

    let report = service.run(args.dry_run).await?;
    for airport in &report.resolved {
        println!(
            "{:<4} {:>10.5} {:>11.5}",
            airport.iata_code, airport.latitude, airport.longitude
        );
    }
    for airport in &report.failed {
        println!("{:<4} FAILED: {}", airport.iata_code, airport.error);
    }
    println!(
        "{} resolved, {} failed in {} batches{}",
        report.resolved.len(),
        report.failed.len(),
        report.batches,
        if report.dry_run { " (dry run, nothing written)" } else { "" }
    );

    pool.close().await;
    Ok(report.is_success())
}

async fn run_gate(config: Config, args: GateArgs) -> Result<bool> {
    let mut gate_config = config.gate;
    if let Some(base_url) = args.base_url {
        gate_config.base_url = base_url;
    }
    if !args.paths.is_empty() {
        gate_config.paths = args.paths;
    }

    let report = gate::run(&gate_config, args.require_lighthouse).await?;
    println!("{}", report);
    Ok(report.passed())
}
