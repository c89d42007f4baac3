use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use wifi_ledger::{
    aggregation::Aggregator,
    clock::SystemClock,
    cmd::{self, ReportArgs, SettingsCommand, report, settings, status},
    config::AppConfig,
    ledger::SessionLedger,
    observer::SystemObserver,
    persistence::sqlite::SqliteStateRepository,
    settings::SettingsStore,
    supervisor::Supervisor,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding `app.yaml`.
    #[arg(long, global = true)]
    config_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the check daemon until interrupted.
    Run,
    /// Runs a single check and waits for its alert deliveries.
    Check,
    /// Prints today's usage, including the open session.
    Today,
    /// Prints the ledger and settings state.
    Status,
    /// Prints daily, weekly or monthly usage.
    Report(ReportArgs),
    /// Deletes today's totals and the open session.
    ResetToday {
        /// Confirms the reset.
        #[arg(long)]
        yes: bool,
    },
    /// Shows or changes settings.
    #[command(subcommand)]
    Settings(SettingsCommand),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber =
        FmtSubscriber::builder().with_env_filter(EnvFilter::from_default_env()).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();

    tracing::debug!("Loading application configuration...");
    let config = AppConfig::new(cli.config_dir.as_deref())?;
    tracing::debug!(database_url = %config.database_url, interval = ?config.check_interval, "Configuration loaded.");

    let repo = cmd::open_store(&config).await?;

    let result = execute(cli.command, config, Arc::clone(&repo)).await;

    if let Err(e) = repo.flush().await {
        tracing::error!(error = %e, "Failed to flush pending writes.");
    }
    repo.close().await;

    result
}

async fn execute(
    command: Commands,
    config: AppConfig,
    repo: Arc<SqliteStateRepository>,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Run => {
            let supervisor = build_supervisor(config, repo).await?;
            tracing::info!("Supervisor initialized, starting checks...");
            supervisor.run().await?;
        }
        Commands::Check => {
            let shutdown_timeout = config.shutdown_timeout;
            let supervisor = build_supervisor(config, repo).await?;
            let outcome = supervisor.runner().run_once().await.map_err(cmd::Error::from)?;
            supervisor.runner().dispatcher().drain(shutdown_timeout).await;
            println!(
                "associated: {}, just disconnected: {}, alerts: {:?}",
                outcome.transition.associated, outcome.transition.just_disconnected, outcome.alerts
            );
        }
        Commands::Today => print_status(config, repo, true).await?,
        Commands::Status => print_status(config, repo, false).await?,
        Commands::Report(args) => {
            let aggregator = Aggregator::new(repo);
            println!("{}", report::execute(&args, &aggregator).await?);
        }
        Commands::ResetToday { yes } => {
            if !yes {
                return Err(cmd::Error::NotConfirmed("reset today's usage").into());
            }
            create_ledger(repo).reset_today().await?;
            println!("Today's usage and the open session were reset.");
        }
        Commands::Settings(command) => {
            let settings_store = SettingsStore::new(repo);
            settings_store.seed_defaults(&config.defaults).await?;
            println!("{}", settings::execute(&command, &settings_store).await?);
        }
    }
    Ok(())
}

async fn print_status(
    config: AppConfig,
    repo: Arc<SqliteStateRepository>,
    today_only: bool,
) -> Result<(), cmd::Error> {
    let settings_store = SettingsStore::new(Arc::clone(&repo));
    settings_store.seed_defaults(&config.defaults).await?;
    let ledger_status = create_ledger(repo).status().await?;
    let output = if today_only {
        status::render_today(&ledger_status)
    } else {
        status::render_status(&ledger_status, &settings_store.load().await?)
    };
    println!("{output}");
    Ok(())
}

async fn build_supervisor(
    config: AppConfig,
    repo: Arc<SqliteStateRepository>,
) -> Result<Supervisor<SqliteStateRepository>, cmd::Error> {
    Ok(Supervisor::builder()
        .config(config)
        .state(repo)
        .observer(Arc::new(SystemObserver::new()))
        .build()
        .await?)
}

fn create_ledger(repo: Arc<SqliteStateRepository>) -> SessionLedger<SqliteStateRepository> {
    SessionLedger::new(repo, Arc::new(SystemClock), Arc::new(SystemObserver::new()))
}
