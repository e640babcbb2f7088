//! CLI entry point for the weather cross-check harness.
//!
//! Provides subcommands for auditing temperature discrepancies between the
//! weather API and the mobile app, and for reporting the city with the
//! highest average temperature.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use weather_crosscheck::{
    api::OpenWeatherClient,
    audit,
    config::Settings,
    mobile::{MobileApp, MobileUi, UiDriver, WebDriverSession},
    report,
    store::RecordStore,
};

#[derive(Parser)]
#[command(name = "weather_crosscheck")]
#[command(about = "Cross-checks weather readings between the API and the mobile app", long_about = None)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect readings from both sources and report discrepancies
    Audit {
        /// Discrepancy threshold in degrees Celsius
        #[arg(short, long, default_value_t = 1.0)]
        threshold: f64,

        /// Skip the mobile UI pass and collect API readings only
        #[arg(long, default_value_t = false)]
        skip_mobile: bool,

        /// CSV file to append the discrepancy report to
        #[arg(long)]
        csv: Option<String>,
    },
    /// Collect API readings and report the city with the highest average temperature
    Hottest,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/weather_crosscheck.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("weather_crosscheck.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let settings = Settings::load(&cli.config)?;
    let mut store = RecordStore::open(&settings.store.path)?;
    store.reset()?;
    let api = OpenWeatherClient::new(&settings.api)?;

    match cli.command {
        Commands::Audit {
            threshold,
            skip_mobile,
            csv,
        } => {
            if skip_mobile {
                audit::collect_api(&api, &mut store, &settings.cities).await?;
            } else {
                let driver = WebDriverSession::new(&settings.mobile)?;
                let mut app = MobileApp::new(driver);
                prepare_app(&mut app).await?;
                audit::crosscheck(&api, &mut app, &mut store, &settings.cities).await?;
            }

            let records = store.discrepancies(threshold)?;
            let rows = report::discrepancy_rows(&records, &settings.cities);
            report::print_discrepancies(&rows, threshold);
            if let Some(path) = csv {
                report::append_csv(&path, &rows)?;
                info!(path, "discrepancy report appended");
            }
        }
        Commands::Hottest => {
            audit::collect_api(&api, &mut store, &settings.cities).await?;
            report::print_hottest(store.highest_average()?.as_ref(), &settings.cities);
        }
    }

    Ok(())
}

/// Launches the app and switches it to Celsius, tearing the session down if
/// either step fails.
async fn prepare_app<D: UiDriver>(app: &mut MobileApp<D>) -> Result<()> {
    let result = launch_and_configure(app).await;
    if result.is_err() {
        let _ = app.teardown().await;
    }
    result
}

async fn launch_and_configure<D: UiDriver>(app: &mut MobileApp<D>) -> Result<()> {
    app.launch().await?;
    app.configure_celsius().await?;
    Ok(())
}
