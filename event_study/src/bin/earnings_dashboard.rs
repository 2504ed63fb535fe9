//! earnings_dashboard - terminal front end for the event-study engine

use clap::Parser;
use event_study::demo::SyntheticMarket;
use event_study::report::write_history_csv;
use event_study::{DashboardConfig, DataLoader, EventStudy, Panel};
use std::fs::File;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "earnings_dashboard")]
#[command(about = "Earnings-announcement CAR dashboard")]
struct Cli {
    /// Directory holding the input tables
    #[arg(value_name = "DATA_DIR", default_value = ".")]
    data_dir: PathBuf,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ticker to display (defaults to the first one)
    #[arg(short, long)]
    ticker: Option<String>,

    /// CAR window, e.g. "CAR(-1,+1)"
    #[arg(short, long)]
    window: Option<String>,

    /// Upcoming event label, e.g. "AAPL | 2024-01-25"
    #[arg(short, long)]
    upcoming: Option<String>,

    /// Number of events in the history table
    #[arg(short, long)]
    latest: Option<usize>,

    /// Forecast mode: regression or precomputed
    #[arg(long)]
    forecast_mode: Option<String>,

    /// Ranking mode: ticker, surprise_decile or precomputed
    #[arg(long)]
    ranking_mode: Option<String>,

    /// List the selectable tickers, windows and upcoming events, then exit
    #[arg(long)]
    list: bool,

    /// Write the history table to this CSV file
    #[arg(long, value_name = "FILE")]
    export: Option<PathBuf>,

    /// Print the views as JSON instead of text
    #[arg(long)]
    json: bool,

    /// Use a synthetic market instead of reading DATA_DIR
    #[arg(long)]
    demo: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => DashboardConfig::from_json_file(path)?,
        None => DashboardConfig::default(),
    };
    if let Some(mode) = &cli.forecast_mode {
        config.forecast_mode = mode.parse()?;
    }
    if let Some(mode) = &cli.ranking_mode {
        config.ranking_mode = mode.parse()?;
    }
    if cli.latest.is_some() {
        config.latest_events = cli.latest;
    }

    let tables = if cli.demo {
        SyntheticMarket::default().generate()?
    } else {
        info!(dir = %cli.data_dir.display(), "loading tables");
        DataLoader::load(&config, &cli.data_dir)?
    };
    let study = EventStudy::new(tables, config)?;

    if cli.list {
        println!("Tickers:  {}", study.tickers().join(", "));
        let windows: Vec<&str> = study.windows().iter().map(|w| w.name()).collect();
        println!("Windows:  {}", windows.join(", "));
        println!("Upcoming:");
        for label in study.upcoming_events() {
            println!("  {}", label);
        }
        return Ok(());
    }

    let mut selection = study.default_selection();
    if let Some(ticker) = cli.ticker {
        selection.ticker = ticker;
    }
    if let Some(window) = cli.window {
        selection.window = window;
    }
    if cli.upcoming.is_some() {
        selection.upcoming = cli.upcoming;
    }
    selection.latest_n = cli.latest;

    let views = study.render(&selection);

    if let Some(path) = &cli.export {
        match &views.history {
            Panel::Ready(history) => {
                write_history_csv(history, File::create(path)?)?;
                info!(path = %path.display(), rows = history.rows.len(), "exported history");
            }
            Panel::Empty { message } => eprintln!("Nothing to export: {}", message),
        }
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&views)?);
    } else {
        print!("{}", views);
    }

    Ok(())
}
