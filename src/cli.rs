//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::adapters::csv_bar_adapter::CsvBarAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::paper_broker::PaperBroker;
use crate::domain::config_validation::validate_settings;
use crate::domain::error::EngineError;
use crate::domain::session::{DayStatus, SessionController};
use crate::domain::settings::StrategySettings;

#[derive(Parser, Debug)]
#[command(name = "oprtrader", about = "Session-range breakout/retest engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Drive the engine over historical minute bars against a paper broker
    Replay {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        data: PathBuf,
    },
    /// Validate a configuration and echo the resolved session windows
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Dry run: parse, validate and print the full resolved settings
    Check {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Replay { config, data } => run_replay(&config, &data),
        Command::Validate { config } => run_validate(&config),
        Command::Check { config } => run_check(&config),
    }
}

fn load_settings(config_path: &PathBuf) -> Result<StrategySettings, EngineError> {
    let adapter = FileConfigAdapter::from_file(config_path)?;
    let settings = StrategySettings::from_config(&adapter)?;
    validate_settings(&settings)?;
    Ok(settings)
}

fn day_line(status: &DayStatus) -> String {
    let box_state = if status.box_ready { "ready" } else { "absent" };
    let outcome = if status.filled {
        "filled".to_string()
    } else {
        match (&status.signal_side, status.halted) {
            (Some(side), _) => format!("{side}-no-fill"),
            (None, true) => "halted".to_string(),
            (None, false) => "idle".to_string(),
        }
    };
    format!("{}  box={box_state}  outcome={outcome}", status.date)
}

fn run_replay(config_path: &PathBuf, data_path: &PathBuf) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let settings = match load_settings(config_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    eprintln!("Loading minute bars from {}", data_path.display());
    let history = match CsvBarAdapter::from_file(data_path) {
        Ok(h) => h,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    if history.is_empty() {
        eprintln!("error: no bars in {}", data_path.display());
        return ExitCode::from(3);
    }
    eprintln!("  {} bars loaded", history.len());

    let broker = PaperBroker::new();
    let mut controller = SessionController::new(settings, &history, &broker, None);

    let bars: Vec<_> = history.bars().to_vec();
    let mut last_status: Option<DayStatus> = None;
    for bar in &bars {
        controller.process_bar(bar, true, false);
        let status = controller.day_status();
        if let (Some(prev), Some(current)) = (&last_status, &status) {
            if prev.date != current.date {
                println!("{}", day_line(prev));
            }
        }
        last_status = status;
    }
    controller.shutdown();
    if let Some(status) = &last_status {
        println!("{}", day_line(status));
    }

    eprintln!(
        "\nReplay complete: {} orders placed, {} cancelled, {} flattens",
        broker.orders().len(),
        broker.cancelled_orders(),
        broker.flatten_count(),
    );
    ExitCode::SUCCESS
}

fn run_validate(config_path: &PathBuf) -> ExitCode {
    eprintln!("Validating {}", config_path.display());
    let settings = match load_settings(config_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let session = &settings.session;
    eprintln!("\nResolved session windows ({}):", session.timezone);
    eprintln!("  symbol:      {}", session.symbol);
    eprintln!(
        "  box:         {} - {}",
        session.box_start, session.box_end
    );
    eprintln!(
        "  scan:        {} - {} ({}-minute buckets)",
        session.scan_start, session.scan_end, session.timeframe_minutes
    );
    eprintln!("  cutoff:      {}", session.cutoff);
    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn run_check(config_path: &PathBuf) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let settings = match load_settings(config_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    eprintln!("\nResolved settings:");
    eprintln!("{settings:#?}");
    eprintln!("\nDry run complete: configuration is valid");
    ExitCode::SUCCESS
}
