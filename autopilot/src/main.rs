use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use autopilot::autopilot::{Autopilot, AutopilotOutcome};
use autopilot::collab::{
    Collaborators, FileContextProvider, ReceiptingIntegrationChecker, ReceiptingOracleReviewer,
    ReceiptingUxSimulator,
};
use autopilot::core::views::render_progress;
use autopilot::exit_codes;
use autopilot::io::config::AutopilotConfig;
use autopilot::io::ledger::{EventLedger, load_view};
use autopilot::io::paths::ProjectLayout;
use autopilot::logging;

#[derive(Parser)]
#[command(
    name = "autopilot",
    version,
    about = "Receipt-gated epic and task autopilot"
)]
struct Cli {
    /// Project root containing `prd.json` and `_ledger/`.
    #[arg(long, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Work the active epic forward under the receipt gates.
    Run,
    /// Replay the event ledger and rewrite `prd.json` and `progress.txt`.
    Views,
    /// Print the progress listing for the materialized view.
    Status,
}

fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();
    match dispatch(&cli) {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(exit_codes::INVALID as u8)
        }
    }
}

fn dispatch(cli: &Cli) -> Result<i32> {
    let layout = ProjectLayout::new(&cli.root);
    match cli.command {
        Command::Run => cmd_run(&layout),
        Command::Views => cmd_views(&layout),
        Command::Status => cmd_status(&layout),
    }
}

fn cmd_run(layout: &ProjectLayout) -> Result<i32> {
    let config = AutopilotConfig::from_env()?;
    let context = FileContextProvider::new(layout.root.clone());
    let collab = Collaborators {
        context: &context,
        integration: &ReceiptingIntegrationChecker,
        ux: &ReceiptingUxSimulator,
        oracle: &ReceiptingOracleReviewer,
        scout: None,
    };
    let pilot = Autopilot {
        layout,
        config: &config,
        collab: &collab,
    };
    match pilot.run()? {
        AutopilotOutcome::InProgress => {
            println!("IN_PROGRESS");
            Ok(exit_codes::OK)
        }
        AutopilotOutcome::Finalized => {
            println!("FINALIZED");
            Ok(exit_codes::OK)
        }
        AutopilotOutcome::Halted(halt) => {
            println!("{halt}");
            Ok(exit_codes::HALTED)
        }
    }
}

fn cmd_views(layout: &ProjectLayout) -> Result<i32> {
    let ledger = EventLedger::new(layout);
    let view = ledger.build_views(layout)?;
    println!(
        "rebuilt {} epics into {}",
        view.epics.len(),
        layout.prd_path.display()
    );
    Ok(exit_codes::OK)
}

fn cmd_status(layout: &ProjectLayout) -> Result<i32> {
    let view = load_view(layout)?
        .with_context(|| format!("no materialized view at {}", layout.prd_path.display()))?;
    print!("{}", render_progress(&view));
    Ok(exit_codes::OK)
}
