//! Command-line entry point of the package tracker's mail processing.
//!
//! `run` serves the mail queue until it is told to stop. The other commands
//! push a single message, read from a file or stdin, through one part of
//! the pipeline and report what became of it.

use std::{
    io::Read,
    path::{Path, PathBuf},
};

use clap::{Parser, Subcommand};
use tracker::Tracker;
use tracker_common::{Email, logging};
use tracker_control::ControlHandler;
use tracker_queue::Maildir;

#[derive(Parser, Debug)]
#[command(name = "tracker")]
#[command(about = "Process package tracker mail", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file, instead of searching the usual locations
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the mail queue until SIGINT or SIGTERM
    Run,
    /// Route one message as if it had been taken from the queue
    Process {
        /// Message file; stdin when absent
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Deliver one message into the queue's maildir
    Enqueue {
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Forward one message to the subscribers of a package
    Dispatch {
        #[arg(short, long)]
        package: Option<String>,
        #[arg(short, long)]
        keyword: Option<String>,
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Run the commands in one control message and reply to its sender
    Control {
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = find_config_file(cli.config)?;
    let tracker = Tracker::load(&config_path)?;

    if !matches!(cli.command, Commands::Run) {
        logging::init_with_default(logging::LevelFilter::WARN);
    }

    match cli.command {
        Commands::Run => tracker.run().await,
        Commands::Process { file } => {
            let outcome = tracker.processor()?.process(read_message(file.as_deref())?)?;
            println!("{outcome:?}");
            Ok(())
        }
        Commands::Enqueue { file } => {
            let maildir = Maildir::new(&tracker.queue.maildir);
            maildir.init()?;
            let path = maildir.deliver(&read_message(file.as_deref())?)?;
            println!("{}", path.display());
            Ok(())
        }
        Commands::Dispatch {
            package,
            keyword,
            file,
        } => {
            let email = Email::parse(read_message(file.as_deref())?)?;
            let outcome =
                tracker
                    .dispatcher()?
                    .process(&email, package.as_deref(), keyword.as_deref())?;
            println!("{outcome:?}");
            Ok(())
        }
        Commands::Control { file } => {
            let email = Email::parse(read_message(file.as_deref())?)?;
            let outcome = ControlHandler::new(tracker.dispatcher()?).handle(&email)?;
            println!("{outcome:?}");
            Ok(())
        }
    }
}

fn read_message(file: Option<&Path>) -> anyhow::Result<Vec<u8>> {
    let raw = match file {
        Some(path) => std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("Failed to read message from {}: {e}", path.display()))?,
        None => {
            let mut raw = Vec::new();
            std::io::stdin().read_to_end(&mut raw)?;
            raw
        }
    };

    if raw.is_empty() {
        anyhow::bail!("Empty message");
    }
    Ok(raw)
}

/// Find the configuration file using the following precedence:
/// 1. `--config`
/// 2. `TRACKER_CONFIG` environment variable
/// 3. ./tracker.config.ron (current working directory)
/// 4. /etc/tracker/tracker.config.ron (system-wide config)
fn find_config_file(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!("Config file does not exist: {}", path.display());
    }

    if let Ok(env_path) = std::env::var("TRACKER_CONFIG") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "TRACKER_CONFIG points to non-existent file: {}",
            path.display()
        );
    }

    let default_paths = [
        PathBuf::from("./tracker.config.ron"),
        PathBuf::from("/etc/tracker/tracker.config.ron"),
    ];

    for path in &default_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - TRACKER_CONFIG environment variable\n{paths_tried}"
    )
}
