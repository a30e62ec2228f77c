//! rpl command-line interface
//!
//! Project snapshots and continuous backup from the shell. All state lives
//! under `.rpl/` in the project directory.

use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use rpl::{ChangeWatcher, Rpl, RplError};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "rpl")]
#[command(author, version, about = "Structural snapshots and continuous backup for project trees", long_about = None)]
struct Cli {
    /// Project directory (defaults to the current directory)
    #[arg(short, long, global = true, default_value = ".")]
    path: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize snapshot tracking for a project
    Init,

    /// Capture the current tree under a version label
    Create {
        /// Version label, unique across the project's lifetime
        version: String,
    },

    /// List captured snapshots
    List {
        /// Show per-snapshot file counts and sizes
        #[arg(short, long)]
        detailed: bool,
    },

    /// Restore the tree to a captured version
    Restore {
        /// Version to restore
        version: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Watch the tree and back up every change as it happens
    AutoSave {
        /// Polling interval (e.g. "2s", "500ms")
        #[arg(short, long, default_value = "2s")]
        interval: humantime::Duration,
    },

    /// Stop a running watcher
    Stop,

    /// Show project and watcher status
    Status,
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("rpl=debug")),
            )
            .init();
    }

    if let Err(e) = run(cli) {
        eprintln!("{}: {}", "Error".red().bold(), e.user_message());
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), RplError> {
    match cli.command {
        Commands::Init => cmd_init(&cli.path),
        Commands::Create { version } => cmd_create(&cli.path, &version),
        Commands::List { detailed } => cmd_list(&cli.path, detailed),
        Commands::Restore { version, yes } => cmd_restore(&cli.path, &version, yes),
        Commands::AutoSave { interval } => cmd_auto_save(&cli.path, interval.into()),
        Commands::Stop => cmd_stop(&cli.path),
        Commands::Status => cmd_status(&cli.path),
    }
}

fn cmd_init(path: &PathBuf) -> Result<(), RplError> {
    let rpl = Rpl::init(path)?;
    println!(
        "{} Initialized project at {}",
        "✓".green().bold(),
        rpl.root().display()
    );
    Ok(())
}

fn cmd_create(path: &PathBuf, version: &str) -> Result<(), RplError> {
    let rpl = Rpl::open(path)?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("Creating snapshot {}...", version));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let snapshot = rpl.create(version)?;
    spinner.finish_and_clear();

    println!(
        "{} Snapshot {} created: {} files, {}",
        "✓".green().bold(),
        snapshot.version.cyan(),
        snapshot.manifest.file_count,
        rpl::utils::format_bytes(snapshot.manifest.total_size)
    );
    Ok(())
}

fn cmd_list(path: &PathBuf, detailed: bool) -> Result<(), RplError> {
    let rpl = Rpl::open(path)?;
    let summaries = rpl.list()?;

    if summaries.is_empty() {
        println!("No snapshots yet. Create one with 'rpl create <version>'");
        return Ok(());
    }

    println!("{}", "Snapshots:".bold());
    for summary in summaries {
        if detailed {
            println!(
                "  {} {} {} files, {}",
                summary.version.cyan().bold(),
                summary
                    .created_at
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
                    .dimmed(),
                summary.file_count,
                rpl::utils::format_bytes(summary.total_size)
            );
        } else {
            println!(
                "  {} {}",
                summary.version.cyan().bold(),
                summary
                    .created_at
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
                    .dimmed()
            );
        }
    }
    Ok(())
}

fn cmd_restore(path: &PathBuf, version: &str, yes: bool) -> Result<(), RplError> {
    let rpl = Rpl::open(path)?;

    if !yes {
        print!(
            "Restore {} to version {}? Files not in that version will be deleted. [y/N] ",
            rpl.root().display(),
            version.cyan()
        );
        io::stdout().flush()?;

        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            println!("Aborted");
            return Ok(());
        }
    }

    let report = rpl.restore(version)?;

    println!(
        "{} Restored {}: {} files written ({}), {} deleted, {}ms",
        "✓".green().bold(),
        report.version.cyan(),
        report.restored.len(),
        rpl::utils::format_bytes(report.bytes_written),
        report.deleted.len(),
        report.duration_ms
    );

    if !report.is_complete() {
        eprintln!("{}", "Some files could not be restored:".yellow().bold());
        for (path, reason) in &report.failed {
            eprintln!("  {} {}", path.display().to_string().yellow(), reason);
        }
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_auto_save(path: &PathBuf, interval: Duration) -> Result<(), RplError> {
    let rpl = Arc::new(Rpl::open(path)?);
    let meta_dir = rpl.meta_dir().to_path_buf();

    let mut watcher = ChangeWatcher::new(Arc::clone(&rpl), interval);
    watcher.start()?;

    println!(
        "{} Watching {} every {} (stop with 'rpl stop' from another terminal)",
        "✓".green().bold(),
        rpl.root().display(),
        humantime::format_duration(interval)
    );

    // The loop thread removes its state file when a stop is requested
    while ChangeWatcher::status(&meta_dir)?.is_some() {
        thread::sleep(Duration::from_millis(200));
    }
    watcher.stop()?;
    println!("{} Watcher stopped", "✓".green().bold());
    Ok(())
}

fn cmd_stop(path: &PathBuf) -> Result<(), RplError> {
    let rpl = Rpl::open(path)?;
    let meta_dir = rpl.meta_dir().to_path_buf();

    let pid = ChangeWatcher::request_stop(&meta_dir)?;
    println!("Stop requested for watcher (pid {})", pid);

    // Give the loop a few seconds to acknowledge; clean up if it is gone
    for _ in 0..25 {
        if ChangeWatcher::status(&meta_dir)?.is_none() {
            println!("{} Watcher stopped", "✓".green().bold());
            return Ok(());
        }
        thread::sleep(Duration::from_millis(200));
    }

    ChangeWatcher::clear_state(&meta_dir)?;
    println!(
        "{} Watcher did not acknowledge; cleared stale state",
        "!".yellow().bold()
    );
    Ok(())
}

fn cmd_status(path: &PathBuf) -> Result<(), RplError> {
    let rpl = Rpl::open(path)?;

    println!("{}", "Project:".bold());
    println!("  root:      {}", rpl.root().display());
    println!(
        "  created:   {}",
        rpl.config().created_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!("  snapshots: {}", rpl.list()?.len());

    match ChangeWatcher::status(rpl.meta_dir())? {
        Some(state) => {
            println!("{}", "Watcher:".bold());
            println!("  running:   {} (pid {})", "yes".green(), state.pid);
            println!(
                "  started:   {}",
                state.started_at.format("%Y-%m-%d %H:%M:%S")
            );
            println!(
                "  interval:  {}",
                humantime::format_duration(Duration::from_millis(state.interval_ms))
            );
        }
        None => {
            println!("{}", "Watcher:".bold());
            println!("  running:   {}", "no".dimmed());
        }
    }
    Ok(())
}
