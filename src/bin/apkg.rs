//! Minimal command-line surface over the `apkg` library: enough to exercise
//! the database end to end, not a full user-facing package manager.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use apkg::config;
use apkg::db::Database;

#[derive(Parser)]
#[command(name = "apkg", about = "Package database and installation engine")]
struct Cli {
    /// Root directory the database lives under.
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Suppress informational logging; errors are still reported.
    #[arg(long)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize a fresh database root.
    Create,
    /// Fetch and register a repository's index.
    AddRepo { url: String },
    /// Add names to the world file and commit.
    Add { names: Vec<String> },
    /// Remove names from the world file and commit.
    Del { names: Vec<String> },
    /// Re-resolve the current world and apply any changes.
    Commit,
}

fn init_logging(quiet: bool) {
    let level = if quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Create => {
            Database::create(&cli.root)?;
        }
        Command::AddRepo { url } => {
            let mut db = Database::open(&cli.root)?;
            let scratch = cli.root.join("tmp");
            db.add_repository(&url, &scratch)?;
            db.write_config()?;
        }
        Command::Add { names } => {
            let mut db = Database::open(&cli.root)?;
            let mut world = config::read_world(&db.world_path())?;
            for name in names {
                if !world.contains(&name) {
                    world.push(name);
                }
            }
            config::write_world(&db.world_path(), &world)?;
            let scratch = cli.root.join("tmp");
            db.recalculate_and_commit(&world, &scratch)?;
        }
        Command::Del { names } => {
            let mut db = Database::open(&cli.root)?;
            let mut world = config::read_world(&db.world_path())?;
            world.retain(|name| !names.contains(name));
            config::write_world(&db.world_path(), &world)?;
            let scratch = cli.root.join("tmp");
            db.recalculate_and_commit(&world, &scratch)?;
        }
        Command::Commit => {
            let mut db = Database::open(&cli.root)?;
            let world = config::read_world(&db.world_path())?;
            let scratch = cli.root.join("tmp");
            db.recalculate_and_commit(&world, &scratch)?;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.quiet);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}
