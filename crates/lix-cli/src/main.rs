#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "lix: change tracking for structured records",
    long_about = None
)]
struct Cli {
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Author recorded on new changes (overrides LIX_AUTHOR and config).
    #[arg(long, global = true)]
    author: Option<String>,

    /// Project directory (defaults to the current directory).
    #[arg(short = 'C', long = "dir", global = true)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        resolve_output_mode(self.json)
    }

    fn author_flag(&self) -> Option<&str> {
        self.author.as_deref()
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Lifecycle",
        about = "Initialize a lix",
        long_about = "Create .lix/ with a default config and an empty history.",
        after_help = "EXAMPLES:\n    # Initialize in the current directory\n    lix init\n\n    # Initialize elsewhere\n    lix -C ./project init"
    )]
    Init,

    #[command(
        next_help_heading = "Write",
        about = "Set an entity's value",
        long_about = "Record a new value for an entity as a one-change commit on the active branch.",
        after_help = "EXAMPLES:\n    # Store JSON content\n    lix set variant greeting/en '{\"text\":\"Hello\"}' -m \"add greeting\"\n\n    # Plain words are stored as a string\n    lix set variant greeting/de Hallo"
    )]
    Set(cmd::edit::SetArgs),

    #[command(
        next_help_heading = "Write",
        about = "Delete an entity",
        long_about = "Record a deletion (tombstone) for an entity on the active branch."
    )]
    Delete(cmd::edit::DeleteArgs),

    #[command(
        next_help_heading = "Read",
        about = "Print an entity's current value"
    )]
    Get(cmd::get::GetArgs),

    #[command(
        next_help_heading = "Read",
        about = "List commits on the active branch",
        after_help = "EXAMPLES:\n    # Last five commits\n    lix log -n 5"
    )]
    Log(cmd::log::LogArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show a commit and what it changed"
    )]
    Show(cmd::show::ShowArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show every change to one entity"
    )]
    History(cmd::history::HistoryArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Manage the stored author account",
        long_about = "The active account names the author of new commits when neither --author, LIX_AUTHOR, nor config sets one.",
        after_help = "EXAMPLES:\n    # Commit as anna from now on\n    lix account set anna"
    )]
    Account(cmd::account::AccountArgs),

    #[command(next_help_heading = "Branches", about = "Manage branches")]
    Branch(cmd::branch::BranchArgs),

    #[command(
        next_help_heading = "Branches",
        about = "Copy this lix into a new directory",
        long_about = "Copy every commit, change, snapshot, and branch into a new lix, keeping ids so the two can later be compared with `lix conflicts detect`."
    )]
    Fork(cmd::fork::ForkArgs),

    #[command(
        next_help_heading = "Branches",
        about = "Detect and resolve conflicts with a fork",
        after_help = "EXAMPLES:\n    # Compare a fork against this lix\n    lix conflicts detect --source ../fork\n\n    # Store what was found\n    lix conflicts detect --source ../fork --record"
    )]
    Conflicts(cmd::conflicts::ConflictsArgs),

    #[command(
        next_help_heading = "Project Maintenance",
        about = "Generate shell completion scripts"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("LIX_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            "lix_core=debug,lix_cli=debug,info"
        } else {
            "warn"
        })
    });

    let format = env::var("LIX_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());
    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let project_root = match &cli.dir {
        Some(dir) => dir.clone(),
        None => env::current_dir()?,
    };
    let output = cli.output_mode();
    let author = cli.author_flag();
    debug!(root = %project_root.display(), ?output, "running command");

    match &cli.command {
        Commands::Init => cmd::init::run_init(&project_root, output),
        Commands::Set(args) => cmd::edit::run_set(args, author, output, &project_root),
        Commands::Delete(args) => cmd::edit::run_delete(args, author, output, &project_root),
        Commands::Get(args) => cmd::get::run_get(args, output, &project_root),
        Commands::Log(args) => cmd::log::run_log(args, output, &project_root),
        Commands::Show(args) => cmd::show::run_show(args, output, &project_root),
        Commands::History(args) => cmd::history::run_history(args, output, &project_root),
        Commands::Account(args) => cmd::account::run_account(args, output, &project_root),
        Commands::Branch(args) => cmd::branch::run_branch(args, author, output, &project_root),
        Commands::Fork(args) => cmd::fork::run_fork(args, output, &project_root),
        Commands::Conflicts(args) => cmd::conflicts::run_conflicts(args, output, &project_root),
        Commands::Completions(args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let output = cli.output_mode();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let _ = render_error(output, &CliError::from(&err));
            ExitCode::FAILURE
        }
    }
}
