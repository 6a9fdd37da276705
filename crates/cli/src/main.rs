mod commands;
mod config;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use commands::App;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Who requested a run created from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum ActorArg {
    Teacher,
    Student,
    System,
}

/// Consequence class of a run created from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum ImpactArg {
    Formative,
    Summative,
    Policy,
}

/// Run ledger with a teacher approval gate.
#[derive(Parser)]
#[command(name = "runledger", version, about = "Run ledger with a teacher approval gate")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print which backend is authoritative (remote or local)
    Mode,

    /// Inspect and create runs
    Runs {
        #[command(subcommand)]
        command: RunsCommands,
    },

    /// Approve a run and execute its prompt
    Approve {
        /// Id of the run to approve
        run_id: String,
    },

    /// Reject a run
    Reject {
        /// Id of the run to reject
        run_id: String,
    },

    /// List artefacts, newest first
    Artefacts {
        /// Only artefacts of this run
        #[arg(long)]
        run: Option<String>,
    },

    /// List audit events, newest first
    Audit {
        /// Maximum number of events (default 200)
        #[arg(long)]
        limit: Option<usize>,
        /// Only events about this run
        #[arg(long)]
        run: Option<String>,
    },

    /// Fail runs left in running for too long
    Sweep {
        /// Age in seconds after which a running run counts as stuck
        #[arg(long, default_value = "900")]
        older_than_secs: u64,
    },
}

#[derive(Subcommand)]
enum RunsCommands {
    /// List all runs, newest first
    List,

    /// Show one run with its artefacts and audit trail
    Show {
        /// Run id
        run_id: String,
    },

    /// Create a run in status created
    Create {
        /// Prompt executed when the run is approved
        #[arg(long)]
        input: Option<String>,
        #[arg(long, default_value = "teacher", value_enum)]
        actor_type: ActorArg,
        #[arg(long, default_value = "cli")]
        actor_id: String,
        #[arg(long, default_value = "formative", value_enum)]
        impact: ImpactArg,
        #[arg(long)]
        workflow_id: String,
        #[arg(long)]
        ssot_version: String,
    },
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let config = match config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(msg) => {
            report_error(&msg, cli.output);
            process::exit(1);
        }
    };
    let app = App::new(&config, cli.output);

    let result = match cli.command {
        Commands::Mode => commands::ledger::cmd_mode(&app),
        Commands::Runs { command } => match command {
            RunsCommands::List => commands::runs::cmd_list(&app).await,
            RunsCommands::Show { run_id } => commands::runs::cmd_show(&app, &run_id).await,
            RunsCommands::Create {
                input,
                actor_type,
                actor_id,
                impact,
                workflow_id,
                ssot_version,
            } => {
                commands::runs::cmd_create(
                    &app,
                    commands::runs::CreateArgs {
                        input,
                        actor_type,
                        actor_id,
                        impact,
                        workflow_id,
                        ssot_version,
                    },
                )
                .await
            }
        },
        Commands::Approve { run_id } => commands::gate::cmd_approve(&app, &run_id).await,
        Commands::Reject { run_id } => commands::gate::cmd_reject(&app, &run_id).await,
        Commands::Artefacts { run } => commands::ledger::cmd_artefacts(&app, run.as_deref()).await,
        Commands::Audit { limit, run } => {
            commands::ledger::cmd_audit(&app, limit, run.as_deref()).await
        }
        Commands::Sweep { older_than_secs } => {
            commands::gate::cmd_sweep(&app, older_than_secs).await
        }
    };

    if let Err(msg) = result {
        report_error(&msg, cli.output);
        process::exit(1);
    }
}

/// Log to stderr, filtered by `RUST_LOG` (default `warn`).
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub(crate) fn report_error(msg: &str, output: OutputFormat) {
    match output {
        OutputFormat::Text => eprintln!("error: {}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
