//! vcassist CLI: the main entry point.
//!
//! Commands:
//! - `chat`: Interactive conversation with the assistant
//! - `ask`: Single question, single answer
//! - `tools`: Print the tool catalog
//! - `call`: Invoke one tool directly, without the model
//! - `serve`: Expose the tool catalog to MCP clients over stdio
//! - `doctor`: Check configuration and connectivity

use clap::{Parser, Subcommand};

mod commands;
mod runtime;

#[derive(Parser)]
#[command(
    name = "vcassist",
    about = "vcassist — vCenter operations assistant",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Use a built-in simulated lab instead of a real vCenter and runbook index
    #[arg(long, global = true, env = "VCASSIST_SIMULATE")]
    simulate: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the assistant
    Chat,

    /// Ask a single question
    Ask {
        /// The question
        #[arg(short, long)]
        message: String,
    },

    /// List the tools the assistant can call
    Tools {
        /// Print descriptors as JSON
        #[arg(long)]
        json: bool,
    },

    /// Invoke a tool directly
    Call {
        /// Tool name, e.g. list_vms
        tool: String,

        /// Arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,
    },

    /// Serve the tool catalog over MCP (JSON-RPC on stdin/stdout)
    Serve,

    /// Diagnose configuration and connectivity
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    let options = runtime::Options {
        simulate: cli.simulate,
    };

    match cli.command {
        Commands::Chat => commands::chat::run(options).await,
        Commands::Ask { message } => commands::ask::run(options, &message).await,
        Commands::Tools { json } => commands::tools::run(options, json).await,
        Commands::Call { tool, args } => commands::call::run(options, &tool, &args).await,
        Commands::Serve => commands::serve::run(options).await,
        Commands::Doctor => commands::doctor::run(options).await,
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
