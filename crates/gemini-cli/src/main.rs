mod cmd;
mod settings;

use clap::{Parser, Subcommand};
use settings::BridgeArgs;

#[derive(Parser)]
#[command(
    name = "gemini-wrapper",
    about = "HTTP API that proxies questions to the gemini CLI",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    bridge: BridgeArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server (default)
    Serve {
        /// Port to listen on
        #[arg(long, env = "PORT", default_value = "8080")]
        port: u16,
        /// Address to bind
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
    },

    /// Ask a single question from the terminal and print the answer
    Ask {
        /// The question (multiple words are joined with spaces)
        #[arg(required = true)]
        question: Vec<String>,
        /// Model identifier to forward to gemini
        #[arg(long, short = 'm')]
        model: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let command = cli.command.unwrap_or_else(|| Commands::Serve {
        port: std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080),
        host: "0.0.0.0".to_string(),
    });

    let default_level = match &command {
        Commands::Serve { .. } => tracing::Level::INFO,
        Commands::Ask { .. } => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let result = match command {
        Commands::Serve { port, host } => cmd::serve::run(&cli.bridge, &host, port),
        Commands::Ask { question, model } => {
            cmd::ask::run(&cli.bridge, &question.join(" "), model.as_deref())
        }
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
