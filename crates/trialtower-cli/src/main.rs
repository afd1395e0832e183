use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{CommandFactory, Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use trialtower_agent::{AgentClient, TurnUpdate};
use trialtower_core::{load_config, ChatContext, MainConfig};
use trialtower_server::state::AppState;

#[derive(Parser)]
#[command(
    name = "trialtower",
    version,
    about = "Clinical trial enrollment dashboard and chat assistant"
)]
struct Cli {
    #[arg(long, default_value = "trialtower.yaml", help = "Path to the config file")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Start the HTTP API server")]
    Serve {
        #[arg(long, help = "Override the configured bind address")]
        bind: Option<String>,
    },
    #[command(about = "Validate the config file")]
    Validate,
    #[command(about = "Local chat REPL against the configured agent")]
    Chat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_dir = PathBuf::from("logs");
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "trialtower.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .init();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    match command {
        Commands::Validate => {
            let config = load_config(&cli.config)?;
            config.validate()?;
            println!("Config valid: {}", cli.config.display());
        }
        Commands::Serve { bind } => {
            let config = load_config(&cli.config)?;
            let addr = bind.unwrap_or_else(|| config.server.bind.clone());
            let state = AppState::from_config(&config);
            trialtower_server::serve(state, &addr).await?;
        }
        Commands::Chat => {
            let config = load_config(&cli.config)?;
            run_repl(&config).await?;
        }
    }

    Ok(())
}

/// Line-oriented REPL for poking at the agent without the HTTP surface.
async fn run_repl(config: &MainConfig) -> Result<()> {
    let section = config
        .agent
        .as_ref()
        .ok_or_else(|| anyhow!("missing config section: agent"))?;
    let client = AgentClient::new(&section.host, &section.token, section.settings.clone())?;
    let mut context = ChatContext::new();

    println!("Chatting with agent '{}'. Type 'exit' to quit.", section.settings.agent);
    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        let (tx, mut rx) = mpsc::channel::<TurnUpdate>(64);
        let printer = tokio::spawn(async move {
            while let Some(update) = rx.recv().await {
                match update {
                    TurnUpdate::Status { message } => eprintln!("  [{message}]"),
                    TurnUpdate::Error { code, message } => {
                        eprintln!("  error {code}: {message}")
                    }
                    TurnUpdate::Completed { message } => println!("{}", message.text()),
                    TurnUpdate::Slot { .. } => {}
                }
            }
        });

        if let Err(e) = context.send_message(&client, line, &tx).await {
            eprintln!("turn failed: {e}");
        }
        drop(tx);
        let _ = printer.await;
    }

    Ok(())
}
