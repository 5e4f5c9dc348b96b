#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

use anyhow::Result;
use clap::Parser;
use console::style;
use relay_cli::{
    ChatSession, ClientConfig, ClientError, DeliveryMode, RelayClient, SendOutcome, StopReason,
    APOLOGY, DEFAULT_ENDPOINT, GREETING,
};
use relay_common::logging::init_logging;
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

/// `relay-chat` - talk to the relay from your terminal.
#[derive(Parser, Debug)]
#[command(name = "relay-chat")]
#[command(version)]
#[command(about = "Streaming terminal chat for the relay.", long_about = None)]
struct Cli {
    /// Relay base URL
    #[arg(long, env = "RELAY_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// System instruction sent with every message (relay default if omitted)
    #[arg(long)]
    system: Option<String>,

    /// Use the buffered /api/chat route instead of streaming
    #[arg(long)]
    buffered: bool,

    /// Stop waiting for a reply after this many seconds without new text
    #[arg(long)]
    idle_timeout_secs: Option<u64>,

    /// Log level for diagnostics on stderr
    #[arg(long, env = "RELAY_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv::dotenv();
    let cli = Cli::parse();

    init_logging(&cli.log_level, "pretty");

    let client = RelayClient::new(ClientConfig {
        endpoint: cli.endpoint.clone(),
        mode: if cli.buffered {
            DeliveryMode::Buffered
        } else {
            DeliveryMode::Stream
        },
        idle_timeout: cli.idle_timeout_secs.map(Duration::from_secs),
        ..ClientConfig::default()
    })?;

    let mut session = ChatSession::new(client, cli.system);

    print_badge(session.client().health().await, &cli.endpoint);
    println!("{} {}", style("assistant>").cyan().bold(), GREETING);
    println!(
        "{}",
        style("Commands: /reset, /health, /quit. Ctrl-C stops a reply.").dim()
    );

    // Ctrl-C stops the reply in flight; at the prompt it exits.
    let stop = session.stop_handle();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if stop.is_loading() {
                stop.stop();
            } else {
                println!();
                std::process::exit(130);
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", style("you>").green().bold());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                session.reset();
                println!("{} {}", style("assistant>").cyan().bold(), GREETING);
                continue;
            }
            "/health" => {
                print_badge(session.client().health().await, &cli.endpoint);
                continue;
            }
            _ => {}
        }

        print!("{} ", style("assistant>").cyan().bold());
        std::io::stdout().flush()?;

        let result = session
            .send(&line, |delta| {
                print!("{delta}");
                let _ = std::io::stdout().flush();
            })
            .await;

        match result {
            Ok(SendOutcome::Completed) => println!(),
            Ok(SendOutcome::Cancelled(StopReason::User)) => {
                println!(" {}", style("[stopped]").yellow());
            }
            Ok(SendOutcome::Cancelled(StopReason::Timeout)) => {
                println!(" {}", style("[timed out]").yellow());
            }
            Err(ClientError::EmptyMessage) => println!(),
            Err(e) => {
                tracing::debug!(error = %e, "Send failed");
                println!("{}", style(APOLOGY).red());
            }
        }
    }

    Ok(())
}

fn print_badge(ready: bool, endpoint: &str) {
    if ready {
        println!("{} {}", style("[Ready]").green().bold(), style(endpoint).dim());
    } else {
        println!("{} {}", style("[Offline]").red().bold(), style(endpoint).dim());
    }
}
