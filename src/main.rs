use std::time::Duration;

use anyhow::{bail, Context, Result};
use futbolin_messaging::services::{EchoResponder, EchoService, Ping, PingReceiver, PingService};
use futbolin_messaging::{MessagingConfig, MessagingFactory, PropertiesConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: futbolin-messaging <echo-server|echo|ping-receiver|ping> <queue> [text]";
const ECHO_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if present
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let (Some(command), Some(queue)) = (args.get(1), args.get(2)) else {
        bail!(USAGE);
    };
    let text = args.get(3).map(String::as_str).unwrap_or("Hello, world");

    let properties = PropertiesConfig::load()?;
    let config = MessagingConfig::from_properties(&properties)?;
    let factory = MessagingFactory::new(config);

    let outcome = run(&factory, command, queue, text).await;
    if let Err(e) = &outcome {
        error!("{:#}", e);
    }

    factory.cleanup().await;
    outcome
}

async fn run(factory: &MessagingFactory, command: &str, queue: &str, text: &str) -> Result<()> {
    match command {
        "echo-server" => {
            let _responder = EchoResponder::start(factory, queue).await?;
            info!("Echo responder running. Press Ctrl+C to exit.");
            tokio::signal::ctrl_c().await?;
        }
        "echo" => {
            let service = EchoService::new(factory, queue, ECHO_TIMEOUT).await?;
            let response = service
                .echo(text)
                .await
                .context("Echo request failed")?;
            println!("{}", response);
        }
        "ping-receiver" => {
            let mut receiver = PingReceiver::start(factory, queue).await?;
            info!("Ping receiver running. Press Ctrl+C to exit.");
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    envelope = receiver.next() => match envelope {
                        Some(envelope) => match Ping::decode(&envelope) {
                            Ok(ping) => println!("{} ({})", ping.text, ping.sent_at),
                            Err(e) => error!("Undecodable ping: {}", e),
                        },
                        None => break,
                    },
                }
            }
        }
        "ping" => {
            PingService::new(factory, queue).await?.ping(text).await?;
            info!("Ping sent to {}", queue);
        }
        other => bail!("unknown command '{}'\n{}", other, USAGE),
    }

    Ok(())
}
