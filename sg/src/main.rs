//! sg - scatter-gather endpoint runner
//!
//! Wires an endpoint to in-process echo recipients, sends one request and
//! prints the aggregated result.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::{Context, Result};
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use scattergather::cli::{Cli, Command, Mode};
use scattergather::config::Config;
use scattergather::events::{EventLogEntry, SgEvent, create_event_bus};
use scattergather::workers::{spawn_queue_worker, spawn_subscriber_worker};
use scattergather::{
    ChannelRef, CollectPayloads, Message, PublishSubscribeChannel, QueueChannel, Recipient, RecipientList,
    ScatterGatherBuilder,
};

fn setup_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level.to_lowercase()))
        .context("Invalid log level")?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    info!("Logging initialized (level: {})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // CLI flag > config file > INFO
    let level = cli
        .log_level
        .clone()
        .or_else(|| Config::load_log_level(cli.config.as_ref()))
        .unwrap_or_else(|| "INFO".to_string());
    setup_logging(&level).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    match cli.command {
        Command::Run {
            mode,
            recipients,
            silent,
            payload,
            gather_timeout_ms,
            events,
        } => cmd_run(config, mode, recipients, silent, &payload, gather_timeout_ms, events).await,
        Command::Config => cmd_config(&config),
    }
}

fn cmd_config(config: &Config) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Failed to serialize configuration")?;
    print!("{}", yaml);
    Ok(())
}

async fn cmd_run(
    config: Config,
    mode: Mode,
    recipients: usize,
    silent: usize,
    payload: &str,
    gather_timeout_ms: Option<i64>,
    print_events: bool,
) -> Result<()> {
    let payload: Value = serde_json::from_str(payload).context("Payload is not valid JSON")?;
    let mut settings = config.scatter_gather;
    if let Some(ms) = gather_timeout_ms {
        settings.gather_timeout_ms = ms;
    }
    if silent > 0 && settings.gather_timeout_ms < 0 {
        warn!("Silent recipients with no gather timeout would wait forever, using 1000ms");
        settings.gather_timeout_ms = 1000;
    }

    let input = Arc::new(QueueChannel::unbounded("input"));
    let output = Arc::new(QueueChannel::unbounded("output"));
    let mut builder = ScatterGatherBuilder::new("sg")
        .config(settings)
        .input(input)
        .output(output)
        .aggregator(CollectPayloads);

    let mut printer = None;
    if print_events {
        let bus = create_event_bus();
        printer = Some(spawn_event_printer(bus.subscribe()));
        builder = builder.events(bus);
    }

    let mut workers: Vec<JoinHandle<()>> = Vec::new();
    let builder = match mode {
        Mode::Auction => {
            let bids = Arc::new(PublishSubscribeChannel::with_default_capacity("bids"));
            for index in 0..recipients {
                let rx = bids.subscribe();
                workers.push(spawn_subscriber_worker(rx, move |m| respond(index, silent, m)));
            }
            builder.scatter_channel(bids)
        }
        Mode::Distribution => {
            let mut list = RecipientList::default();
            for index in 0..recipients {
                let queue = Arc::new(QueueChannel::unbounded(format!("recipient-{}", index)));
                workers.push(spawn_queue_worker(queue.clone(), move |m| respond(index, silent, m)));
                let channel: ChannelRef = queue;
                list = list.push(Recipient::new(channel));
            }
            builder.recipients(list)
        }
    };

    let endpoint = builder.build().context("Failed to build endpoint")?;
    endpoint.start();
    info!(?mode, recipients, silent, "Scattering request");

    let outcome = endpoint.handle_request(Message::new(payload)).await;
    endpoint.stop();
    drop(endpoint);
    for worker in &workers {
        worker.abort();
    }
    futures::future::join_all(workers).await;

    // The bus closes once every holder is gone; the printer drains what is buffered
    if let Some(printer) = printer {
        let _ = tokio::time::timeout(Duration::from_millis(200), printer).await;
    }

    match outcome.context("Request failed")? {
        Some(result) => println!("{}", serde_json::to_string_pretty(&result.payload)?),
        None => println!("null"),
    }
    Ok(())
}

fn spawn_event_printer(mut rx: broadcast::Receiver<SgEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match serde_json::to_string(&EventLogEntry::new(event)) {
                Ok(line) => eprintln!("{}", line),
                Err(e) => warn!(error = %e, "Failed to serialize event"),
            }
        }
    })
}

/// Echo handler; the first `silent` recipients never answer
fn respond(index: usize, silent: usize, request: &Message) -> Option<Value> {
    if index < silent {
        return None;
    }
    Some(json!({ "recipient": index, "request": request.payload }))
}
