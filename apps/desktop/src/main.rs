use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use client_core::{
    load_settings_from, ApplicationState, Notification, NotificationLevel, StateOrchestrator,
    StateStream, StatusFilter,
};
use futures::StreamExt;
use shared::domain::{ServerDraft, ServerId, ServerStatus};
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "server-dashboard", about = "Monitor managed servers from the terminal")]
struct Args {
    /// Directory API base url; overrides the settings file and environment.
    #[arg(long)]
    api_url: Option<String>,
    #[arg(long)]
    timeout_ms: Option<String>,
    #[arg(long, default_value = client_core::config::DEFAULT_SETTINGS_FILE)]
    config: PathBuf,
    /// Print every state as a JSON line instead of a table.
    #[arg(long)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    List,
    Ping {
        address: String,
    },
    Save {
        #[arg(long)]
        address: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        kind: String,
        #[arg(long, default_value = "")]
        memory: String,
        #[arg(long, value_enum, default_value_t = StatusArg::Down)]
        status: StatusArg,
        #[arg(long, default_value = "")]
        image_url: String,
    },
    Delete {
        id: i64,
    },
    Filter {
        #[arg(value_parser = parse_filter)]
        status: StatusFilter,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StatusArg {
    Up,
    Down,
}

impl From<StatusArg> for ServerStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Up => ServerStatus::Up,
            StatusArg::Down => ServerStatus::Down,
        }
    }
}

fn parse_filter(raw: &str) -> Result<StatusFilter, String> {
    raw.parse()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings_from(&args.config).context("failed to load settings")?;
    if let Some(api_url) = &args.api_url {
        settings.set_api_url(api_url).context("invalid --api-url")?;
    }
    if let Some(timeout_ms) = &args.timeout_ms {
        settings
            .set_request_timeout_ms(timeout_ms)
            .context("invalid --timeout-ms")?;
    }

    info!(
        api_url = %settings.api_url,
        timeout = ?settings.request_timeout,
        "dashboard: starting"
    );
    let orchestrator = client_core::connect(&settings);
    let mut notifications = orchestrator.subscribe_notifications();

    // No persistence between runs: every command starts from a fresh listing.
    let loaded = render(orchestrator.initialize().await, args.json).await?;
    if !loaded {
        print_notifications(&mut notifications);
        bail!("initial server list could not be loaded");
    }

    let stream = match args.command {
        Command::List => None,
        Command::Ping { address } => Some(ping(&orchestrator, address).await),
        Command::Save {
            address,
            name,
            kind,
            memory,
            status,
            image_url,
        } => {
            let mut draft = ServerDraft::new(address, name);
            draft.kind = kind;
            draft.memory = memory;
            draft.status = status.into();
            draft.image_url = image_url;
            Some(orchestrator.save(draft).await)
        }
        Command::Delete { id } => {
            let listed = orchestrator
                .snapshot()
                .await
                .and_then(|snapshot| snapshot.find(ServerId(id)).cloned());
            let Some(server) = listed else {
                bail!("server {id} is not listed by the directory");
            };
            Some(orchestrator.delete_server(&server).await)
        }
        Command::Filter { status } => Some(orchestrator.filter(status).await),
    };

    let outcome = match stream {
        Some(stream) => render(stream, args.json).await,
        None => Ok(true),
    };
    print_notifications(&mut notifications);
    if !outcome? {
        bail!("operation failed");
    }
    Ok(())
}

async fn ping(orchestrator: &Arc<StateOrchestrator>, address: String) -> StateStream {
    let stream = orchestrator.ping(address).await;
    if let Some(active) = orchestrator.active_ping().await {
        eprintln!("pinging {active} ...");
    }
    stream
}

/// Prints the stream and reports whether it ended loaded.
async fn render(mut stream: StateStream, json: bool) -> Result<bool> {
    let mut last = None;
    while let Some(state) = stream.next().await {
        if json {
            println!("{}", serde_json::to_string(&state)?);
        } else {
            print_state(&state);
        }
        last = Some(state);
    }
    Ok(matches!(last, Some(ApplicationState::Loaded(_))))
}

fn print_state(state: &ApplicationState) {
    match state {
        ApplicationState::Loading => println!("loading ..."),
        ApplicationState::Loaded(snapshot) => {
            println!("{} ({} servers)", snapshot.message, snapshot.servers.len());
            for server in &snapshot.servers {
                println!(
                    "  {:>4}  {:<16} {:<20} {:<12} {:<8} {}",
                    server.id, server.address, server.name, server.kind, server.memory, server.status
                );
            }
        }
        ApplicationState::Error(err) => println!("error: {err} ({})", err.message),
    }
}

fn print_notifications(rx: &mut broadcast::Receiver<Notification>) {
    while let Ok(notification) = rx.try_recv() {
        let tag = match notification.level {
            NotificationLevel::Success => "success",
            NotificationLevel::Info => "info",
            NotificationLevel::Error => "error",
        };
        eprintln!("[{tag}] {}", notification.text);
    }
}
