//! `chatmesh ask`: run one turn against the configured model and store.

use anyhow::{Context, bail};
use chatmesh_config::ChatbotConfig;
use chatmesh_core::{CancelHandle, Message, TurnEvent};
use chatmesh_graph::{TurnInput, TurnRunner};
use chatmesh_store::OpenSearchStore;
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

const PRINTER_DRAIN: Duration = Duration::from_secs(2);

#[derive(Args, Debug, Default)]
pub struct AskArgs {
    /// The user query (ignored when --input is given)
    pub query: Option<String>,

    /// A full turn input as JSON: query, chat_history, chatbot_config
    #[arg(long, conflicts_with_all = ["chatbot", "history"])]
    pub input: Option<PathBuf>,

    /// Chatbot config JSON
    #[arg(long)]
    pub chatbot: Option<PathBuf>,

    /// Chat history as a JSON array of messages
    #[arg(long)]
    pub history: Option<PathBuf>,

    /// Print trace entries to stderr while the turn runs
    #[arg(long)]
    pub trace: bool,

    /// Print the answer chunk to stderr as soon as it is ready
    #[arg(long)]
    pub stream: bool,
}

pub async fn run(config_path: Option<&Path>, args: AskArgs) -> anyhow::Result<()> {
    let input = build_input(&args)?;
    let app = super::load_app_config(config_path)?;

    let provider = chatmesh_providers::build_from_config(&app)?;
    let store = Arc::new(OpenSearchStore::new(&app.store)?);
    let runner = TurnRunner::from_config(&app, provider, store);

    let printer = tokio::spawn(forward_events(runner.events().subscribe(), |line| eprintln!("{line}")));

    let (handle, token) = CancelHandle::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling turn");
            handle.cancel();
        }
    });

    let output = runner.run(input, token).await;
    // closing the bus lets the printer drain what is still buffered
    drop(runner);
    if tokio::time::timeout(PRINTER_DRAIN, printer).await.is_err() {
        warn!("Event printer did not finish draining");
    }

    println!("{}", serde_json::to_string_pretty(&output)?);
    if let Some(error) = output.error {
        bail!("turn failed: {error}");
    }
    Ok(())
}

/// Print every event until the bus closes.
async fn forward_events(mut events: broadcast::Receiver<Arc<TurnEvent>>, mut emit: impl FnMut(String)) {
    loop {
        match events.recv().await {
            Ok(event) => emit(match event.as_ref() {
                TurnEvent::Trace { markdown, .. } => markdown.clone(),
                TurnEvent::Chunk { content } => format!("> {content}"),
            }),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event printer lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Assemble the turn input from the command line.
fn build_input(args: &AskArgs) -> anyhow::Result<TurnInput> {
    let mut input = match &args.input {
        Some(path) => read_json::<TurnInput>(path)?,
        None => {
            let Some(query) = args.query.clone() else {
                bail!("a query or --input is required");
            };
            let chatbot_config = match &args.chatbot {
                Some(path) => ChatbotConfig::from_value(read_json(path)?)?,
                None => ChatbotConfig::default(),
            };
            let history: Vec<Message> = match &args.history {
                Some(path) => read_json(path)?,
                None => Vec::new(),
            };
            TurnInput::new(query, chatbot_config).with_history(history)
        }
    };

    if args.trace {
        input.enable_trace = Some(true);
    }
    if args.stream {
        input.stream = true;
    }
    Ok(input)
}
