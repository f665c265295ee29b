//! Interactive terminal chat over the indexed documents
//!
//! Run with: cargo run -p doc-rag --features cli --bin doc-rag-chat
//! Type `/clear` to reset the conversation, `/quit` to exit. Ctrl+C stops the
//! answer being streamed.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use doc_rag::{
    config::RagConfig,
    retrieval::Retriever,
    server::state::{build_providers, build_store},
    ChatPipeline, SessionHandle, TurnEvent, TurnRequest,
};

#[derive(Parser, Debug)]
#[command(
    name = "doc-rag-chat",
    about = "Ask questions about indexed documents; answers stream with their references"
)]
struct ChatCli {
    /// TOML configuration file
    #[arg(long, env = "DOC_RAG_CONFIG")]
    config: Option<PathBuf>,

    /// Override the similarity threshold for every turn
    #[arg(long)]
    threshold: Option<f32>,

    /// Override the number of records retrieved per turn
    #[arg(long)]
    top_k: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "doc_rag=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = ChatCli::parse();
    let config = RagConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    let (embedder, completion) = build_providers(&config)?;
    let store = build_store(&config)?;
    let pipeline = Arc::new(ChatPipeline::new(
        Retriever::new(embedder, store),
        completion,
        config.retrieval.clone(),
    ));
    let session = Arc::new(SessionHandle::new("terminal"));

    println!(
        "doc-rag chat (model {}, store {:?})",
        config.provider.chat_model(),
        config.store.backend
    );
    println!("Type /clear to reset, /quit to exit.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let message = line.trim();
        match message {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                session.clear().await;
                println!("(conversation cleared)\n");
                continue;
            }
            _ => {}
        }

        let request = TurnRequest {
            message: message.to_string(),
            similarity_threshold: cli.threshold,
            top_k: cli.top_k,
        };
        run_turn(pipeline.clone(), session.clone(), request).await?;
    }

    Ok(())
}

async fn run_turn(
    pipeline: Arc<ChatPipeline>,
    session: Arc<SessionHandle>,
    request: TurnRequest,
) -> Result<()> {
    let (tx, mut rx) = mpsc::channel(64);
    let turn = {
        let session = session.clone();
        tokio::spawn(async move { pipeline.run_turn(&session, request, &tx).await })
    };

    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(TurnEvent::Delta { text }) => {
                    write!(stdout, "{}", text)?;
                    stdout.flush()?;
                }
                Some(TurnEvent::References(block)) => println!("{}", block.render()),
                Some(TurnEvent::Failed { message, .. }) => println!("\n[error] {}", message),
                Some(TurnEvent::Completed) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                session.clear().await;
                println!("\n(interrupted; conversation cleared)");
            }
        }
    }
    println!();

    // the outcome was already reported through the event stream
    let _ = turn.await.context("chat turn panicked")?;
    Ok(())
}
