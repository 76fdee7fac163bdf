use std::{fmt::Write as _, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pipeline_core::{
    ClientSettings, Column, DealService, DragOutcome, DropTarget, HttpDealService, PipelineBoard,
    PipelineEvent, TransitionOutcome,
};
use shared::domain::{DealId, DealStatus};
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, env = "PIPELINE_SERVER_URL", default_value = "http://127.0.0.1:8000")]
    server_url: String,
    /// Per-request timeout; waits indefinitely when omitted.
    #[arg(long, env = "PIPELINE_TIMEOUT_MS")]
    timeout_ms: Option<u64>,
    #[arg(long, env = "PIPELINE_LOG_LEVEL", default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the board as four status columns.
    Show,
    /// Drag a deal onto a status column.
    Move {
        #[arg(long)]
        deal_id: i64,
        #[arg(long)]
        to: DealStatus,
    },
    /// Drop a deal over a raw droppable id (`won`, `12`, `deal-12`); omit
    /// `--over` to release over nothing.
    Drop {
        #[arg(long)]
        deal_id: i64,
        #[arg(long)]
        over: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let mut settings = ClientSettings::new(&args.server_url);
    if let Some(ms) = args.timeout_ms {
        settings = settings.with_timeout(Duration::from_millis(ms));
    }
    let service: Arc<dyn DealService> = Arc::new(
        HttpDealService::with_settings(&settings)
            .with_context(|| format!("invalid server url {}", args.server_url))?,
    );
    let board = PipelineBoard::new(service);
    let count = board.load().await.context("failed to load deals")?;
    info!(deals = count, server_url = %args.server_url, "board loaded");

    match args.command {
        Command::Show => print!("{}", render(&board.columns())),
        Command::Move { deal_id, to } => {
            let mut events = board.subscribe();
            board.start_drag(DealId(deal_id))?;
            let outcome = board.end_drag(Some(DropTarget::Column(to))).await?;
            report(&board, outcome, &mut events)?;
        }
        Command::Drop { deal_id, over } => {
            let mut events = board.subscribe();
            let outcome = board.on_drag_end(DealId(deal_id), over.as_deref()).await?;
            report(&board, outcome, &mut events)?;
        }
    }

    Ok(())
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn report(
    board: &PipelineBoard,
    outcome: DragOutcome,
    events: &mut broadcast::Receiver<PipelineEvent>,
) -> Result<()> {
    while let Ok(event) = events.try_recv() {
        if let PipelineEvent::Notice(notice) = event {
            eprintln!("{}", notice.message);
        }
    }

    match outcome {
        DragOutcome::Cancelled { deal_id } => println!("deal {deal_id}: drag cancelled"),
        DragOutcome::Transition(TransitionOutcome::NotApplicable { deal_id, status }) => {
            println!("deal {deal_id} is already {status}")
        }
        DragOutcome::Transition(TransitionOutcome::Committed {
            deal_id,
            previous,
            current,
            ..
        }) => println!("deal {deal_id}: {previous} -> {current}"),
        DragOutcome::Transition(TransitionOutcome::RolledBack { error, .. }) => {
            print!("{}", render(&board.columns()));
            bail!(error);
        }
    }
    print!("{}", render(&board.columns()));
    Ok(())
}

fn render(columns: &[Column]) -> String {
    let mut out = String::new();
    for column in columns {
        let _ = writeln!(
            out,
            "== {} [{}] ({} deals, {:.0}) ==",
            column.label,
            column.status,
            column.len(),
            column.total_value()
        );
        for deal in &column.deals {
            let company = deal
                .company
                .as_ref()
                .map(|c| c.company_name.as_str())
                .unwrap_or("-");
            let _ = writeln!(
                out,
                "  #{:<5} {:<32} {:>12.0}  {}",
                deal.id.0, deal.title, deal.value, company
            );
        }
    }
    out
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
