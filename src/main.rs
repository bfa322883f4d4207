use std::path::Path;

use anyhow::Context;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use support_triage::config::TriageConfig;
use support_triage::inbox;
use support_triage::pipeline::{BatchSummary, SupportPipeline};
use support_triage::pipeline::types::RawEmail;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = TriageConfig::from_env().context("Failed to load configuration")?;
    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("📬 Support Triage v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.llm.model);
    eprintln!("   Knowledge: {}", config.knowledge_path.display());
    eprintln!("   Inbox: {}", config.inbox_path.display());
    eprintln!("   Concurrency: {}\n", config.concurrency);

    let pipeline = SupportPipeline::load(&config).await.with_context(|| {
        format!(
            "Failed to set up pipeline with knowledge base {}",
            config.knowledge_path.display()
        )
    })?;

    let items = inbox::load(&config.inbox_path)
        .await
        .with_context(|| format!("Failed to load inbox from {}", config.inbox_path.display()))?;

    let (emails, expected): (Vec<RawEmail>, Vec<_>) = items
        .into_iter()
        .map(|item| (item.email, item.expected_category))
        .unzip();

    let outcomes = pipeline.process_batch(&emails, config.concurrency).await;

    for outcome in &outcomes {
        debug!(
            email_id = %outcome.email_id,
            outcome = %serde_json::to_string(outcome)?,
            "Pipeline outcome"
        );
        println!(
            "{:<12} {:<24} {:<18} {:.2}  {}",
            outcome.email_id,
            outcome.decision.action,
            outcome.intent.category,
            outcome.decision.final_confidence,
            outcome.decision.reason
        );
    }

    let summary = BatchSummary::from_outcomes(&outcomes, &expected);
    info!(
        total = summary.total,
        auto_send = summary.auto_send,
        human_review = summary.human_review,
        escalated = summary.escalated,
        "Batch complete"
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}

/// Console logging filtered by `RUST_LOG`, plus a daily rolling audit file
/// when a log directory is configured.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "support-triage.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .init();

    guard
}
