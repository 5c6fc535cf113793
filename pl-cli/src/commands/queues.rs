//! Queue commands: list, force a pass, clear.

use clap::Subcommand;

use pl_core::config::ConfigHandle;
use pl_core::error::{PlError, PlResult};
use pl_services::ProcessTrigger;

use crate::OutputFormat;

#[derive(Debug, Subcommand)]
pub enum QueuesAction {
    /// Show pending operations per queue.
    List,
    /// Force a processing pass on one queue, or all of them.
    Process {
        /// Queue to process: completion, generation, engagement, or all.
        #[arg(default_value = "all")]
        queue: String,
    },
    /// Drop every pending operation in a queue.
    Clear {
        /// Queue to clear: completion, generation, or engagement.
        queue: String,
    },
}

pub async fn run(config: ConfigHandle, action: QueuesAction, format: OutputFormat) -> PlResult<()> {
    let registry = super::build_registry(config).await?;
    registry.start_all().await?;

    let result = dispatch(&registry, action, format).await;

    registry.stop_all().await?;
    result
}

async fn dispatch(
    registry: &pl_services::ServiceRegistry,
    action: QueuesAction,
    format: OutputFormat,
) -> PlResult<()> {
    match action {
        QueuesAction::List => {
            let completion = registry.completion_queue.pending().await;
            let generation = registry.generation_queue.pending().await;
            let engagement = registry.engagement_queue.pending().await;

            match format {
                OutputFormat::Json => {
                    let value = serde_json::json!({
                        "completion": completion,
                        "generation": generation,
                        "engagement": engagement,
                    });
                    println!("{}", serde_json::to_string_pretty(&value)?);
                }
                OutputFormat::Text => {
                    println!("completion ({}):", completion.len());
                    for op in &completion {
                        println!(
                            "  {} prayer={} retries={} created={}",
                            op.id, op.payload.prayer_id, op.retry_count, op.created_at
                        );
                    }
                    println!("generation ({}):", generation.len());
                    for op in &generation {
                        println!(
                            "  {} key={} retries={} created={}",
                            op.id, op.payload.request_key, op.retry_count, op.created_at
                        );
                    }
                    println!("engagement ({}):", engagement.len());
                    for op in &engagement {
                        println!(
                            "  {} prayer={} retries={} created={}",
                            op.id, op.payload.prayer_id, op.retry_count, op.created_at
                        );
                    }
                }
            }
            Ok(())
        }
        QueuesAction::Process { queue } => {
            match queue.as_str() {
                "completion" => {
                    let s = registry.completion_queue.process(ProcessTrigger::Manual).await;
                    println!("completion: {s:?}");
                }
                "generation" => {
                    let s = registry.generation_queue.process(ProcessTrigger::Manual).await;
                    println!("generation: {s:?}");
                }
                "engagement" => {
                    let s = registry.engagement_queue.process(ProcessTrigger::Manual).await;
                    println!("engagement: {s:?}");
                }
                "all" => {
                    let c = registry.completion_queue.process(ProcessTrigger::Manual).await;
                    let g = registry.generation_queue.process(ProcessTrigger::Manual).await;
                    let e = registry.engagement_queue.process(ProcessTrigger::Manual).await;
                    println!("completion: {c:?}");
                    println!("generation: {g:?}");
                    println!("engagement: {e:?}");
                }
                other => {
                    return Err(PlError::Config(format!("unknown queue: {other}")));
                }
            }
            Ok(())
        }
        QueuesAction::Clear { queue } => {
            match queue.as_str() {
                "completion" => registry.completion_queue.clear().await,
                "generation" => registry.generation_queue.clear().await,
                "engagement" => registry.engagement_queue.clear().await,
                other => {
                    return Err(PlError::Config(format!("unknown queue: {other}")));
                }
            }
            println!("cleared {queue}");
            Ok(())
        }
    }
}
