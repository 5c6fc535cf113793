//! Status command: window state, queue depths, service health.

use pl_core::config::ConfigHandle;
use pl_core::error::PlResult;

use crate::OutputFormat;

pub async fn run(config: ConfigHandle, format: OutputFormat) -> PlResult<()> {
    let registry = super::build_registry(config).await?;
    registry.start_all().await?;

    let period = registry.clock.current_period(None);
    let day_start = registry.clock.day_start_ms(None);
    let completion = registry.completion_queue.pending_count().await;
    let generation = registry.generation_queue.pending_count().await;
    let engagement = registry.engagement_queue.pending_count().await;
    let realtime = registry.realtime.status();
    let blocking = registry.enforcement.is_blocking_active();
    let health = registry.health_check();

    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "period": period.as_str(),
                "dayStartMs": day_start,
                "timezone": registry.clock.timezone(),
                "queues": {
                    "completion": completion,
                    "generation": generation,
                    "engagement": engagement,
                },
                "realtime": realtime.to_string(),
                "blockingActive": blocking,
                "services": health
                    .iter()
                    .map(|(name, state, healthy)| {
                        serde_json::json!({
                            "name": name,
                            "state": state.to_string(),
                            "healthy": healthy,
                        })
                    })
                    .collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => {
            println!("Active period:   {period}");
            println!(
                "Timezone:        {}",
                registry.clock.timezone().unwrap_or_else(|| "device-local".into())
            );
            println!("Day start (ms):  {day_start}");
            println!("Realtime:        {realtime}");
            println!("Blocking:        {}", if blocking { "active" } else { "inactive" });
            println!("Pending queues:  completion={completion} generation={generation} engagement={engagement}");
            println!("Services:");
            for (name, state, healthy) in &health {
                println!(
                    "  {name:<18} {state:<8} {}",
                    if *healthy { "ok" } else { "UNHEALTHY" }
                );
            }
        }
    }

    registry.stop_all().await?;
    Ok(())
}
