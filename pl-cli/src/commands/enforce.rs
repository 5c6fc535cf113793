//! Enforcement commands: foreground check and background trigger.

use clap::Subcommand;

use pl_core::config::ConfigHandle;
use pl_core::error::PlResult;

use crate::OutputFormat;

#[derive(Debug, Subcommand)]
pub enum EnforceAction {
    /// Run the foreground reconciliation pass.
    Check,
    /// Run the background-refresh entry point (period-change path).
    Background,
    /// Lift blocking and remove the native schedule.
    Deactivate,
}

pub async fn run(config: ConfigHandle, action: EnforceAction, format: OutputFormat) -> PlResult<()> {
    let registry = super::build_registry(config).await?;
    registry.start_all().await?;

    match action {
        EnforceAction::Check => registry.enforcement.check_and_enforce().await,
        EnforceAction::Background => registry.enforcement.trigger_background_check().await,
        EnforceAction::Deactivate => registry.enforcement.deactivate().await,
    }

    let active = registry.enforcement.is_blocking_active();
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "blockingActive": active,
                    "period": registry.clock.current_period(None).as_str(),
                })
            );
        }
        OutputFormat::Text => {
            println!("period:   {}", registry.clock.current_period(None));
            println!("blocking: {}", if active { "active" } else { "inactive" });
        }
    }

    registry.stop_all().await?;
    Ok(())
}
