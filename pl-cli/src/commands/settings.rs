//! PRAYLOCK settings commands.

use clap::Subcommand;

use pl_api::BlockSchedule;
use pl_core::config::ConfigHandle;
use pl_core::error::{PlError, PlResult};

use crate::OutputFormat;

#[derive(Debug, Subcommand)]
pub enum SettingsAction {
    /// Show the settings row (server copy, cache on failure).
    Show,
    /// Enable enforcement.
    Enable,
    /// Disable enforcement.
    Disable,
    /// Set the enforced windows: morning, evening, or both.
    Schedule {
        schedule: String,
    },
}

pub async fn run(
    config: ConfigHandle,
    action: SettingsAction,
    format: OutputFormat,
) -> PlResult<()> {
    let registry = super::build_registry(config).await?;
    registry.start_all().await?;

    let result = dispatch(&registry, action, format).await;

    registry.stop_all().await?;
    result
}

async fn dispatch(
    registry: &pl_services::ServiceRegistry,
    action: SettingsAction,
    format: OutputFormat,
) -> PlResult<()> {
    match action {
        SettingsAction::Show => {
            let settings = registry.enforcement.refresh_settings().await;
            match (settings, format) {
                (Some(settings), OutputFormat::Json) => {
                    println!("{}", serde_json::to_string_pretty(&settings)?);
                }
                (Some(settings), OutputFormat::Text) => {
                    println!("user:              {}", settings.user_id);
                    println!("enabled:           {}", settings.enabled);
                    println!("schedule:          {:?}", settings.schedule);
                    println!("morning completed: {}", settings.morning_completed);
                    println!("evening completed: {}", settings.evening_completed);
                    println!("blocked apps:      {}", settings.blocked_apps.join(", "));
                }
                (None, _) => println!("no settings row configured"),
            }
            Ok(())
        }
        SettingsAction::Enable => set_enabled(registry, true).await,
        SettingsAction::Disable => set_enabled(registry, false).await,
        SettingsAction::Schedule { schedule } => {
            let schedule = match schedule.as_str() {
                "morning" => BlockSchedule::Morning,
                "evening" => BlockSchedule::Evening,
                "both" => BlockSchedule::Both,
                other => {
                    return Err(PlError::Config(format!("unknown schedule: {other}")));
                }
            };
            let Some(mut settings) = registry.enforcement.refresh_settings().await else {
                return Err(PlError::MissingConfig("settings row".into()));
            };
            settings.schedule = schedule;
            let saved = registry.api.save_praylock_settings(&settings).await?;
            registry.cache.set_settings(saved.clone()).await;
            registry.enforcement.apply_schedule(&saved).await;
            println!("schedule set to {:?}", saved.schedule);
            Ok(())
        }
    }
}

async fn set_enabled(registry: &pl_services::ServiceRegistry, enabled: bool) -> PlResult<()> {
    let Some(mut settings) = registry.enforcement.refresh_settings().await else {
        return Err(PlError::MissingConfig("settings row".into()));
    };
    settings.enabled = enabled;
    let saved = registry.api.save_praylock_settings(&settings).await?;
    registry.cache.set_settings(saved.clone()).await;
    if enabled {
        registry.enforcement.apply_schedule(&saved).await;
    } else {
        registry.enforcement.deactivate().await;
    }
    println!("enforcement {}", if enabled { "enabled" } else { "disabled" });
    Ok(())
}
