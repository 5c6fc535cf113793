//! Watch command: stream engine events to the terminal.

use pl_core::config::ConfigHandle;
use pl_core::error::PlResult;
use pl_services::AppEvent;

pub async fn run(config: ConfigHandle) -> PlResult<()> {
    let registry = super::build_registry(config).await?;
    registry.start_all().await?;

    println!("watching engine events (ctrl-c to stop)");
    let mut rx = registry.bus.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => print_event(&event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    eprintln!("(lagged, missed {n} events)");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    registry.stop_all().await?;
    Ok(())
}

fn print_event(event: &AppEvent) {
    match event {
        AppEvent::PrayerCompleted { user_id, prayer_id } => {
            println!("prayer completed: {prayer_id} (user {user_id})");
        }
        AppEvent::PrayerGenerated { prayer_id, .. } => {
            println!("prayer generated: {prayer_id}");
        }
        AppEvent::PrayerEngaged { prayer_id } => {
            println!("prayer engaged: {prayer_id}");
        }
        AppEvent::SettingsUpdated { user_id } => {
            println!("settings updated (user {user_id})");
        }
        AppEvent::CacheInvalidated { table } => {
            println!("cache invalidated: {table}");
        }
        AppEvent::PeriodChanged { period } => {
            println!("period changed: {period}");
        }
        AppEvent::ConnectivityChanged { online } => {
            println!("connectivity: {}", if *online { "online" } else { "offline" });
        }
        AppEvent::AppForegrounded => println!("app foregrounded"),
        AppEvent::AppBackgrounded => println!("app backgrounded"),
        AppEvent::BlockingChanged { active } => {
            println!("blocking: {}", if *active { "active" } else { "lifted" });
        }
    }
}
