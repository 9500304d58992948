use crate::session::RunSessions;

/// Drops sessions whose run was abandoned without invalidating it.
#[tracing::instrument(skip(sessions))]
pub fn run_gc(sessions: &RunSessions, now: chrono::DateTime<chrono::Utc>, idle: chrono::Duration) -> usize {
    let removed = sessions.sweep(now, idle);
    if removed > 0 {
        tracing::info!("Removed {} idle sessions, {} still open", removed, sessions.len());
    }
    removed
}

/// Runs [`run_gc`] forever at the given interval.
pub async fn gc_loop(
    sessions: std::sync::Arc<RunSessions>,
    interval: std::time::Duration,
    idle: chrono::Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        run_gc(&sessions, chrono::Utc::now(), idle);
    }
}
