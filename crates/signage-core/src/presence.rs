use chrono::{DateTime, TimeDelta, Utc};

pub const DEFAULT_ONLINE_WINDOW_SECS: i64 = 20;

/// A display is online if it reported within `window`. Never-seen displays are offline.
pub fn is_online(last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>, window: TimeDelta) -> bool {
    match last_seen {
        Some(seen) => now - seen < window,
        None => false,
    }
}
