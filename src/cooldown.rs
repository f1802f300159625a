use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Per-user fixed-window rate limit for commands.
///
/// Advisory only: it stops a user from hammering a command, it does not
/// serialize concurrent events for the same user.
pub struct CooldownGate {
    window: Duration,
    last_action: Mutex<HashMap<String, Instant>>,
}

impl CooldownGate {
    pub fn new(window: Duration) -> Self {
        CooldownGate {
            window,
            last_action: Mutex::new(HashMap::new()),
        }
    }

    /// Records the action, or returns how long the user must still wait.
    pub fn try_acquire(&self, user_id: &str, now: Instant) -> Result<(), Duration> {
        let mut last_action = match self.last_action.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        // expired entries carry no information
        let window = self.window;
        last_action.retain(|_, at| now.saturating_duration_since(*at) < window);

        if let Some(at) = last_action.get(user_id) {
            return Err(window.saturating_sub(now.saturating_duration_since(*at)));
        }
        last_action.insert(user_id.to_string(), now);
        Ok(())
    }
}
