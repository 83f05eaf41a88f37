//! Focus handling with error cooldown
//!
//! After a query error, refocusing the window should not immediately fire a
//! fresh wave of refetches against a struggling backend. While the
//! recent-error flag is set, focus delivery is pushed back by a fixed delay.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Recent-error flag that clears itself a fixed window after the last error
#[derive(Debug, Clone)]
pub struct ErrorCooldown {
    deadline: Arc<Mutex<Option<Instant>>>,
    window: Duration,
}

impl ErrorCooldown {
    pub fn new(window: Duration) -> Self {
        Self {
            deadline: Arc::new(Mutex::new(None)),
            window,
        }
    }

    /// Set the flag; a later error restarts the window
    pub fn mark_error(&self) {
        *self.deadline.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now() + self.window);
    }

    pub fn is_active(&self) -> bool {
        let mut deadline = self.deadline.lock().unwrap_or_else(PoisonError::into_inner);
        match *deadline {
            Some(at) if Instant::now() < at => true,
            Some(_) => {
                *deadline = None;
                false
            }
            None => false,
        }
    }
}

#[async_trait]
pub trait FocusHandler: Send + Sync {
    async fn on_focus_change(&self, focused: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusDelivery {
    Immediate,
    Deferred(Duration),
}

pub struct FocusManager {
    handler: Arc<dyn FocusHandler>,
    cooldown: ErrorCooldown,
    delay: Duration,
}

impl FocusManager {
    pub fn new(handler: Arc<dyn FocusHandler>, cooldown: ErrorCooldown, delay: Duration) -> Self {
        Self {
            handler,
            cooldown,
            delay,
        }
    }

    pub fn cooldown(&self) -> &ErrorCooldown {
        &self.cooldown
    }

    /// Deliver a focus change, deferring a refocus while the error flag is set
    pub async fn set_focused(&self, focused: bool) -> FocusDelivery {
        if focused && self.cooldown.is_active() {
            tracing::debug!(delay_ms = self.delay.as_millis() as u64, "Deferring refocus after recent error");
            let handler = self.handler.clone();
            let delay = self.delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                handler.on_focus_change(true).await;
            });
            return FocusDelivery::Deferred(self.delay);
        }

        self.handler.on_focus_change(focused).await;
        FocusDelivery::Immediate
    }
}
