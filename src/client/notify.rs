//! User-facing notices

use crate::models::MAX_FEATURED_POSTS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    SessionExpired,
    Forbidden,
    ConnectionRestored,
    FeaturedLimitReached,
}

impl Notice {
    pub fn message(&self) -> String {
        match self {
            Notice::SessionExpired => "Your session has expired. Please sign in again.".to_string(),
            Notice::Forbidden => "You do not have permission to perform this action.".to_string(),
            Notice::ConnectionRestored => "Connection restored".to_string(),
            Notice::FeaturedLimitReached => format!(
                "There are already {} featured posts. Unfeature one first.",
                MAX_FEATURED_POSTS
            ),
        }
    }
}

/// Sink for notices; a UI would show them as toasts
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Writes notices to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice {
            Notice::ConnectionRestored => tracing::info!(?notice, "{}", notice.message()),
            _ => tracing::warn!(?notice, "{}", notice.message()),
        }
    }
}
