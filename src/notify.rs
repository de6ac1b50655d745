use log::{error, info};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    Success,
    Error,
}

/// User-facing feedback channel. The UI layer above decides how to render
/// emitted messages; the library only guarantees what gets emitted and when.
pub trait Notifier: Send + Sync {
    fn emit(&self, level: NotifyLevel, message: &str);
}

/// Default sink when no UI is attached.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn emit(&self, level: NotifyLevel, message: &str) {
        match level {
            NotifyLevel::Success => info!("{}", message),
            NotifyLevel::Error => error!("{}", message),
        }
    }
}

/// Error-reporting collaborator: logs the failure chain and surfaces a
/// user-visible message through the notifier. Nothing is re-raised.
#[derive(Clone)]
pub struct ErrorReporter {
    notifier: Arc<dyn Notifier>,
}

impl ErrorReporter {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    pub fn report(&self, context: &str, err: &dyn std::error::Error) {
        error!("{}: {}", context, err);
        self.notifier
            .emit(NotifyLevel::Error, &format!("{}: {}", context, err));
    }
}
