//! Toast-style notifications raised by the workflow.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Error,
    Add,
    Edit,
    Delete,
}

impl NotificationKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Add => "add",
            Self::Edit => "edit",
            Self::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    pub kind: NotificationKind,
    /// Whether the change it reports can still be rolled back.
    pub undoable: bool,
}

impl Notification {
    pub fn new(message: impl Into<String>, kind: NotificationKind, undoable: bool) -> Self {
        Self {
            message: message.into(),
            kind,
            undoable,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(message, NotificationKind::Error, false)
    }
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Sink that only logs; useful for headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
    fn notify(&self, notification: Notification) {
        match notification.kind {
            NotificationKind::Error => tracing::warn!(
                undoable = notification.undoable,
                "{}",
                notification.message
            ),
            kind => tracing::info!(
                kind = kind.label(),
                undoable = notification.undoable,
                "{}",
                notification.message
            ),
        }
    }
}
