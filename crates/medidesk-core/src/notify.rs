//! User-facing notifications (toasts) raised by the session core.
//!
//! The core never renders anything itself. It hands a [`Notification`] to a
//! [`Notifier`] sink and lets the frontend decide how to show it.

use std::sync::Mutex;
use std::time::Duration;

use tracing::{error, warn};

/// Toasts disappear on their own after 5 seconds.
pub const DEFAULT_AUTO_DISMISS_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    /// Sinks showing the same key twice should replace rather than stack.
    pub dedupe_key: String,
    pub auto_dismiss: Duration,
}

impl Notification {
    pub fn warn(message: impl Into<String>, dedupe_key: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Warn,
            message: message.into(),
            dedupe_key: dedupe_key.into(),
            auto_dismiss: Duration::from_millis(DEFAULT_AUTO_DISMISS_MS),
        }
    }

    pub fn error(message: impl Into<String>, dedupe_key: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            ..Self::warn(message, dedupe_key)
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log instead of a UI.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Warn => warn!(
                key = %notification.dedupe_key,
                dismiss_ms = notification.auto_dismiss.as_millis() as u64,
                "{}", notification.message
            ),
            NotificationLevel::Error => error!(
                key = %notification.dedupe_key,
                dismiss_ms = notification.auto_dismiss.as_millis() as u64,
                "{}", notification.message
            ),
        }
    }
}

/// Keeps every notification in memory until drained.
#[derive(Debug, Default)]
pub struct NotificationLog {
    entries: Mutex<Vec<Notification>>,
}

impl NotificationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of everything recorded so far, oldest first.
    pub fn snapshot(&self) -> Vec<Notification> {
        self.lock().clone()
    }

    /// Remove and return everything recorded so far.
    pub fn drain(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Notification>> {
        // A panicking writer cannot leave a Vec half-pushed.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Notifier for NotificationLog {
    fn notify(&self, notification: Notification) {
        self.lock().push(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Arc;

    #[test]
    fn test_error_keeps_message_and_key() {
        let n = Notification::error("Refresh failed", "refresh-failed");
        assert_eq!(n.level, NotificationLevel::Error);
        assert_eq!(n.message, "Refresh failed");
        assert_eq!(n.dedupe_key, "refresh-failed");
        assert_eq!(n.auto_dismiss, Duration::from_millis(DEFAULT_AUTO_DISMISS_MS));
    }

    /// Collects formatted log lines for inspection.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_tracing_notifier_logs_level_message_and_key() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer({
                let captured = captured.clone();
                move || captured.clone()
            })
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let sink: &dyn Notifier = &TracingNotifier;
            sink.notify(Notification::warn("Session expired", "session-expired"));
            sink.notify(Notification::error("Refresh failed", "refresh-failed"));
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("WARN"));
        assert!(lines[0].contains("Session expired"));
        assert!(lines[0].contains("key=session-expired"));
        assert!(lines[0].contains("dismiss_ms=5000"));
        assert!(lines[1].contains("ERROR"));
        assert!(lines[1].contains("Refresh failed"));
        assert!(lines[1].contains("key=refresh-failed"));
    }

    #[test]
    fn test_log_records_in_order_and_drains() {
        let log = NotificationLog::new();
        log.notify(Notification::warn("first", "a"));
        log.notify(Notification::error("second", "b"));

        assert_eq!(log.len(), 2);
        let entries = log.drain();
        assert_eq!(entries[0].message, "first");
        assert_eq!(entries[1].message, "second");
        assert!(log.is_empty());
    }
}
