// src/services/notification_service.rs
// Operator notifications. Delivery failures are logged, never raised.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::capabilities::{Notifier, Severity};

pub fn format_message(message: &str, severity: Severity) -> String {
    match severity {
        Severity::Success => format!("✅ {}", message),
        Severity::Error => format!("🚨 ERROR: {}", message),
        Severity::Warning => format!("⚠️ WARNING: {}", message),
        Severity::Info => format!("ℹ️ {}", message),
    }
}

#[derive(Clone, Default)]
pub struct NotificationService {
    notifier: Option<Arc<dyn Notifier>>,
}

impl NotificationService {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier: Some(notifier),
        }
    }

    /// Logs only.
    pub fn disabled() -> Self {
        Self { notifier: None }
    }

    pub async fn notify(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Error => error!("Notification: {}", message),
            Severity::Warning => warn!("Notification: {}", message),
            Severity::Info | Severity::Success => info!("Notification: {}", message),
        }

        let Some(notifier) = &self.notifier else {
            return;
        };
        if let Err(e) = notifier
            .send(&format_message(message, severity), severity)
            .await
        {
            warn!("Failed to deliver notification: {}", e);
        }
    }

    pub async fn info(&self, message: &str) {
        self.notify(message, Severity::Info).await
    }

    pub async fn success(&self, message: &str) {
        self.notify(message, Severity::Success).await
    }

    pub async fn warning(&self, message: &str) {
        self.notify(message, Severity::Warning).await
    }

    pub async fn error(&self, message: &str) {
        self.notify(message, Severity::Error).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CapabilityError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(String, Severity)>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for Recorder {
        async fn send(&self, message: &str, severity: Severity) -> Result<(), CapabilityError> {
            self.sent.lock().unwrap().push((message.to_string(), severity));
            if self.fail {
                return Err(CapabilityError::Unavailable("offline".to_string()));
            }
            Ok(())
        }
    }

    #[test]
    fn test_severity_prefixes() {
        assert_eq!(format_message("done", Severity::Success), "✅ done");
        assert_eq!(format_message("boom", Severity::Error), "🚨 ERROR: boom");
        assert_eq!(format_message("hmm", Severity::Warning), "⚠️ WARNING: hmm");
        assert_eq!(format_message("fyi", Severity::Info), "ℹ️ fyi");
    }

    #[tokio::test]
    async fn test_messages_are_prefixed_and_sent() {
        let recorder = Arc::new(Recorder::default());
        let service = NotificationService::new(recorder.clone());
        service.error("Posting failed").await;
        let sent = recorder.sent.lock().unwrap();
        assert_eq!(
            sent.as_slice(),
            &[("🚨 ERROR: Posting failed".to_string(), Severity::Error)]
        );
    }

    #[tokio::test]
    async fn test_delivery_failure_is_swallowed() {
        let recorder = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let service = NotificationService::new(recorder.clone());
        service.info("hello").await;
        assert_eq!(recorder.sent.lock().unwrap().len(), 1);

        NotificationService::disabled().warning("nobody listens").await;
    }
}
