mod webhook;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{NotificationChannelType, NotificationConfig};

/// Events published when a run reaches a terminal state.
#[derive(Debug, Clone)]
pub enum RunEvent {
    Completed {
        run_id: String,
        uploaded: usize,
        total: usize,
        target_address: String,
    },
    Failed {
        run_id: String,
        error: String,
    },
}

/// Trait for notification channel implementations.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn notify(&self, event: RunEvent) -> Result<()>;
}

/// Factory function to create a notifier based on config.
pub fn create_notifier(config: &NotificationConfig) -> Option<Arc<dyn NotificationChannel>> {
    match &config.channel {
        NotificationChannelType::None => None,
        NotificationChannelType::Webhook => {
            let url = config.webhook_url.as_ref()?;
            if url.is_empty() {
                return None;
            }
            Some(Arc::new(webhook::WebhookNotifier::new(url.clone())))
        }
    }
}
