//! Notification types for the outbound message channels.

use serde::{Deserialize, Serialize};

/// Notification type categories.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Signal,
    Alert,
    Urgent,
    Info,
}

impl NotificationType {
    pub fn as_str(&self) -> &str {
        match self {
            NotificationType::Signal => "signal",
            NotificationType::Alert => "alert",
            NotificationType::Urgent => "urgent",
            NotificationType::Info => "info",
        }
    }
}

/// A message ready for delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    /// Short title
    pub title: String,
    /// Markdown body
    pub message: String,
    /// Timestamp in milliseconds
    pub timestamp: i64,
}

impl Notification {
    pub fn new(
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            notification_type,
            title: title.into(),
            message: message.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}
