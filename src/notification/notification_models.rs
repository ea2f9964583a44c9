use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    #[serde(alias = "urgente")]
    Urgent,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Normal => write!(f, "normal"),
            Priority::Urgent => write!(f, "urgent"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    #[default]
    Pending,
    Viewed,
    Expired,
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationStatus::Pending => write!(f, "pending"),
            NotificationStatus::Viewed => write!(f, "viewed"),
            NotificationStatus::Expired => write!(f, "expired"),
        }
    }
}

/// A notification held in the relay's in-memory table.
///
/// Timestamps are kept as RFC 3339 text, which is also what goes over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Notification {
    pub id: Uuid,
    pub subject_code: String,
    pub priority: Priority,
    pub status: NotificationStatus,
    pub created_at: String,
    pub viewed_at: Option<String>,
    pub message: Option<String>,
}

impl Notification {
    pub fn new(subject_code: String, priority: Priority, message: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject_code,
            priority,
            status: NotificationStatus::Pending,
            created_at: timestamp(Utc::now()),
            viewed_at: None,
            message,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == NotificationStatus::Pending
    }

    /// Applies the pending -> viewed transition. Returns false if the
    /// notification had already left the pending state.
    pub fn mark_viewed(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.status = NotificationStatus::Viewed;
        self.viewed_at = Some(timestamp(now));
        true
    }

    pub fn created_at_utc(&self) -> Result<DateTime<Utc>, chrono::ParseError> {
        DateTime::parse_from_rfc3339(&self.created_at).map(|dt| dt.with_timezone(&Utc))
    }
}

pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
