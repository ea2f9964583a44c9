use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::notification::notification_models::{Notification, NotificationStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    ConnectionCount(ConnectionCountPayload),
    NotificationSent(NotificationSentPayload),
    NewNotification(NewNotificationPayload),
    NotificationViewed(NotificationViewedPayload),
    NotificationRemoved(NotificationRemovedPayload),
    Pong,
    Error(ErrorPayload),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ConnectionCountPayload {
    pub monitors: usize,
    pub displays: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NotificationSentPayload {
    pub notification_id: Uuid,
    pub subject_code: String,
    pub status: NotificationStatus,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewed_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NewNotificationPayload {
    pub notification: Notification,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NotificationViewedPayload {
    pub notification_id: Uuid,
    pub viewed_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NotificationRemovedPayload {
    pub notification_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ErrorPayload {
    pub message: String,
}

impl WsMessage {
    /// Acknowledgement for monitors. The bind snapshot carries `viewed_at`,
    /// the live create event does not.
    pub fn notification_sent(notification: &Notification, with_viewed_at: bool) -> Self {
        WsMessage::NotificationSent(NotificationSentPayload {
            notification_id: notification.id,
            subject_code: notification.subject_code.clone(),
            status: notification.status,
            created_at: notification.created_at.clone(),
            viewed_at: if with_viewed_at {
                notification.viewed_at.clone()
            } else {
                None
            },
        })
    }

    pub fn new_notification(notification: &Notification) -> Self {
        WsMessage::NewNotification(NewNotificationPayload {
            notification: notification.clone(),
        })
    }

    pub fn removed(notification_id: Uuid) -> Self {
        WsMessage::NotificationRemoved(NotificationRemovedPayload { notification_id })
    }
}

// Client-to-server messages
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    MarkViewed { notification_id: Uuid },
    Ping,
}
