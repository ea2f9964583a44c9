use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    websocket::{
        broadcaster::Broadcaster,
        connection::{Connection, Role},
        types::{ConnectionCountPayload, NotificationViewedPayload, WsMessage},
    },
};

use super::notification_models::{timestamp, Notification, Priority};

/// Owns the active notification table and the live connections of both roles.
///
/// Cloning is cheap and every clone shares the same state.
///
/// Table mutations and the bind-time sync run under `sync`, so a newly bound
/// connection sees each notification exactly once: either in its initial
/// sync or as a later broadcast. Deliveries are `try_send`, so the lock is
/// never held across an await.
#[derive(Clone)]
pub struct Registry {
    notifications: Arc<DashMap<Uuid, Notification>>,
    connections: Broadcaster,
    sync: Arc<Mutex<()>>,
    viewed_retention: Duration,
}

impl Registry {
    pub fn new(viewed_retention: Duration) -> Self {
        Self {
            notifications: Arc::new(DashMap::new()),
            connections: Broadcaster::new(),
            sync: Arc::new(Mutex::new(())),
            viewed_retention,
        }
    }

    pub fn connections(&self) -> &Broadcaster {
        &self.connections
    }

    pub fn connection_counts(&self) -> ConnectionCountPayload {
        self.connections.counts()
    }

    /// Register an accepted connection and bring it up to date.
    ///
    /// Monitors get the connection counts followed by every notification in the
    /// table; displays only get the pending ones. All monitors then receive the
    /// new counts.
    pub fn bind(&self, connection: Connection) {
        let _sync = self.sync.lock();
        self.connections.add(connection.clone());

        let synced = match connection.role() {
            Role::Monitor => self.send_monitor_snapshot(&connection),
            Role::Display => self.send_pending(&connection),
        };
        if !synced {
            debug!("Initial sync to {} {} failed", connection.role(), connection.id());
        }

        self.connections.broadcast_counts();
    }

    /// Drop a connection from its role's set. Safe to call for a connection
    /// that was already evicted.
    pub fn unbind(&self, connection: &Connection) -> bool {
        let _sync = self.sync.lock();
        let removed = self.connections.remove(connection.role(), &connection.id());
        if removed {
            self.connections.broadcast_counts();
        }
        removed
    }

    fn send_monitor_snapshot(&self, connection: &Connection) -> bool {
        let counts = WsMessage::ConnectionCount(self.connection_counts());
        if self.connections.send_to(connection, counts).is_err() {
            return false;
        }
        self.list().iter().all(|notification| {
            self.connections
                .send_to(connection, WsMessage::notification_sent(notification, true))
                .is_ok()
        })
    }

    fn send_pending(&self, connection: &Connection) -> bool {
        self.list()
            .iter()
            .filter(|notification| notification.is_pending())
            .all(|notification| {
                self.connections
                    .send_to(connection, WsMessage::new_notification(notification))
                    .is_ok()
            })
    }

    pub fn create(
        &self,
        subject_code: &str,
        priority: Priority,
        message: Option<String>,
    ) -> Result<Notification> {
        if subject_code.trim().is_empty() {
            return Err(AppError::Validation("subject_code must not be empty".into()));
        }

        let notification = Notification::new(subject_code.to_string(), priority, message);
        let _sync = self.sync.lock();
        self.notifications.insert(notification.id, notification.clone());
        info!(
            "Notification created: {} - {} ({})",
            notification.id, notification.subject_code, notification.priority
        );

        self.connections
            .broadcast(Role::Display, &WsMessage::new_notification(&notification));
        self.connections
            .broadcast(Role::Monitor, &WsMessage::notification_sent(&notification, false));

        Ok(notification)
    }

    /// Move a pending notification to viewed and schedule its removal.
    /// Returns false if the id is unknown or the notification is not pending.
    pub fn mark_viewed(&self, id: &Uuid) -> bool {
        let now = Utc::now();
        let _sync = self.sync.lock();
        {
            let Some(mut entry) = self.notifications.get_mut(id) else {
                return false;
            };
            if !entry.mark_viewed(now) {
                return false;
            }
        }
        info!("Notification marked as viewed: {}", id);

        self.connections.broadcast(
            Role::Monitor,
            &WsMessage::NotificationViewed(NotificationViewedPayload {
                notification_id: *id,
                viewed_at: timestamp(now),
            }),
        );
        self.connections
            .broadcast(Role::Display, &WsMessage::removed(*id));

        self.schedule_removal(*id);
        true
    }

    fn schedule_removal(&self, id: Uuid) {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!("Cannot schedule removal of notification {}: {}", id, e);
                return;
            }
        };

        let registry = self.clone();
        let delay = self.viewed_retention;
        handle.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if registry.remove(&id) {
                debug!("Scheduled removal of viewed notification {} done", id);
            } else {
                debug!("Viewed notification {} was already removed", id);
            }
        });
    }

    /// Delete a notification and tell monitors. Returns false if it was not
    /// in the table; nothing is broadcast in that case.
    pub fn remove(&self, id: &Uuid) -> bool {
        let _sync = self.sync.lock();
        if self.notifications.remove(id).is_none() {
            return false;
        }
        info!("Notification removed: {}", id);

        self.connections
            .broadcast(Role::Monitor, &WsMessage::removed(*id));
        true
    }

    /// Remove every notification at least `max_age` old. Records whose
    /// `created_at` does not parse are skipped. Returns how many were removed.
    pub fn sweep(&self, max_age: Duration) -> usize {
        let max_age = match chrono::Duration::from_std(max_age) {
            Ok(max_age) => max_age,
            Err(e) => {
                warn!("Sweep skipped, max age out of range: {}", e);
                return 0;
            }
        };
        let now = Utc::now();

        let expired: Vec<Uuid> = self
            .notifications
            .iter()
            .filter_map(|entry| match entry.created_at_utc() {
                Ok(created_at) => (now - created_at >= max_age).then_some(*entry.key()),
                Err(e) => {
                    warn!(
                        "Skipping notification {} with unparseable created_at {:?}: {}",
                        entry.key(),
                        entry.created_at,
                        e
                    );
                    None
                }
            })
            .collect();

        let removed = expired.iter().filter(|id| self.remove(id)).count();
        if removed > 0 {
            info!("Sweep removed {} expired notification(s)", removed);
        }
        removed
    }

    /// All notifications, oldest first.
    pub fn list(&self) -> Vec<Notification> {
        let mut notifications: Vec<Notification> = self
            .notifications
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        notifications.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        notifications
    }

    pub fn get(&self, id: &Uuid) -> Option<Notification> {
        self.notifications.get(id).map(|entry| entry.value().clone())
    }

    #[cfg(test)]
    pub(crate) fn insert_raw(&self, notification: Notification) {
        self.notifications.insert(notification.id, notification);
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}
