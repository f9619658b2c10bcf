use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One authenticated browser session.
///
/// Sessions are owned exclusively by the
/// [`SessionStore`](crate::SessionStore); the dispatcher only ever borrows
/// read access for the duration of one request. The record is serializable so
/// that the [`Controller`](crate::Controller) can persist session snapshots
/// across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session<User> {
    /// The identity supplied by the controller's credential check.
    /// Immutable for the life of the session.
    pub user: User,
    /// When this session was created or last refreshed. Bumped only when the
    /// staleness exceeds the refresh granularity, which bounds write
    /// amplification on busy sessions.
    pub last_refresh: DateTime<Utc>,
}

impl<User> Session<User> {
    /// Create a session record refreshed at `now`.
    pub fn new(user: User, now: DateTime<Utc>) -> Self {
        Self {
            user,
            last_refresh: now,
        }
    }

    /// The time elapsed since the last refresh, saturating at zero for
    /// timestamps in the future.
    pub fn staleness(&self, now: DateTime<Utc>) -> std::time::Duration {
        now.signed_duration_since(self.last_refresh)
            .to_std()
            .unwrap_or_default()
    }
}

/// The mapping from opaque session token to session record.
///
/// This is the shape handed to
/// [`Controller::sessions_changed`](crate::Controller::sessions_changed) after
/// every mutation, and accepted back by
/// [`SessionStore::load_snapshot`](crate::SessionStore::load_snapshot) at
/// startup.
pub type SessionMap<User> = HashMap<String, Session<User>>;
