use crate::controller::UserIdentity;
use crate::error::Error;
use crate::session::{Session, SessionMap};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use rand::{thread_rng, RngCore};
use std::fmt::{Debug, Formatter};
use std::sync::Mutex;
use std::time::Duration;

/// Session tokens are 24 random bytes, i.e. 32 characters in base64.
const SESSION_TOKEN_BYTES: usize = 24;

/// How often token generation retries on collision before giving up.
/// Collisions of 192-bit random tokens are birthday-bound negligible, so
/// exhausting this limit means the random source is broken.
const MAXIMUM_TOKEN_GENERATION_RETRIES: u32 = 16;

/// The expiry and refresh rules of a [`SessionStore`].
#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    /// Duration after which an unrefreshed session is treated as expired.
    pub max_age: Duration,
    /// Minimum staleness before a valid session's timestamp is bumped and
    /// the change callback fires. Defaults to one hour.
    pub refresh_granularity: Duration,
}

impl SessionPolicy {
    /// A policy with the given max-age and the default refresh granularity
    /// of one hour.
    pub fn new(max_age: Duration) -> Self {
        Self {
            max_age,
            refresh_granularity: Duration::from_secs(60 * 60),
        }
    }

    /// Override the refresh granularity.
    pub fn with_refresh_granularity(mut self, refresh_granularity: Duration) -> Self {
        self.refresh_granularity = refresh_granularity;
        self
    }
}

/// Fired after every store mutation, with the token that changed and the
/// full current mapping.
pub type SessionsChangedCallback<User> = Box<dyn Fn(&str, &SessionMap<User>) + Send + Sync>;

/// The result of a session lookup.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SessionLookup<User> {
    /// No live session for this token. It may never have existed, or it may
    /// just have expired; the two are indistinguishable on purpose.
    NotFound,
    /// A live session.
    Found {
        /// The user owning the session.
        user: User,
        /// True if the session's timestamp was bumped by this lookup, in
        /// which case the caller should re-issue the session cookie with a
        /// fresh max-age.
        refreshed: bool,
    },
}

/// The mutex-guarded mapping from opaque session token to session record.
///
/// The store owns token issuance, lazy expiry and sliding-window refresh.
/// Every operation takes the lock for its entire read-modify-write sequence,
/// so no caller ever observes a torn state; lock hold time is bounded by a
/// map operation plus a timestamp comparison. The change callback fires
/// under the lock after every mutation, with the mapping it may persist.
pub struct SessionStore<User> {
    sessions: Mutex<SessionMap<User>>,
    policy: SessionPolicy,
    on_change: SessionsChangedCallback<User>,
}

impl<User: UserIdentity + Clone> SessionStore<User> {
    /// Create an empty store with the given policy and change callback.
    pub fn new(policy: SessionPolicy, on_change: SessionsChangedCallback<User>) -> Self {
        Self {
            sessions: Mutex::new(SessionMap::new()),
            policy,
            on_change,
        }
    }

    /// Seed the store with a previously persisted snapshot.
    ///
    /// This replaces the current mapping without firing the change callback.
    /// It takes `&mut self`, so it can only run before the store is shared
    /// with concurrent callers.
    pub fn load_snapshot(&mut self, snapshot: SessionMap<User>) {
        *self.sessions.get_mut().expect("session store lock poisoned") = snapshot;
    }

    /// Issue a fresh session for `user`, returning its token.
    ///
    /// The token is generated from a cryptographically secure random source
    /// and retried until it does not collide with a live token. Exhausting
    /// the retry limit indicates a broken random source and is returned as a
    /// fatal [`Error`], not handled per-request.
    pub fn issue(&self, user: User) -> Result<String, Error> {
        let mut sessions = self.lock();

        let mut token = None;
        for _ in 0..MAXIMUM_TOKEN_GENERATION_RETRIES {
            let candidate = generate_token(&mut thread_rng());
            if !sessions.contains_key(&candidate) {
                token = Some(candidate);
                break;
            }
        }
        let token = token.ok_or(Error::TokenGenerationRetriesExhausted {
            maximum: MAXIMUM_TOKEN_GENERATION_RETRIES,
        })?;

        sessions.insert(token.clone(), Session::new(user, Utc::now()));
        (self.on_change)(&token, &sessions);
        Ok(token)
    }

    /// Look up the session for `token`, applying expiry and refresh rules.
    ///
    /// An expired session is deleted permanently. A stale-but-valid session
    /// has its timestamp bumped and the change callback fired, and the
    /// caller is told to re-issue the cookie. An entry holding an invalid
    /// user is a store-corruption invariant violation: it is logged at error
    /// severity, purged, and reported as not found.
    pub fn lookup(&self, token: &str) -> SessionLookup<User> {
        enum Decision<User> {
            Missing,
            Corrupted,
            Expired(String),
            Refresh(User),
            Fresh(User),
        }

        let mut sessions = self.lock();
        let now = Utc::now();

        let decision = match sessions.get(token) {
            None => Decision::Missing,
            Some(session) if session.user.username().is_empty() => Decision::Corrupted,
            Some(session) if session.staleness(now) > self.policy.max_age => {
                Decision::Expired(session.user.username().to_owned())
            }
            Some(session) if session.staleness(now) > self.policy.refresh_granularity => {
                Decision::Refresh(session.user.clone())
            }
            Some(session) => Decision::Fresh(session.user.clone()),
        };

        match decision {
            Decision::Missing => {
                log::warn!("Requested session not found");
                SessionLookup::NotFound
            }
            Decision::Corrupted => {
                log::error!("session store held an entry with an invalid user: {token}");
                sessions.remove(token);
                (self.on_change)(token, &sessions);
                SessionLookup::NotFound
            }
            Decision::Expired(username) => {
                log::info!("Session expired '{username}'");
                sessions.remove(token);
                (self.on_change)(token, &sessions);
                SessionLookup::NotFound
            }
            Decision::Refresh(user) => {
                if let Some(session) = sessions.get_mut(token) {
                    session.last_refresh = now;
                }
                (self.on_change)(token, &sessions);
                SessionLookup::Found {
                    user,
                    refreshed: true,
                }
            }
            Decision::Fresh(user) => SessionLookup::Found {
                user,
                refreshed: false,
            },
        }
    }

    /// Delete the session for `token`.
    ///
    /// Revoking an unknown token is a no-op and does not fire the change
    /// callback.
    pub fn revoke(&self, token: &str) {
        let mut sessions = self.lock();
        if sessions.remove(token).is_some() {
            (self.on_change)(token, &sessions);
        }
    }

    /// The number of live entries, including not-yet-collected expired ones.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionMap<User>> {
        self.sessions.lock().expect("session store lock poisoned")
    }
}

impl<User> Debug for SessionStore<User> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

fn generate_token(rng: &mut impl RngCore) -> String {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    rng.fill_bytes(&mut bytes);
    BASE64.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_32_base64_characters() {
        let token = generate_token(&mut thread_rng());
        assert_eq!(token.len(), 32);
        assert!(token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/'));
    }

    #[test]
    fn tokens_are_distinct() {
        let mut rng = thread_rng();
        let a = generate_token(&mut rng);
        let b = generate_token(&mut rng);
        assert_ne!(a, b);
    }
}
