use crate::resolution::{Outcome, Request};
use crate::session::SessionMap;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// An opaque identity handle for an authenticated user.
///
/// The dispatcher only ever needs a display name for log lines; everything
/// else about the user belongs to the embedding application.
pub trait UserIdentity: Send + Sync {
    /// The user's name, as it should appear in log lines.
    fn username(&self) -> &str;
}

/// What to respond when a request carries a session cookie that the store
/// does not know, either because the session expired or because the cookie
/// value is garbage. The two cases are indistinguishable on purpose: a user
/// mid-session should not see a hard failure.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum ExpiredSessionPolicy {
    /// Clear the cookie and redirect to `/` with 303 See Other.
    #[default]
    RedirectToRoot,
    /// Clear the cookie and respond 403 Forbidden.
    Forbidden,
}

/// A route handler supplied by the [`Controller`].
#[async_trait]
pub trait Handler<User>: Send + Sync {
    /// Handle a request for the given path segments, on behalf of the
    /// authenticated user, if any. Early exits raised by guards travel out
    /// through the [`Outcome`].
    async fn handle(&self, req: &Request, segments: &[String], user: Option<&User>) -> Outcome;
}

#[async_trait]
impl<User, F> Handler<User> for F
where
    User: Sync,
    F: Fn(&Request, &[String], Option<&User>) -> Outcome + Send + Sync,
{
    async fn handle(&self, req: &Request, segments: &[String], user: Option<&User>) -> Outcome {
        self(req, segments, user)
    }
}

/// The capability set supplied by the embedding application.
///
/// The controller owns everything application-specific: the credential
/// check, the route table, and persistence of the session snapshot. The
/// dispatcher owns everything else.
#[async_trait]
pub trait Controller: Send + Sync + 'static {
    /// The user identity type produced by [`Controller::login`].
    type User: UserIdentity + Clone + Send + Sync + 'static;

    /// The address the transport should bind to, e.g. `"127.0.0.1:8080"`.
    /// Consumed by the transport, not by the dispatcher.
    fn bind_address(&self) -> String;

    /// The name of the session cookie.
    fn session_cookie_name(&self) -> String;

    /// How long an unrefreshed session stays valid.
    fn session_max_age(&self) -> Duration;

    /// The minimum staleness before a valid session's timestamp is bumped
    /// and persisted. Defaults to one hour.
    fn session_refresh_granularity(&self) -> Duration {
        Duration::from_secs(60 * 60)
    }

    /// How to respond to an unknown or expired session cookie.
    fn expired_session_policy(&self) -> ExpiredSessionPolicy {
        ExpiredSessionPolicy::default()
    }

    /// Check credentials, returning the user on success.
    /// The dispatcher never logs the password.
    async fn login(&self, username: &str, password: &str) -> Option<Self::User>;

    /// Look up the handler for the given path segments, or `None` if no
    /// route matches, which the dispatcher turns into a 404.
    fn handler_for(&self, segments: &[String]) -> Option<Arc<dyn Handler<Self::User>>>;

    /// Fired after every session store mutation, with the token that changed
    /// and the full current mapping. Intended for persisting snapshots.
    /// Runs under the store lock, so it must not call back into the store.
    fn sessions_changed(&self, token: &str, sessions: &SessionMap<Self::User>);

    /// Fired once at startup to seed the session store, e.g. from durable
    /// storage. Defaults to an empty mapping.
    fn load_initial_sessions(&self) -> anyhow::Result<SessionMap<Self::User>> {
        Ok(SessionMap::new())
    }
}
