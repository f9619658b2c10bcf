use crate::controller::{Controller, ExpiredSessionPolicy, UserIdentity};
use crate::error::Error;
use crate::message::Message;
use crate::resolution::{Abort, Outcome, Request, Resolution, Response};
use crate::session_store::{SessionLookup, SessionPolicy, SessionStore, SessionsChangedCallback};
use crate::url::{split_url_path, url_parts_match};
use cookie::time::Duration as CookieDuration;
use cookie::Cookie;
use http::header::{HeaderValue, COOKIE, SET_COOKIE};
use http::{Method, StatusCode};
use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// The per-request orchestrator.
///
/// A dispatcher sits between the HTTP transport and the
/// [`Controller`]'s route handlers. For every request it parses the URL,
/// resolves the session cookie against the [`SessionStore`], routes the two
/// built-in session-lifecycle endpoints (`POST /sign-in`,
/// `POST /u/sign-out`), hands everything else to the controller, and finally
/// writes the produced [`Resolution`] as the response and as one combined
/// log line. Every request gets exactly one response and exactly one line.
pub struct Dispatcher<C: Controller> {
    controller: Arc<C>,
    store: SessionStore<C::User>,
}

impl<C: Controller> Dispatcher<C> {
    /// Create a dispatcher around the given controller, seeding the session
    /// store from [`Controller::load_initial_sessions`].
    pub fn new(controller: Arc<C>) -> Result<Self, Error> {
        let policy = SessionPolicy::new(controller.session_max_age())
            .with_refresh_granularity(controller.session_refresh_granularity());
        let on_change: SessionsChangedCallback<C::User> = {
            let controller = Arc::clone(&controller);
            Box::new(move |token, sessions| controller.sessions_changed(token, sessions))
        };

        let mut store = SessionStore::new(policy, on_change);
        let snapshot = controller
            .load_initial_sessions()
            .map_err(Error::LoadInitialSessions)?;
        store.load_snapshot(snapshot);

        Ok(Self { controller, store })
    }

    /// The session store owned by this dispatcher.
    pub fn session_store(&self) -> &SessionStore<C::User> {
        &self.store
    }

    /// Handle one request.
    ///
    /// This is the single recovery point for the [`Abort`] early-exit
    /// mechanism: whatever path produced the resolution, the response is
    /// written, pending cookie mutations are applied, and the combined
    /// request/response log line is emitted. Unmodeled failures (panics) are
    /// not caught here; they belong to the transport's task boundary.
    pub async fn dispatch(&self, req: Request, remote_addr: SocketAddr) -> Response {
        let mut cookies = Vec::new();

        let mut resolution = match self.handle_request(&req, &mut cookies).await {
            Ok(resolution) => resolution,
            Err(abort) => abort.into_resolution(),
        };

        let mut response = resolution.write_response(&req);
        for cookie in cookies {
            if let Ok(value) = HeaderValue::from_str(&cookie.to_string()) {
                response.headers_mut().append(SET_COOKIE, value);
            }
        }

        Message::chain([
            Message::event(format!(
                "[{remote_addr}] {} {} {}",
                req.method(),
                req.uri().path(),
                req.uri().query().unwrap_or(""),
            )),
            resolution.log_message(),
        ])
        .emit();

        response
    }

    async fn handle_request(
        &self,
        req: &Request,
        cookies: &mut Vec<Cookie<'static>>,
    ) -> Outcome {
        let Some(segments) = split_url_path(req.uri().path()) else {
            return Ok(Resolution::error(StatusCode::BAD_REQUEST));
        };

        let (user, token) = self.open_session(req, cookies)?;

        if segments[0] == "u" {
            // User-specific pages. The sign-out check must stay behind the
            // authentication check, so an unauthenticated caller sees 403
            // before any routing happens.
            let Some(user) = &user else {
                return Ok(Resolution::error(StatusCode::FORBIDDEN));
            };
            if url_parts_match(&segments, &["u", "sign-out"]) {
                return Ok(self.sign_out(req, cookies, user, token.as_deref().unwrap_or("")));
            }
        } else if url_parts_match(&segments, &["sign-in"]) {
            return self.sign_in(req, cookies).await;
        }

        if let Some(handler) = self.controller.handler_for(&segments) {
            return handler.handle(req, &segments, user.as_ref()).await;
        }

        Ok(Resolution::error(StatusCode::NOT_FOUND))
    }

    /// Resolve the session cookie, if any.
    ///
    /// A cookie the store does not recognize short-circuits the request per
    /// the controller's [`ExpiredSessionPolicy`], clearing the cookie on the
    /// way out. A refreshed session re-issues the cookie with a fresh
    /// max-age.
    fn open_session(
        &self,
        req: &Request,
        cookies: &mut Vec<Cookie<'static>>,
    ) -> Result<(Option<C::User>, Option<String>), Abort> {
        let name = self.controller.session_cookie_name();
        let Some(token) = request_cookie(req, &name) else {
            return Ok((None, None));
        };
        if token.is_empty() {
            return Ok((None, None));
        }

        match self.store.lookup(&token) {
            SessionLookup::Found { user, refreshed } => {
                if refreshed {
                    cookies.push(session_cookie(
                        name,
                        token.clone(),
                        self.controller.session_max_age(),
                    ));
                }
                Ok((Some(user), Some(token)))
            }
            SessionLookup::NotFound => {
                cookies.push(removal_cookie(name));
                match self.controller.expired_session_policy() {
                    ExpiredSessionPolicy::RedirectToRoot => {
                        Err(Resolution::redirect(StatusCode::SEE_OTHER, "/").into())
                    }
                    ExpiredSessionPolicy::Forbidden => {
                        Err(Resolution::error(StatusCode::FORBIDDEN).into())
                    }
                }
            }
        }
    }

    async fn sign_in(&self, req: &Request, cookies: &mut Vec<Cookie<'static>>) -> Outcome {
        if req.method() != Method::POST {
            return Ok(Resolution::method_not_allowed("POST"));
        }

        let (username, password) = sign_in_form(req.body());
        if !username.is_empty() {
            if let Some(user) = self.controller.login(&username, &password).await {
                let token = self.store.issue(user)?;
                log::info!("Sign-in '{username}'");

                cookies.push(session_cookie(
                    self.controller.session_cookie_name(),
                    token,
                    self.controller.session_max_age(),
                ));
                return Ok(Resolution::redirect(StatusCode::SEE_OTHER, "/u/"));
            }
        }

        Ok(Resolution::error_with_message(
            StatusCode::FORBIDDEN,
            format!("Invalid sign-in '{username}'"),
        ))
    }

    fn sign_out(
        &self,
        req: &Request,
        cookies: &mut Vec<Cookie<'static>>,
        user: &C::User,
        token: &str,
    ) -> Resolution {
        if req.method() != Method::POST {
            return Resolution::method_not_allowed("POST");
        }

        self.store.revoke(token);
        log::info!("Sign-out '{}'", user.username());

        cookies.push(removal_cookie(self.controller.session_cookie_name()));
        Resolution::redirect(StatusCode::SEE_OTHER, "/")
    }
}

impl<C: Controller> Debug for Dispatcher<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

/// Extract the value of the named cookie from the request, if present.
fn request_cookie(req: &Request, name: &str) -> Option<String> {
    for header in req.headers().get_all(COOKIE) {
        let Ok(header) = header.to_str() else {
            continue;
        };
        for cookie in Cookie::split_parse(header.to_owned()).flatten() {
            if cookie.name() == name {
                return Some(cookie.value().to_owned());
            }
        }
    }
    None
}

fn session_cookie(name: String, token: String, max_age: Duration) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, token);
    cookie.set_path("/");
    cookie.set_max_age(CookieDuration::seconds(max_age.as_secs() as i64));
    cookie
}

/// A cookie that immediately expires on the client, clearing the session.
fn removal_cookie(name: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, "");
    cookie.set_path("/");
    cookie.set_max_age(CookieDuration::ZERO);
    cookie
}

fn sign_in_form(body: &[u8]) -> (String, String) {
    let mut username = String::new();
    let mut password = String::new();
    for (key, value) in form_urlencoded::parse(body) {
        match key.as_ref() {
            "user" => username = value.into_owned(),
            "password" => password = value.into_owned(),
            _ => {}
        }
    }
    (username, password)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_in_form_extracts_user_and_password() {
        let (user, password) = sign_in_form(b"user=alice&password=p%26w");
        assert_eq!(user, "alice");
        assert_eq!(password, "p&w");

        let (user, password) = sign_in_form(b"unrelated=1");
        assert!(user.is_empty());
        assert!(password.is_empty());
    }

    #[test]
    fn request_cookie_finds_the_named_cookie() {
        let req: Request = http::Request::builder()
            .uri("/")
            .header(COOKIE, "other=1; id=abc123")
            .body(Vec::new())
            .unwrap();
        assert_eq!(request_cookie(&req, "id").as_deref(), Some("abc123"));
        assert_eq!(request_cookie(&req, "missing"), None);
    }

    #[test]
    fn removal_cookie_expires_immediately() {
        let cookie = removal_cookie("id".to_owned());
        let rendered = cookie.to_string();
        assert!(rendered.contains("Max-Age=0"), "{rendered}");
        assert!(rendered.contains("Path=/"), "{rendered}");
    }
}
