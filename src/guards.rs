//! Route guards available to handlers.
//!
//! Each guard either passes or raises an [`Abort`] carrying the error
//! resolution to respond with, so handlers can chain them with `?`.

use crate::resolution::{Abort, Request, Resolution};
use http::header::CONTENT_LENGTH;
use http::StatusCode;

/// Require an authenticated user, aborting with 403 Forbidden otherwise.
pub fn require_user<User>(user: Option<&User>) -> Result<&User, Abort> {
    user.ok_or_else(|| Resolution::error(StatusCode::FORBIDDEN).into())
}

/// Require the request body to be empty, aborting with 413 otherwise.
pub fn require_empty_body(req: &Request) -> Result<(), Abort> {
    if req.body().is_empty() {
        Ok(())
    } else {
        Err(Resolution::error_with_message(
            StatusCode::PAYLOAD_TOO_LARGE,
            "Content must be empty",
        )
        .into())
    }
}

/// Return the request body, requiring a declared `Content-Length` of at most
/// `max` bytes. Aborts with 411 when the length is not declared and 413 when
/// it exceeds the limit.
pub fn read_body_up_to(req: &Request, max: usize) -> Result<&[u8], Abort> {
    let declared = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());

    match declared {
        None => Err(Resolution::error_with_message(
            StatusCode::LENGTH_REQUIRED,
            "Content length required",
        )
        .into()),
        Some(length) if length > max => Err(Resolution::error_with_message(
            StatusCode::PAYLOAD_TOO_LARGE,
            "Content too large",
        )
        .into()),
        Some(length) if length != req.body().len() => Err(Resolution::error_with_message(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!(
                "Reading payload failed ({} bytes < {} bytes)",
                req.body().len(),
                length
            ),
        )
        .into()),
        Some(_) => Ok(req.body()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(body: &[u8], content_length: Option<usize>) -> Request {
        let mut builder = http::Request::builder().method(http::Method::POST).uri("/");
        if let Some(length) = content_length {
            builder = builder.header(CONTENT_LENGTH, length);
        }
        builder.body(body.to_vec()).unwrap()
    }

    #[test]
    fn require_user_aborts_with_forbidden() {
        let user: Option<&&str> = None;
        let abort = require_user(user).unwrap_err();
        assert_eq!(abort.resolution().status_code(), StatusCode::FORBIDDEN);

        assert_eq!(require_user(Some(&"alice")).unwrap(), &"alice");
    }

    #[test]
    fn require_empty_body_rejects_content() {
        assert!(require_empty_body(&post(b"", None)).is_ok());
        let abort = require_empty_body(&post(b"data", Some(4))).unwrap_err();
        assert_eq!(abort.resolution().status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn read_body_up_to_requires_declared_length() {
        let abort = read_body_up_to(&post(b"data", None), 16).unwrap_err();
        assert_eq!(abort.resolution().status_code(), StatusCode::LENGTH_REQUIRED);
    }

    #[test]
    fn read_body_up_to_enforces_the_limit() {
        let abort = read_body_up_to(&post(b"0123456789", Some(10)), 4).unwrap_err();
        assert_eq!(abort.resolution().status_code(), StatusCode::PAYLOAD_TOO_LARGE);

        let req = post(b"0123", Some(4));
        let body = read_body_up_to(&req, 4).unwrap();
        assert_eq!(body, b"0123");
    }

    #[test]
    fn read_body_up_to_rejects_truncated_bodies() {
        let abort = read_body_up_to(&post(b"01", Some(4)), 16).unwrap_err();
        assert_eq!(abort.resolution().status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
