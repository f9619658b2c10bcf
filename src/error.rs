use crate::resolution::{Abort, Resolution};
use http::StatusCode;

/// All errors that can occur in this crate.
///
/// Request-level failures are not errors: they travel as
/// [`Abort`](crate::Abort) values carrying the resolution to respond with.
/// This type covers the conditions that are not part of normal request
/// handling.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Generating a fresh session token kept colliding with live tokens
    /// until the retry limit was reached. With 192-bit random tokens this
    /// indicates a broken random source rather than bad luck.
    #[error("the maximum number of retries to generate a session token was reached ({maximum})")]
    TokenGenerationRetriesExhausted {
        /// The retry limit that was reached.
        maximum: u32,
    },

    /// The controller failed to load the initial session snapshot.
    #[error("loading the initial session snapshot failed: {0}")]
    LoadInitialSessions(#[source] anyhow::Error),
}

impl From<Error> for Abort {
    fn from(error: Error) -> Self {
        log::error!("{error}");
        Resolution::error_with_message(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
            .into()
    }
}
