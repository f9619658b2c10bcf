use std::fmt::{Display, Formatter};

/// The severity of a log [`Message`].
///
/// Severities are ordered, so that chaining messages can pick the most severe
/// one for the combined line. `Event` marks the request-summary messages
/// emitted once per dispatched request.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Severity {
    /// Diagnostic detail, e.g. the byte size of a response.
    Debug,
    /// A request summary.
    Event,
    /// A notable state change, e.g. a successful sign-in.
    Info,
    /// A rejected but well-understood request, e.g. a 4xx outcome.
    Warning,
    /// A failure that requires attention, e.g. a 5xx outcome.
    Error,
}

impl Severity {
    fn tag(&self) -> &'static str {
        match self {
            Severity::Debug => "",
            Severity::Event => "EVENT: ",
            Severity::Info => "INFO: ",
            Severity::Warning => "WARNING: ",
            Severity::Error => "ERROR: ",
        }
    }

    fn level(&self) -> log::Level {
        match self {
            Severity::Debug => log::Level::Debug,
            Severity::Event | Severity::Info => log::Level::Info,
            Severity::Warning => log::Level::Warn,
            Severity::Error => log::Level::Error,
        }
    }
}

/// A single log line, or a fragment of one.
///
/// The dispatcher describes every request with exactly one chained message:
/// a request summary joined with the summary of the produced
/// [`Resolution`](crate::Resolution). The console sink is external to this
/// crate; messages are handed off through the [`log`] facade.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Message {
    severity: Severity,
    text: String,
}

impl Message {
    /// Create a debug-severity message.
    pub fn debug(text: impl Into<String>) -> Self {
        Self::new(Severity::Debug, text)
    }

    /// Create an event-severity message.
    pub fn event(text: impl Into<String>) -> Self {
        Self::new(Severity::Event, text)
    }

    /// Create an info-severity message.
    pub fn info(text: impl Into<String>) -> Self {
        Self::new(Severity::Info, text)
    }

    /// Create a warning-severity message.
    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(Severity::Warning, text)
    }

    /// Create an error-severity message.
    pub fn error(text: impl Into<String>) -> Self {
        Self::new(Severity::Error, text)
    }

    fn new(severity: Severity, text: impl Into<String>) -> Self {
        Self {
            severity,
            text: text.into(),
        }
    }

    /// The severity of this message.
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// The text of this message, without the severity tag.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Join multiple messages into one line, separated by `" -> "`.
    /// The combined message takes the highest severity of its parts.
    pub fn chain(messages: impl IntoIterator<Item = Message>) -> Self {
        let mut severity = Severity::Debug;
        let mut line = String::new();
        for message in messages {
            if !line.is_empty() {
                line.push_str(" -> ");
            }
            line.push_str(&message.to_string());
            severity = severity.max(message.severity);
        }
        if line.is_empty() {
            return Self::error("empty message chain");
        }
        Self {
            severity,
            text: line,
        }
    }

    /// Write this message to the [`log`] facade.
    pub fn emit(&self) {
        log::log!(self.severity.level(), "{}", self.text);
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.severity.tag(), self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_joins_with_arrow() {
        let combined = Message::chain([
            Message::event("[1.2.3.4] GET /u/"),
            Message::debug("21 bytes"),
        ]);
        assert_eq!(combined.text(), "EVENT: [1.2.3.4] GET /u/ -> 21 bytes");
    }

    #[test]
    fn chain_takes_highest_severity() {
        let combined = Message::chain([
            Message::event("[1.2.3.4] POST /sign-in"),
            Message::warning("403 Forbidden"),
        ]);
        assert_eq!(combined.severity(), Severity::Warning);

        let combined = Message::chain([Message::debug("a"), Message::debug("b")]);
        assert_eq!(combined.severity(), Severity::Debug);
    }

    #[test]
    fn chain_of_one_is_that_message() {
        let combined = Message::chain([Message::info("Sign-in 'alice'")]);
        assert_eq!(combined, Message::info("INFO: Sign-in 'alice'"));
    }

    #[test]
    fn empty_chain_degrades_to_an_error_message() {
        let combined = Message::chain([]);
        assert_eq!(combined.severity(), Severity::Error);
    }
}
