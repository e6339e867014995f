//! Session cookie parsing.

use std::time::{Duration, Instant};

/// Session cookie issued by the device in `Set-Cookie`.
///
/// Devices send `TP_SESSIONID=<id>;TIMEOUT=<seconds>`. Only the leading
/// `name=value` pair is echoed back in `Cookie`.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCookie {
    /// `name=value` pair to send back.
    pub value: String,
    /// Lifetime from the `TIMEOUT` attribute, if present.
    pub ttl: Option<Duration>,
}

impl SessionCookie {
    /// Parses a `Set-Cookie` header value. Returns `None` when the leading
    /// pair is missing or has no name.
    pub fn parse(header: &str) -> Option<Self> {
        let mut parts = header.split(';');
        let value = parts.next()?.trim();
        let (name, _) = value.split_once('=')?;
        if name.trim().is_empty() {
            return None;
        }

        let ttl = parts.find_map(|attr| {
            let (key, secs) = attr.split_once('=')?;
            if !key.trim().eq_ignore_ascii_case("TIMEOUT") {
                return None;
            }
            secs.trim().parse::<u64>().ok().map(Duration::from_secs)
        });

        Some(Self {
            value: value.to_string(),
            ttl,
        })
    }

    /// When the cookie lapses, counted from `now`. `None` when there is no
    /// `TIMEOUT` or it lies beyond what the clock can represent.
    pub fn expires_at(&self, now: Instant) -> Option<Instant> {
        self.ttl.and_then(|ttl| now.checked_add(ttl))
    }
}

impl std::fmt::Debug for SessionCookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCookie")
            .field("value", &"[REDACTED]")
            .field("ttl", &self.ttl)
            .finish()
    }
}
