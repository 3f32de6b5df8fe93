//! Subprotocol negotiation.
//!
//! The server's priority order wins: the first supported descriptor whose
//! name appears anywhere in the client's offer is selected. The order of the
//! offer is irrelevant. A miss is not an error; callers fall back to the
//! configured default.

use crate::subprotocol::SubprotocolRef;

/// Pick the highest-priority supported descriptor the client offered.
#[must_use]
pub fn negotiate<'a, S: AsRef<str>>(offered: &[S], supported: &'a [SubprotocolRef]) -> Option<&'a SubprotocolRef> {
    if offered.is_empty() {
        return None;
    }
    supported
        .iter()
        .find(|descriptor| offered.iter().any(|name| name.as_ref() == descriptor.name()))
}

/// Descriptor a connection will speak, and whether it came from negotiation.
#[derive(Debug, Clone)]
pub struct Selection {
    pub descriptor: SubprotocolRef,
    /// `false` when the configured default was substituted.
    pub negotiated: bool,
}

impl Selection {
    /// Name to advertise in the upgrade response. `None` for the default,
    /// since the client never asked for it.
    #[must_use]
    pub fn header_value(&self) -> Option<&str> {
        self.negotiated.then(|| self.descriptor.name())
    }
}

/// Negotiate, substituting `default` on a miss.
#[must_use]
pub fn resolve<S: AsRef<str>>(offered: &[S], supported: &[SubprotocolRef], default: &SubprotocolRef) -> Selection {
    match negotiate(offered, supported) {
        Some(descriptor) => Selection { descriptor: descriptor.clone(), negotiated: true },
        None => Selection { descriptor: default.clone(), negotiated: false },
    }
}

/// Split `Sec-WebSocket-Protocol` header values into individual names.
///
/// Values may repeat the header or comma-separate names; blanks are dropped.
pub fn parse_offered<'a, I>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    values
        .into_iter()
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
#[path = "negotiate_test.rs"]
mod tests;
