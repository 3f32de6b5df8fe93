//! Hub and host configuration parsed from environment variables.
//!
//! Everything is also constructible in code; the env layer only maps names
//! onto the built-in descriptors in [`crate::subprotocol`].

use crate::subprotocol::{self, SubprotocolRef, TEXT_SUBPROTOCOL};

pub const DEFAULT_SUBPROTOCOLS: &str = "wshub.json,wshub.text";
pub const DEFAULT_FALLBACK_SUBPROTOCOL: &str = TEXT_SUBPROTOCOL;
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1024 * 1024;
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_WS_PATH: &str = "/ws";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown subprotocol: {0}")]
    UnknownSubprotocol(String),
    #[error("subprotocol listed twice: {0}")]
    DuplicateSubprotocol(String),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

// =============================================================================
// HUB CONFIG
// =============================================================================

/// Negotiation and reassembly settings shared by every connection.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Supported descriptors, highest priority first.
    pub supported: Vec<SubprotocolRef>,
    /// Used when negotiation finds no match.
    pub default: SubprotocolRef,
    /// Reassembly cap; `None` disables it.
    pub max_message_bytes: Option<usize>,
}

impl HubConfig {
    /// Build a config, rejecting duplicate names in `supported`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateSubprotocol`] on a repeated name.
    pub fn new(supported: Vec<SubprotocolRef>, default: SubprotocolRef) -> Result<Self, ConfigError> {
        for (i, descriptor) in supported.iter().enumerate() {
            if supported[..i].iter().any(|d| d.name() == descriptor.name()) {
                return Err(ConfigError::DuplicateSubprotocol(descriptor.name().to_owned()));
            }
        }
        Ok(Self { supported, default, max_message_bytes: Some(DEFAULT_MAX_MESSAGE_BYTES) })
    }

    #[must_use]
    pub fn with_max_message_bytes(mut self, limit: Option<usize>) -> Self {
        self.max_message_bytes = limit;
        self
    }

    /// Build from environment variables.
    ///
    /// Optional:
    /// - `WS_SUBPROTOCOLS`: comma-separated priority list (default `wshub.json,wshub.text`)
    /// - `WS_DEFAULT_SUBPROTOCOL`: fallback descriptor (default `wshub.text`)
    /// - `WS_MAX_MESSAGE_BYTES`: reassembly cap, `0` disables (default 1 MiB)
    ///
    /// # Errors
    ///
    /// Returns an error for unknown or duplicate names and unparsable sizes.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let list = lookup("WS_SUBPROTOCOLS").unwrap_or_else(|| DEFAULT_SUBPROTOCOLS.to_owned());
        let supported = list
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(resolve_builtin)
            .collect::<Result<Vec<_>, _>>()?;

        let default_name =
            lookup("WS_DEFAULT_SUBPROTOCOL").unwrap_or_else(|| DEFAULT_FALLBACK_SUBPROTOCOL.to_owned());
        let default = resolve_builtin(default_name.trim())?;

        let max_message_bytes = match lookup("WS_MAX_MESSAGE_BYTES") {
            None => Some(DEFAULT_MAX_MESSAGE_BYTES),
            Some(raw) => match parse_value::<usize>("WS_MAX_MESSAGE_BYTES", &raw)? {
                0 => None,
                n => Some(n),
            },
        };

        Ok(Self::new(supported, default)?.with_max_message_bytes(max_message_bytes))
    }
}

fn resolve_builtin(name: &str) -> Result<SubprotocolRef, ConfigError> {
    subprotocol::builtin(name).ok_or_else(|| ConfigError::UnknownSubprotocol(name.to_owned()))
}

// =============================================================================
// SERVER CONFIG
// =============================================================================

/// Which handler the host installs on every connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerMode {
    /// Reply to the sender only.
    Echo,
    /// Relay to every other connection.
    Broadcast,
}

/// Settings for the bundled HTTP host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub ws_path: String,
    pub handler: HandlerMode,
}

impl ServerConfig {
    /// Build from environment variables.
    ///
    /// Optional:
    /// - `PORT`: listen port (default 3000)
    /// - `WS_PATH`: websocket route (default `/ws`)
    /// - `WS_HANDLER`: `echo` (default) or `broadcast`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for malformed values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = match lookup("PORT") {
            Some(raw) => parse_value("PORT", &raw)?,
            None => DEFAULT_PORT,
        };

        let ws_path = lookup("WS_PATH").unwrap_or_else(|| DEFAULT_WS_PATH.to_owned());
        if !ws_path.starts_with('/') {
            return Err(ConfigError::InvalidValue { key: "WS_PATH", value: ws_path });
        }

        let handler = match lookup("WS_HANDLER").as_deref() {
            None | Some("echo") => HandlerMode::Echo,
            Some("broadcast") => HandlerMode::Broadcast,
            Some(other) => return Err(ConfigError::InvalidValue { key: "WS_HANDLER", value: other.to_owned() }),
        };

        Ok(Self { port, ws_path, handler })
    }
}

fn parse_value<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue { key, value: raw.to_owned() })
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
