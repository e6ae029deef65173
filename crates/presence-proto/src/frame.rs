//! Client and server frames.
//!
//! Both directions use internally tagged JSON objects:
//!
//! ```text
//! client → server   {"type":"register","token":"<jwt>"}
//!                   {"type":"heartbeat"}
//! server → client   {"type":"registered","principal":"alice"}
//!                   {"type":"users-status","users":[...]}
//!                   {"type":"error","code":"authentication_rejected","message":"..."}
//! ```

use serde::{Deserialize, Serialize};

use crate::entry::PresenceEntry;
use crate::error::{ProtocolError, Result};

/// Maximum accepted size of an inbound frame, in bytes.
///
/// Client frames are tiny (a bearer token at most), so anything larger is
/// either a bug or abuse.
pub const MAX_FRAME_LEN: usize = 8 * 1024;

/// Frames a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientFrame {
    /// Bind this connection to the principal named by `token`.
    Register {
        /// Bearer credential.
        token: String,
    },
    /// Liveness ping for the principal bound to this connection.
    Heartbeat,
}

impl ClientFrame {
    /// Decode a client frame from the text of a WebSocket message.
    pub fn parse(text: &str) -> Result<Self> {
        if text.len() > MAX_FRAME_LEN {
            return Err(ProtocolError::TooLarge {
                len: text.len(),
                limit: MAX_FRAME_LEN,
            });
        }
        serde_json::from_str(text).map_err(ProtocolError::Malformed)
    }

    /// Encode the frame as JSON text.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// Short name of the frame, for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::Heartbeat => "heartbeat",
        }
    }
}

/// Frames the daemon sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerFrame {
    /// Registration succeeded.
    Registered {
        /// Principal the connection is now bound to.
        principal: String,
    },
    /// Full presence snapshot.
    UsersStatus {
        /// One entry per known principal, ordered by id.
        users: Vec<PresenceEntry>,
    },
    /// A request was rejected. The connection stays open.
    Error {
        /// Stable machine-readable code.
        code: String,
        /// Human-readable description.
        message: String,
    },
}

impl ServerFrame {
    /// Build an error frame.
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// Encode the frame as JSON text.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// Decode a server frame (used by clients and tests).
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(ProtocolError::Malformed)
    }
}
