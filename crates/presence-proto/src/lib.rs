//! # presence-proto
//!
//! Wire frames exchanged between presence clients and the `presenced` daemon.
//!
//! Every frame is a JSON object carried in a single WebSocket text message and
//! discriminated by its `type` field. The set of frames is closed: anything
//! that does not decode into one of the variants below is rejected with a
//! [`ProtocolError`] instead of being inspected ad hoc.
//!
//! ## Quick Start
//!
//! ```rust
//! use presence_proto::{ClientFrame, ServerFrame};
//!
//! let frame = ClientFrame::parse(r#"{"type":"register","token":"abc"}"#).unwrap();
//! assert_eq!(frame, ClientFrame::Register { token: "abc".to_string() });
//!
//! let reply = ServerFrame::Registered { principal: "alice".to_string() };
//! assert_eq!(reply.to_json().unwrap(), r#"{"type":"registered","principal":"alice"}"#);
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod entry;
pub mod error;
pub mod frame;

pub use self::entry::PresenceEntry;
pub use self::error::{ProtocolError, Result};
pub use self::frame::{ClientFrame, ServerFrame, MAX_FRAME_LEN};
