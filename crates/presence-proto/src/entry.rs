//! Public projection of one principal's presence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of a `users-status` snapshot.
///
/// Field names are camelCase on the wire (`isOnline`, `lastSeenAt`) so web
/// clients can consume the list without renaming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    /// Principal identifier.
    pub id: String,
    /// Display name; the principal id when no profile is known.
    pub username: String,
    /// Avatar reference, if the profile has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Whether any live connection currently backs this principal.
    pub is_online: bool,
    /// When the principal last went offline; `null` while online.
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl PresenceEntry {
    /// Entry for a principal without profile data.
    pub fn bare(
        id: impl Into<String>,
        is_online: bool,
        last_seen_at: Option<DateTime<Utc>>,
    ) -> Self {
        let id = id.into();
        Self {
            username: id.clone(),
            id,
            avatar: None,
            is_online,
            last_seen_at,
        }
    }
}
