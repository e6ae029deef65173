//! Profile lookup for snapshot enrichment.
//!
//! Profiles (display name, avatar) live outside the presence core. A missing
//! profile never hides a principal from a snapshot; the principal id is shown
//! instead.

use dashmap::DashMap;

use crate::config::ProfileBlock;
use crate::state::PrincipalId;

/// Public profile fields of a principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub display_name: String,
    pub avatar: Option<String>,
}

/// Read-only profile source.
pub trait ProfileLookup: Send + Sync {
    fn profile(&self, principal: &str) -> Option<Profile>;
}

/// In-memory profile directory, seeded from `[[profiles]]` config blocks.
#[derive(Debug, Default)]
pub struct ProfileDirectory {
    profiles: DashMap<PrincipalId, Profile>,
}

impl ProfileDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_blocks(blocks: &[ProfileBlock]) -> Self {
        let directory = Self::new();
        for block in blocks {
            directory.insert(
                &block.id,
                Profile {
                    display_name: block.username.clone(),
                    avatar: block.avatar.clone(),
                },
            );
        }
        directory
    }

    pub fn insert(&self, principal: &str, profile: Profile) {
        self.profiles.insert(principal.to_string(), profile);
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl ProfileLookup for ProfileDirectory {
    fn profile(&self, principal: &str) -> Option<Profile> {
        self.profiles.get(principal).map(|p| p.value().clone())
    }
}
