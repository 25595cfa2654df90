//! Stable identities for transcript entries the transport does not name.
//!
//! Tool-call events reference calls by a raw id that is not itself a
//! transcript id. The synthesizer derives one deterministically
//! (`"tool-" + raw_id`) and remembers the mapping, so every event about the
//! same call converges on one transcript entry.

use std::collections::HashMap;

use crate::transcript::types::ItemId;

/// Prefix for synthesized tool-note identities.
pub const TOOL_ID_PREFIX: &str = "tool-";

/// Mints and remembers `raw_id -> stable id` mappings.
#[derive(Debug, Default)]
pub struct IdentitySynthesizer {
    minted: HashMap<String, ItemId>,
}

impl IdentitySynthesizer {
    /// Create an empty synthesizer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stable id for `raw_id`, minting it on first reference.
    ///
    /// Returns `None` for blank raw ids: without a usable identifier the
    /// lifecycle of the entry cannot be tracked.
    pub fn resolve_or_mint(&mut self, raw_id: &str) -> Option<ItemId> {
        let raw_id = raw_id.trim();
        if raw_id.is_empty() {
            return None;
        }
        let id = self
            .minted
            .entry(raw_id.to_owned())
            .or_insert_with(|| ItemId::new(format!("{TOOL_ID_PREFIX}{raw_id}")));
        Some(id.clone())
    }

    /// Previously minted id for `raw_id`, without minting.
    pub fn lookup(&self, raw_id: &str) -> Option<&ItemId> {
        self.minted.get(raw_id.trim())
    }

    /// Number of remembered mappings.
    pub fn len(&self) -> usize {
        self.minted.len()
    }

    /// Whether nothing has been minted.
    pub fn is_empty(&self) -> bool {
        self.minted.is_empty()
    }

    /// Forget every mapping (full session reset).
    pub fn reset(&mut self) {
        self.minted.clear();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn mints_deterministic_ids() {
        let mut ids = IdentitySynthesizer::new();
        let first = ids.resolve_or_mint("a1").unwrap();
        assert_eq!(first.as_str(), "tool-a1");
        assert_eq!(ids.resolve_or_mint("a1").unwrap(), first);
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn trims_raw_ids() {
        let mut ids = IdentitySynthesizer::new();
        let id = ids.resolve_or_mint("  a1 ").unwrap();
        assert_eq!(id.as_str(), "tool-a1");
        assert_eq!(ids.lookup("a1"), Some(&id));
    }

    #[test]
    fn blank_raw_id_is_rejected() {
        let mut ids = IdentitySynthesizer::new();
        assert!(ids.resolve_or_mint("").is_none());
        assert!(ids.resolve_or_mint("   ").is_none());
        assert!(ids.is_empty());
    }

    #[test]
    fn lookup_does_not_mint() {
        let ids = IdentitySynthesizer::new();
        assert!(ids.lookup("a1").is_none());
    }

    #[test]
    fn reset_forgets_mappings() {
        let mut ids = IdentitySynthesizer::new();
        ids.resolve_or_mint("a1");
        ids.reset();
        assert!(ids.lookup("a1").is_none());
    }
}
