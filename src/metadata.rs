//! Canonical per-UID metadata
//!
//! Facts about a UID that every session must agree on. Records are
//! never removed: an expunged UID keeps its record so that late
//! replies about it can still be checked.

use crate::message::MessageRef;
use crate::session::SessionId;
use chrono::{DateTime, FixedOffset};
use std::collections::HashMap;

pub type Uid = u32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalMetadata {
    pub uid: Uid,
    pub internaldate: Option<DateTime<FixedOffset>>,
    pub expunged: bool,
    /// Session whose own changes to this message are the only legal ones.
    pub owner: Option<SessionId>,
    pub message: Option<MessageRef>,
}

impl CanonicalMetadata {
    #[must_use]
    pub const fn new(uid: Uid) -> Self {
        Self {
            uid,
            internaldate: None,
            expunged: false,
            owner: None,
            message: None,
        }
    }

    /// Suffix appended to ownership reports about this message.
    #[must_use]
    pub const fn expunge_note(&self) -> &'static str {
        if self.expunged { " (expunged)" } else { "" }
    }
}

#[derive(Debug, Default)]
pub struct CanonicalTable {
    by_uid: HashMap<Uid, CanonicalMetadata>,
}

impl CanonicalTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&mut self, uid: Uid) -> &mut CanonicalMetadata {
        self.by_uid
            .entry(uid)
            .or_insert_with(|| CanonicalMetadata::new(uid))
    }

    #[must_use]
    pub fn get(&self, uid: Uid) -> Option<&CanonicalMetadata> {
        self.by_uid.get(&uid)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_uid.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_uid.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_creation_leaves_fields_unset() {
        let mut table = CanonicalTable::new();
        let meta = table.get_or_create(7);
        assert_eq!(meta.uid, 7);
        assert_eq!(meta.internaldate, None);
        assert_eq!(meta.owner, None);
        assert_eq!(meta.message, None);
        assert!(!meta.expunged);
    }

    #[test]
    fn get_or_create_returns_existing_record() {
        let mut table = CanonicalTable::new();
        table.get_or_create(3).owner = Some(SessionId(1));
        assert_eq!(table.get_or_create(3).owner, Some(SessionId(1)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn expunged_records_stay() {
        let mut table = CanonicalTable::new();
        table.get_or_create(9).expunged = true;
        assert_eq!(table.get(9).map(|m| m.expunge_note()), Some(" (expunged)"));
    }
}
