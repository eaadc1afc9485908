//! Per-session mailbox views
//!
//! Everything here is private to one session: sequence numbers, the
//! flags that session has been told about, and its keyword vocabulary.

use crate::dirty::DirtyState;
use crate::flag::SystemFlags;
use crate::keyword::{KeywordSet, ViewKeyword, bitmask_alloc_bytes, bitmask_bytes};
use crate::mailbox::Mailbox;
use crate::metadata::Uid;
use crate::session::SessionId;

/// Per-view state of the message at one sequence number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DynamicMetadata {
    /// UID whose canonical metadata this slot is linked to.
    pub canonical: Option<Uid>,
    /// System flags, `None` until the first FLAGS item is seen.
    pub flags: Option<SystemFlags>,
    pub keywords: KeywordSet,
    /// Outstanding commands that expect to observe this message.
    pub fetch_refcount: u32,
    pub dirty: DirtyState,
}

impl DynamicMetadata {
    fn new(keyword_bytes: usize) -> Self {
        Self {
            keywords: KeywordSet::with_capacity_bytes(keyword_bytes),
            ..Self::default()
        }
    }
}

/// One session's projection of the mailbox.
#[derive(Debug, Clone)]
pub struct MailboxView {
    session: SessionId,
    pub(crate) sequence_to_uid: Vec<Option<Uid>>,
    pub(crate) messages: Vec<DynamicMetadata>,
    pub(crate) keywords: Vec<ViewKeyword>,
    pub(crate) keyword_bitmask_bytes: usize,
    pub(crate) flags_epoch: u32,
    pub(crate) can_create_new_keywords: bool,
}

impl MailboxView {
    #[must_use]
    pub const fn new(session: SessionId) -> Self {
        Self {
            session,
            sequence_to_uid: Vec::new(),
            messages: Vec::new(),
            keywords: Vec::new(),
            keyword_bitmask_bytes: 0,
            flags_epoch: 0,
            can_create_new_keywords: false,
        }
    }

    #[must_use]
    pub const fn session(&self) -> SessionId {
        self.session
    }

    /// Number of messages the view knows about.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// UID at a 1-based sequence number, if known.
    #[must_use]
    pub fn uid(&self, seq: u32) -> Option<Uid> {
        self.sequence_to_uid.get(slot(seq)?).copied().flatten()
    }

    /// Metadata at a 1-based sequence number.
    #[must_use]
    pub fn message(&self, seq: u32) -> Option<&DynamicMetadata> {
        self.messages.get(slot(seq)?)
    }

    pub fn message_mut(&mut self, seq: u32) -> Option<&mut DynamicMetadata> {
        self.messages.get_mut(slot(seq)?)
    }

    #[must_use]
    pub fn keywords(&self) -> &[ViewKeyword] {
        &self.keywords
    }

    /// Bit index of keyword `name` in this view.
    #[must_use]
    pub fn keyword_index(&self, mailbox: &Mailbox, name: &str) -> Option<usize> {
        let kw = mailbox.find_keyword(name)?;
        self.keywords.iter().position(|vk| vk.name == kw)
    }

    #[must_use]
    pub fn keyword(&self, mailbox: &Mailbox, name: &str) -> Option<&ViewKeyword> {
        self.keyword_index(mailbox, name).map(|i| &self.keywords[i])
    }

    #[must_use]
    pub const fn keyword_bitmask_bytes(&self) -> usize {
        self.keyword_bitmask_bytes
    }

    #[must_use]
    pub const fn flags_epoch(&self) -> u32 {
        self.flags_epoch
    }

    #[must_use]
    pub const fn can_create_new_keywords(&self) -> bool {
        self.can_create_new_keywords
    }

    /// Append keyword `name` to the vocabulary and return its bit index.
    pub(crate) fn add_keyword(&mut self, mailbox: &mut Mailbox, name: &str) -> usize {
        let kw = mailbox.keyword_ref(name);
        self.keywords.push(ViewKeyword::new(kw, self.flags_epoch));
        self.keywords.len() - 1
    }

    /// Make sure every keyword bitmask can hold the whole vocabulary.
    pub(crate) fn ensure_keyword_capacity(&mut self) {
        let count = self.keywords.len();
        if bitmask_bytes(count) <= self.keyword_bitmask_bytes {
            return;
        }
        self.keyword_bitmask_bytes = bitmask_alloc_bytes(count);
        for metadata in &mut self.messages {
            metadata.keywords.resize(self.keyword_bitmask_bytes);
        }
    }

    /// Grow the view to `count` messages.
    pub(crate) fn extend_to(&mut self, count: usize) {
        while self.messages.len() < count {
            self.messages.push(DynamicMetadata::new(self.keyword_bitmask_bytes));
            self.sequence_to_uid.push(None);
        }
    }

    /// Remove the message at `seq`, dropping its keyword references.
    pub(crate) fn remove(&mut self, seq: u32) -> Option<(Option<Uid>, DynamicMetadata)> {
        let index = slot(seq).filter(|&i| i < self.messages.len())?;
        let uid = self.sequence_to_uid.remove(index);
        let metadata = self.messages.remove(index);
        self.release_keywords(&metadata.keywords);
        Some((uid, metadata))
    }

    /// Decrement refcounts for every keyword set in `set`.
    pub(crate) fn release_keywords(&mut self, set: &KeywordSet) {
        for index in set.iter() {
            if let Some(kw) = self.keywords.get_mut(index) {
                kw.refcount = kw.refcount.saturating_sub(1);
            }
        }
    }

    /// This session sent a STORE for `seq`.
    ///
    /// Returns `false` if there is no such message.
    pub fn begin_local_change(&mut self, seq: u32) -> bool {
        self.message_mut(seq).is_some_and(|metadata| {
            metadata.dirty = metadata.dirty.on_local_change();
            metadata.fetch_refcount += 1;
            true
        })
    }

    /// This session sent a FETCH that includes `seq`.
    ///
    /// Returns `false` if there is no such message.
    pub fn begin_fetch(&mut self, seq: u32) -> bool {
        self.message_mut(seq).is_some_and(|metadata| {
            metadata.fetch_refcount += 1;
            true
        })
    }

    /// The tagged reply for a command touching `seq` arrived.
    ///
    /// Returns `false` if there is no such message.
    pub fn command_finished(&mut self, seq: u32) -> bool {
        self.message_mut(seq).is_some_and(|metadata| {
            metadata.fetch_refcount = metadata.fetch_refcount.saturating_sub(1);
            metadata.dirty = metadata.dirty.on_command_finished(metadata.fetch_refcount);
            true
        })
    }
}

fn slot(seq: u32) -> Option<usize> {
    usize::try_from(seq).ok()?.checked_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_are_one_based() {
        let mut view = MailboxView::new(SessionId(1));
        view.extend_to(2);
        view.sequence_to_uid[1] = Some(20);
        assert_eq!(view.len(), 2);
        assert_eq!(view.uid(2), Some(20));
        assert_eq!(view.uid(1), None);
        assert!(view.message(0).is_none());
        assert!(view.message(3).is_none());
    }

    #[test]
    fn growth_preserves_existing_bitmasks() {
        let mut mailbox = Mailbox::default();
        let mut view = MailboxView::new(SessionId(1));
        for i in 0..3 {
            view.add_keyword(&mut mailbox, &format!("kw{i}"));
        }
        view.ensure_keyword_capacity();
        view.extend_to(3);
        view.message_mut(1).unwrap().keywords.set(0);
        view.message_mut(3).unwrap().keywords.set(2);

        for i in 3..40 {
            view.add_keyword(&mut mailbox, &format!("kw{i}"));
        }
        view.ensure_keyword_capacity();

        assert!(view.keyword_bitmask_bytes() >= 5);
        let first = &view.message(1).unwrap().keywords;
        let third = &view.message(3).unwrap().keywords;
        assert_eq!(first.capacity_bytes(), view.keyword_bitmask_bytes());
        assert_eq!(first.iter().collect::<Vec<_>>(), vec![0]);
        assert_eq!(third.iter().collect::<Vec<_>>(), vec![2]);
        assert!(view.message(2).unwrap().keywords.is_empty());
    }

    #[test]
    fn remove_releases_keyword_references() {
        let mut mailbox = Mailbox::default();
        let mut view = MailboxView::new(SessionId(1));
        let foo = view.add_keyword(&mut mailbox, "foo");
        view.ensure_keyword_capacity();
        view.extend_to(2);
        view.sequence_to_uid[0] = Some(10);
        view.message_mut(1).unwrap().keywords.set(foo);
        view.keywords[foo].refcount = 1;

        let (uid, _) = view.remove(1).unwrap();
        assert_eq!(uid, Some(10));
        assert_eq!(view.keywords()[foo].refcount, 0);
        assert_eq!(view.len(), 1);
        assert!(view.remove(5).is_none());
    }

    #[test]
    fn local_change_round_trip() {
        let mut view = MailboxView::new(SessionId(1));
        view.extend_to(1);
        assert!(view.begin_local_change(1));
        assert_eq!(view.message(1).unwrap().dirty, DirtyState::AwaitingLocalEcho);

        let metadata = view.message_mut(1).unwrap();
        metadata.dirty = metadata.dirty.on_flags_observed(metadata.fetch_refcount);
        assert_eq!(metadata.dirty, DirtyState::PendingConfirm);

        assert!(view.command_finished(1));
        assert_eq!(view.message(1).unwrap().dirty, DirtyState::Clean);
        assert!(!view.begin_fetch(2));
    }
}
