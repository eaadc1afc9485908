//! Keyword vocabulary
//!
//! Keyword names are shared by every view of a mailbox and live in the
//! [`Mailbox`](crate::Mailbox); each view keeps a parallel
//! [`ViewKeyword`] array whose index is the keyword's bit position in
//! that view's [`KeywordSet`]s.

use crate::session::SessionId;
use serde::Serialize;
use std::fmt;

/// Granularity, in bytes, used when growing keyword bitmasks.
pub const KEYWORD_ALLOC_GRANULARITY: usize = 4;

/// Handle to a shared [`KeywordName`] inside one mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct KeywordRef(pub(crate) usize);

/// A keyword name known to some view of the mailbox.
#[derive(Debug, Clone, Serialize)]
pub struct KeywordName {
    pub name: String,
    /// The only session allowed to change this keyword on messages.
    pub owner: Option<SessionId>,
    /// Whether the last PERMANENTFLAGS seen by any view listed it.
    pub permanent: bool,
    /// Set once we've warned about this keyword not being permanent.
    pub nonpermanent_warned: bool,
}

impl KeywordName {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            owner: None,
            permanent: false,
            nonpermanent_warned: false,
        }
    }
}

/// One view's state for a keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewKeyword {
    pub name: KeywordRef,
    /// Messages in this view currently carrying the keyword.
    pub refcount: u32,
    /// Last FLAGS epoch in which the server listed the keyword.
    pub flags_epoch: u32,
    pub permanent: bool,
}

impl ViewKeyword {
    pub(crate) const fn new(name: KeywordRef, flags_epoch: u32) -> Self {
        Self {
            name,
            refcount: 0,
            flags_epoch,
            permanent: false,
        }
    }
}

/// Growable keyword bitset.
///
/// The allocated size in bytes is tracked explicitly so that all
/// messages of a view share the same capacity; bits beyond the
/// capacity read as unset.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct KeywordSet {
    bytes: Vec<u8>,
}

impl KeywordSet {
    #[must_use]
    pub fn with_capacity_bytes(bytes: usize) -> Self {
        Self {
            bytes: vec![0; bytes],
        }
    }

    /// Allocated size in bytes.
    #[must_use]
    pub fn capacity_bytes(&self) -> usize {
        self.bytes.len()
    }

    /// Number of bits that can be stored without growing.
    #[must_use]
    pub fn capacity_bits(&self) -> usize {
        self.bytes.len() * 8
    }

    #[must_use]
    pub fn get(&self, index: usize) -> bool {
        self.bytes
            .get(index / 8)
            .is_some_and(|byte| byte & (1 << (index % 8)) != 0)
    }

    /// Set a bit, growing the set if needed.
    pub fn set(&mut self, index: usize) {
        if index / 8 >= self.bytes.len() {
            self.resize(index / 8 + 1);
        }
        self.bytes[index / 8] |= 1 << (index % 8);
    }

    pub fn clear(&mut self, index: usize) {
        if let Some(byte) = self.bytes.get_mut(index / 8) {
            *byte &= !(1 << (index % 8));
        }
    }

    /// Change the capacity. Growing zero-extends and keeps all bits.
    pub fn resize(&mut self, bytes: usize) {
        self.bytes.resize(bytes, 0);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.iter().all(|&byte| byte == 0)
    }

    /// Indexes of all set bits, in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.capacity_bits()).filter(|&i| self.get(i))
    }

    /// Compare set bits only, ignoring capacity differences.
    #[must_use]
    pub fn same_bits(&self, other: &Self) -> bool {
        let len = self.bytes.len().max(other.bytes.len());
        (0..len).all(|i| self.bytes.get(i).unwrap_or(&0) == other.bytes.get(i).unwrap_or(&0))
    }
}

impl fmt::Debug for KeywordSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Bytes needed to hold `count` keyword bits.
#[must_use]
pub const fn bitmask_bytes(count: usize) -> usize {
    count.div_ceil(8)
}

/// Allocation size to use when `count` keywords no longer fit.
#[must_use]
pub const fn bitmask_alloc_bytes(count: usize) -> usize {
    bitmask_bytes(count).div_ceil(KEYWORD_ALLOC_GRANULARITY) * KEYWORD_ALLOC_GRANULARITY
}
