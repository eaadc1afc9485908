//! Message flag vocabulary
//!
//! [`Flag`] names one flag as seen in FETCH and FLAGS replies.
//! [`SystemFlags`] is the compact per-message bitset for the fixed
//! `\`-prefixed flags. Keywords are tracked separately in
//! [`crate::keyword`].

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

bitflags! {
    /// The set of system flags carried by one message.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct SystemFlags: u8 {
        const ANSWERED = 0b0000_0001;
        const FLAGGED  = 0b0000_0010;
        const DELETED  = 0b0000_0100;
        const SEEN     = 0b0000_1000;
        const DRAFT    = 0b0001_0000;
        const RECENT   = 0b0010_0000;
    }
}

/// Number of distinct system flags, i.e. bits in [`SystemFlags`].
pub const SYSTEM_FLAG_COUNT: usize = 6;

impl SystemFlags {
    /// Position of a single-bit value, usable as an array index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.bits().trailing_zeros() as usize
    }

    /// The single-bit value at `index`.
    #[must_use]
    pub const fn from_index(index: usize) -> Self {
        Self::from_bits_truncate(1 << index)
    }

    /// IMAP name of a single-bit value.
    #[must_use]
    pub const fn imap_name(self) -> &'static str {
        match self.index() {
            0 => "\\Answered",
            1 => "\\Flagged",
            2 => "\\Deleted",
            3 => "\\Seen",
            4 => "\\Draft",
            5 => "\\Recent",
            _ => "\\?",
        }
    }
}

/// One flag atom from a server reply.
///
/// ```
/// use imap_state_check::Flag;
///
/// assert_eq!(Flag::parse("\\seen"), Some(Flag::Seen));
/// assert_eq!(Flag::parse("$Important").unwrap().to_string(), "$Important");
/// assert_eq!(Flag::parse("\\Bogus"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    Answered,
    Flagged,
    Deleted,
    Seen,
    Draft,
    /// Set by the server only. Clients cannot store it.
    Recent,
    /// Any atom without a leading backslash.
    Keyword(String),
}

impl Flag {
    /// Parse a flag atom as it appears on the wire.
    ///
    /// Returns `None` for a `\`-prefixed name outside the system flag
    /// vocabulary. The PERMANENTFLAGS wildcard `\*` is not a flag and
    /// also yields `None`.
    #[must_use]
    pub fn parse(atom: &str) -> Option<Self> {
        let Some(name) = atom.strip_prefix('\\') else {
            return Some(Self::Keyword(atom.to_string()));
        };
        let flag = match name.to_ascii_lowercase().as_str() {
            "answered" => Self::Answered,
            "flagged" => Self::Flagged,
            "deleted" => Self::Deleted,
            "seen" => Self::Seen,
            "draft" => Self::Draft,
            "recent" => Self::Recent,
            _ => return None,
        };
        Some(flag)
    }

    /// The bit this flag occupies in [`SystemFlags`], empty for keywords.
    #[must_use]
    pub const fn system_bit(&self) -> SystemFlags {
        match self {
            Self::Answered => SystemFlags::ANSWERED,
            Self::Flagged => SystemFlags::FLAGGED,
            Self::Deleted => SystemFlags::DELETED,
            Self::Seen => SystemFlags::SEEN,
            Self::Draft => SystemFlags::DRAFT,
            Self::Recent => SystemFlags::RECENT,
            Self::Keyword(_) => SystemFlags::empty(),
        }
    }

    #[must_use]
    pub const fn is_keyword(&self) -> bool {
        matches!(self, Self::Keyword(_))
    }

    /// Name as written on the wire, backslash included.
    #[must_use]
    pub fn as_imap_str(&self) -> &str {
        if let Self::Keyword(name) = self {
            return name;
        }
        self.system_bit().imap_name()
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_imap_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_flags_map_to_distinct_bits() {
        let flags = [
            Flag::Answered,
            Flag::Flagged,
            Flag::Deleted,
            Flag::Seen,
            Flag::Draft,
            Flag::Recent,
        ];
        let mut seen = SystemFlags::empty();
        for flag in &flags {
            let bit = flag.system_bit();
            assert!(!seen.intersects(bit), "{flag} shares a bit");
            assert_eq!(Flag::parse(flag.as_imap_str()).as_ref(), Some(flag));
            seen |= bit;
        }
        assert_eq!(seen, SystemFlags::all());
    }

    #[test]
    fn keywords_have_no_system_bit() {
        let junk = Flag::parse("$Junk").unwrap();
        assert!(junk.is_keyword());
        assert!(junk.system_bit().is_empty());
        assert_eq!(junk.to_string(), "$Junk");
    }

    #[test]
    fn parse_is_case_insensitive_for_system_flags() {
        assert_eq!(Flag::parse("\\SEEN"), Some(Flag::Seen));
        assert_eq!(Flag::parse("\\deleted"), Some(Flag::Deleted));
    }

    #[test]
    fn parse_rejects_unknown_system_flags() {
        assert_eq!(Flag::parse("\\Bogus"), None);
        assert_eq!(Flag::parse("\\*"), None);
    }

    #[test]
    fn bit_index_round_trips() {
        for index in 0..SYSTEM_FLAG_COUNT {
            assert_eq!(SystemFlags::from_index(index).index(), index);
        }
        assert_eq!(SystemFlags::SEEN.imap_name(), "\\Seen");
        assert_eq!(SystemFlags::all().bits().count_ones() as usize, SYSTEM_FLAG_COUNT);
    }
}
