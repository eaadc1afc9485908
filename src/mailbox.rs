//! State shared by every session testing one mailbox
//!
//! A [`Mailbox`] lives for the whole test run. Sessions borrow it
//! mutably one response at a time; when sessions run on several
//! threads it has to sit behind a single lock.

use crate::config::StateConfig;
use crate::flag::{Flag, SYSTEM_FLAG_COUNT, SystemFlags};
use crate::keyword::{KeywordName, KeywordRef};
use crate::message::MessageRegistry;
use crate::metadata::{CanonicalTable, Uid};
use crate::session::SessionId;

#[derive(Debug, Default)]
pub struct Mailbox {
    pub config: StateConfig,
    /// Structural message data keyed by Message-Id.
    pub messages: MessageRegistry,
    /// Canonical per-UID metadata.
    pub uids: CanonicalTable,
    keywords: Vec<KeywordName>,
    flag_owners: [Option<SessionId>; SYSTEM_FLAG_COUNT],
}

impl Mailbox {
    #[must_use]
    pub fn new(config: StateConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Find a keyword name, case-insensitively.
    #[must_use]
    pub fn find_keyword(&self, name: &str) -> Option<KeywordRef> {
        self.keywords
            .iter()
            .position(|kw| kw.name.eq_ignore_ascii_case(name))
            .map(KeywordRef)
    }

    /// Find a keyword name, registering it if new.
    pub fn keyword_ref(&mut self, name: &str) -> KeywordRef {
        self.find_keyword(name).unwrap_or_else(|| {
            self.keywords.push(KeywordName::new(name));
            KeywordRef(self.keywords.len() - 1)
        })
    }

    #[must_use]
    pub fn keyword(&self, kw: KeywordRef) -> &KeywordName {
        &self.keywords[kw.0]
    }

    pub fn keyword_mut(&mut self, kw: KeywordRef) -> &mut KeywordName {
        &mut self.keywords[kw.0]
    }

    #[must_use]
    pub fn keywords(&self) -> &[KeywordName] {
        &self.keywords
    }

    /// Session owning a single system flag bit.
    #[must_use]
    pub fn flag_owner(&self, flag: SystemFlags) -> Option<SessionId> {
        self.flag_owners.get(flag.index()).copied().flatten()
    }

    /// Record that only `session` may change `flag` on any message.
    pub fn assign_flag_owner(&mut self, flag: &Flag, session: SessionId) {
        match flag {
            Flag::Keyword(name) => self.assign_keyword_owner(name, session),
            system => self.flag_owners[system.system_bit().index()] = Some(session),
        }
    }

    /// Record that only `session` may set or clear keyword `name`.
    pub fn assign_keyword_owner(&mut self, name: &str, session: SessionId) {
        let kw = self.keyword_ref(name);
        self.keyword_mut(kw).owner = Some(session);
    }

    /// Record that only `session` may change any flag of `uid`.
    pub fn assign_message_owner(&mut self, uid: Uid, session: SessionId) {
        self.uids.get_or_create(uid).owner = Some(session);
    }
}
