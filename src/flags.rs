//! FLAGS handling
//!
//! Covers both the `FLAGS` item of a FETCH reply, which sets the flags
//! of one message, and the untagged FLAGS/PERMANENTFLAGS replies that
//! announce the keyword vocabulary.
//!
//! Flag ownership is the main oracle here: each system flag and keyword
//! may be assigned to a single session, and any change to it seen by
//! another session while no local change is pending means the server
//! got something wrong.

use crate::args::ImapArg;
use crate::error::{Error, Result};
use crate::flag::{Flag, SystemFlags};
use crate::handler::StateHandler;
use crate::keyword::KeywordSet;
use crate::metadata::Uid;
use tracing::warn;

const PERMANENT_WILDCARD: &str = "\\*";

/// All elements of a flag list must be atoms.
fn flag_atoms(items: &[ImapArg]) -> Option<Vec<&str>> {
    items.iter().map(ImapArg::as_atom).collect()
}

const fn is_system(atom: &str) -> bool {
    !atom.is_empty() && atom.as_bytes()[0] == b'\\'
}

impl StateHandler<'_> {
    /// Apply the `FLAGS` item of a FETCH reply to the message at `seq`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fatal`] in fatal mode when the list used an
    /// undeclared keyword or changed a flag owned by another session.
    pub fn apply_flags(&mut self, seq: u32, flags: &[ImapArg]) -> Result<()> {
        self.begin();
        self.apply_flag_item(seq, flags);
        self.finish()
    }

    /// [`Self::apply_flags`] inside an already open FETCH batch.
    pub(crate) fn apply_flag_item(&mut self, seq: u32, flags: &[ImapArg]) {
        let Some(index) = self.view_index(seq) else {
            self.protocol_error(&format!("FLAGS for unknown sequence {seq}"));
            return;
        };
        let Some(atoms) = flag_atoms(flags) else {
            self.protocol_error("Flags list contains non-atoms.");
            return;
        };

        let bitmask_bytes = self.view.keyword_bitmask_bytes;
        let metadata = &mut self.view.messages[index];
        let old_flags = metadata.flags;
        let old_keywords = std::mem::replace(
            &mut metadata.keywords,
            KeywordSet::with_capacity_bytes(bitmask_bytes),
        );
        self.view.release_keywords(&old_keywords);

        let mut new_flags = SystemFlags::empty();
        for atom in atoms {
            if is_system(atom) {
                match Flag::parse(atom) {
                    Some(flag) => new_flags |= flag.system_bit(),
                    None => self.protocol_error(&format!("Invalid system flag: {atom}")),
                }
            } else if let Some(kw) = self.view.keyword_index(self.mailbox, atom) {
                // A repeated keyword holds one reference.
                let keywords = &mut self.view.messages[index].keywords;
                if !keywords.get(kw) {
                    keywords.set(kw);
                    self.view.keywords[kw].refcount += 1;
                }
            } else {
                self.keyword_misuse(&format!("Keyword used without being in FLAGS: {atom}"));
            }
        }

        let metadata = &mut self.view.messages[index];
        metadata.flags = Some(new_flags);
        let new_keywords = metadata.keywords.clone();
        let dirty = metadata.dirty;
        let canonical = metadata.canonical;

        // Without the old flags or with a local change pending there is
        // nothing to compare against; without a UID there is no owner.
        if let (Some(old_flags), true, Some(uid)) = (old_flags, dirty.is_clean(), canonical) {
            self.check_flag_changes(uid, (old_flags, &old_keywords), (new_flags, &new_keywords));
        }

        let metadata = &mut self.view.messages[index];
        metadata.dirty = metadata.dirty.on_flags_observed(metadata.fetch_refcount);
    }

    fn check_flag_changes(
        &mut self,
        uid: Uid,
        (old_flags, old_keywords): (SystemFlags, &KeywordSet),
        (new_flags, new_keywords): (SystemFlags, &KeywordSet),
    ) {
        let Some(metadata) = self.mailbox.uids.get(uid) else {
            return;
        };
        let note = metadata.expunge_note();
        let session = self.session();

        if metadata.owner == Some(session) {
            if old_flags != new_flags || !old_keywords.same_bits(new_keywords) {
                self.violation(&format!(
                    "Flags unexpectedly changed for owned message UID {uid}{note}"
                ));
            }
            return;
        }
        if !self.mailbox.config.assign_flag_owners {
            return;
        }

        let mut reports = Vec::new();
        for flag in (old_flags ^ new_flags).iter() {
            if let Some(owner) = self.mailbox.flag_owner(flag).filter(|&o| o != session) {
                reports.push(format!(
                    "Flag {} owned by session {owner} changed on UID {uid}{note}",
                    flag.imap_name()
                ));
            }
        }
        for (index, kw) in self.view.keywords.iter().enumerate() {
            if old_keywords.get(index) == new_keywords.get(index) {
                continue;
            }
            let name = self.mailbox.keyword(kw.name);
            if let Some(owner) = name.owner.filter(|&o| o != session) {
                reports.push(format!(
                    "Keyword {} owned by session {owner} changed on UID {uid}{note}",
                    name.name
                ));
            }
        }
        for report in reports {
            self.violation(&report);
        }
    }

    /// Handle an untagged `FLAGS` vocabulary announcement.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for a malformed list, in which case
    /// nothing was changed, and [`Error::Fatal`] in fatal mode when a
    /// keyword still attached to messages was dropped.
    pub fn announce_flags(&mut self, args: &ImapArg) -> Result<()> {
        self.begin();
        let Some(atoms) = args.as_list().and_then(flag_atoms) else {
            return Err(Error::Protocol("FLAGS reply isn't a list of atoms".to_string()));
        };
        if let Some(bad) = atoms.iter().find(|a| is_system(a) && Flag::parse(a).is_none()) {
            return Err(Error::Protocol(format!("Invalid system flag in FLAGS: {bad}")));
        }

        self.view.flags_epoch += 1;
        let epoch = self.view.flags_epoch;
        for atom in atoms.into_iter().filter(|a| !is_system(a)) {
            match self.view.keyword_index(self.mailbox, atom) {
                Some(kw) => self.view.keywords[kw].flags_epoch = epoch,
                None => {
                    self.view.add_keyword(self.mailbox, atom);
                }
            }
        }

        let dropped: Vec<String> = self
            .view
            .keywords
            .iter()
            .filter(|kw| kw.flags_epoch != epoch && kw.refcount > 0)
            .map(|kw| {
                format!(
                    "Keyword '{}' dropped, but it still had {} references",
                    self.mailbox.keyword(kw.name).name,
                    kw.refcount
                )
            })
            .collect();
        for report in dropped {
            self.violation(&report);
        }

        self.view.ensure_keyword_capacity();
        self.finish()
    }

    /// Handle `* OK [PERMANENTFLAGS (...)]`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for a malformed list, in which case
    /// nothing was changed, and [`Error::Fatal`] in fatal mode when a
    /// keyword was declared permanent without being announced first.
    pub fn announce_permanent_flags(&mut self, args: &ImapArg) -> Result<()> {
        self.begin();
        let Some(atoms) = args.as_list().and_then(flag_atoms) else {
            return Err(Error::Protocol(
                "PERMANENTFLAGS reply isn't a list of atoms".to_string(),
            ));
        };
        if let Some(bad) = atoms
            .iter()
            .find(|a| is_system(a) && **a != PERMANENT_WILDCARD && Flag::parse(a).is_none())
        {
            return Err(Error::Protocol(format!(
                "Invalid system flag in PERMANENTFLAGS: {bad}"
            )));
        }

        for kw in &mut self.view.keywords {
            kw.permanent = false;
        }
        self.view.can_create_new_keywords = false;

        for atom in atoms {
            if atom == PERMANENT_WILDCARD {
                self.view.can_create_new_keywords = true;
            } else if is_system(atom) {
                continue;
            } else if let Some(kw) = self.view.keyword_index(self.mailbox, atom) {
                self.view.keywords[kw].permanent = true;
            } else {
                self.violation(&format!(
                    "Keyword in PERMANENTFLAGS not introduced with FLAGS: {atom}"
                ));
            }
        }

        for kw in &self.view.keywords {
            let name = self.mailbox.keyword_mut(kw.name);
            name.permanent = kw.permanent;
            if !kw.permanent && !name.nonpermanent_warned {
                warn!("Keyword not in PERMANENTFLAGS found: {}", name.name);
                name.nonpermanent_warned = true;
            }
        }
        self.finish()
    }
}
