//! Entry point for feeding server responses into mailbox state
//!
//! A [`StateHandler`] borrows the shared [`Mailbox`], one session's
//! [`MailboxView`] and a [`Reporter`] for the duration of one response.
//! The FETCH and FLAGS handling lives in [`crate::fetch`] and
//! [`crate::flags`].

use crate::error::{Error, Result};
use crate::mailbox::Mailbox;
use crate::parser::Untagged;
use crate::report::Reporter;
use crate::session::SessionId;
use crate::view::MailboxView;
use tracing::debug;

/// Largest EXISTS count a view will grow to. Larger counts are
/// reported as protocol errors.
pub const MAX_MESSAGES: usize = 1 << 24;

pub struct StateHandler<'a> {
    pub(crate) mailbox: &'a mut Mailbox,
    pub(crate) view: &'a mut MailboxView,
    reporter: &'a mut dyn Reporter,
    fatal_errors: usize,
}

impl<'a> StateHandler<'a> {
    pub fn new(
        mailbox: &'a mut Mailbox,
        view: &'a mut MailboxView,
        reporter: &'a mut dyn Reporter,
    ) -> Self {
        Self {
            mailbox,
            view,
            reporter,
            fatal_errors: 0,
        }
    }

    #[must_use]
    pub const fn session(&self) -> SessionId {
        self.view.session()
    }

    /// Dispatch one parsed untagged response.
    ///
    /// Malformed FLAGS and PERMANENTFLAGS replies are reported as
    /// protocol errors rather than returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fatal`] if fatal mode is configured and the
    /// response produced a consistency violation.
    pub fn handle_response(&mut self, response: &Untagged) -> Result<()> {
        let result = match response {
            Untagged::Fetch { seq, args } => self.handle_fetch(*seq, args),
            Untagged::Flags(args) => self.announce_flags(args),
            Untagged::PermanentFlags(args) => self.announce_permanent_flags(args),
            Untagged::Exists(count) => {
                self.handle_exists(*count);
                Ok(())
            }
            Untagged::Expunge(seq) => {
                self.handle_expunge(*seq);
                Ok(())
            }
            Untagged::Other => Ok(()),
        };
        match result {
            Err(Error::Protocol(message)) => {
                self.protocol_error(&message);
                Ok(())
            }
            other => other,
        }
    }

    /// `* <count> EXISTS`
    pub fn handle_exists(&mut self, count: u32) {
        let count = usize::try_from(count).unwrap_or(usize::MAX);
        let known = self.view.len();
        if count < known {
            self.protocol_error(&format!("EXISTS decreased from {known} to {count}"));
            return;
        }
        if count > MAX_MESSAGES {
            self.protocol_error(&format!(
                "EXISTS {count} exceeds the supported {MAX_MESSAGES} messages"
            ));
            return;
        }
        if count > known {
            debug!(session = %self.session(), "Mailbox grew from {} to {} messages", known, count);
        }
        self.view.extend_to(count);
    }

    /// `* <seq> EXPUNGE`
    pub fn handle_expunge(&mut self, seq: u32) {
        let Some((uid, metadata)) = self.view.remove(seq) else {
            self.protocol_error(&format!("EXPUNGE for unknown sequence {seq}"));
            return;
        };
        if let Some(uid) = metadata.canonical.or(uid) {
            debug!(session = %self.session(), "UID {} expunged", uid);
            self.mailbox.uids.get_or_create(uid).expunged = true;
        }
    }

    pub(crate) fn protocol_error(&mut self, message: &str) {
        let session = self.session();
        self.reporter.protocol_error(session, message);
    }

    pub(crate) fn violation(&mut self, message: &str) {
        let session = self.session();
        self.fatal_errors += 1;
        self.reporter.consistency_violation(session, message);
    }

    /// A protocol error that fatal mode still treats as fatal.
    pub(crate) fn keyword_misuse(&mut self, message: &str) {
        self.fatal_errors += 1;
        self.protocol_error(message);
    }

    pub(crate) const fn begin(&mut self) {
        self.fatal_errors = 0;
    }

    pub(crate) fn finish(&self) -> Result<()> {
        if self.fatal_errors > 0 && self.mailbox.config.fatal_on_consistency_error {
            return Err(Error::Fatal {
                session: self.session(),
                violations: self.fatal_errors,
            });
        }
        Ok(())
    }
}
