//! In-process sessions sharing one mailbox
//!
//! Unlike the replay code, the harness interleaves sessions exactly in
//! the order a test feeds them, so cross-session scenarios are
//! deterministic.

use super::Transcript;
use imap_state_check::{
    Mailbox, MailboxView, Reports, Result, SessionId, StateConfig, StateHandler, parse_untagged,
};

pub struct Harness {
    pub mailbox: Mailbox,
    pub views: Vec<MailboxView>,
    pub reports: Reports,
}

impl Harness {
    /// A mailbox with `sessions` views, numbered from 1.
    pub fn new(config: StateConfig, sessions: u32) -> Self {
        Self {
            mailbox: Mailbox::new(config),
            views: (1..=sessions).map(|id| MailboxView::new(SessionId(id))).collect(),
            reports: Reports::new(),
        }
    }

    pub fn view(&self, session: u32) -> &MailboxView {
        &self.views[slot(session)]
    }

    pub fn view_mut(&mut self, session: u32) -> &mut MailboxView {
        &mut self.views[slot(session)]
    }

    /// Feed every response of `transcript` to `session`, stopping at
    /// the first error.
    pub fn run(&mut self, session: u32, transcript: &Transcript) -> Result<()> {
        for response in transcript.responses() {
            self.feed_bytes(session, response)?;
        }
        Ok(())
    }

    /// Feed one response line (no CRLF needed) to `session`.
    pub fn feed(&mut self, session: u32, line: &str) -> Result<()> {
        self.feed_bytes(session, line.as_bytes())
    }

    fn feed_bytes(&mut self, session: u32, response: &[u8]) -> Result<()> {
        if let Some(command) = response.strip_prefix(b"> ") {
            self.local_command(session, command);
            return Ok(());
        }
        let Some(parsed) = parse_untagged(response)? else {
            return Ok(());
        };
        let view = &mut self.views[slot(session)];
        StateHandler::new(&mut self.mailbox, view, &mut self.reports).handle_response(&parsed)
    }

    fn local_command(&mut self, session: u32, command: &[u8]) {
        let command = String::from_utf8_lossy(command);
        let mut words = command.split_whitespace();
        let verb = words.next().expect("local command verb");
        let seq: u32 = words
            .next()
            .and_then(|s| s.parse().ok())
            .expect("local command sequence");
        let view = self.view_mut(session);
        let known = match verb {
            "STORE" => view.begin_local_change(seq),
            "FETCH" => view.begin_fetch(seq),
            "DONE" => view.command_finished(seq),
            other => panic!("unknown local command {other}"),
        };
        assert!(known, "{verb} for unknown sequence {seq}");
    }

    /// Messages of every report, in order.
    pub fn messages(&self) -> Vec<String> {
        self.reports.all().iter().map(|r| r.message.clone()).collect()
    }
}

fn slot(session: u32) -> usize {
    usize::try_from(session).expect("session id fits usize") - 1
}
