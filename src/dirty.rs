//! Reconciling local flag changes with server notifications
//!
//! When a session issues a STORE it expects to see the resulting flags
//! echoed back, possibly more than once if other commands on the same
//! message are outstanding. While a message is dirty, flag changes it
//! sees aren't checked against ownership.
//!
//! | state               | event                                 | next                      |
//! |---------------------|---------------------------------------|---------------------------|
//! | any                 | local STORE issued                    | `AwaitingLocalEcho`       |
//! | `Clean`             | FLAGS observed                        | `Clean`                   |
//! | not `Clean`         | FLAGS observed, `fetch_refcount <= 1` | `PendingConfirm`          |
//! | `AwaitingLocalEcho` | FLAGS observed, `fetch_refcount > 1`  | `AwaitingLocalEchoQueued` |
//! | other               | FLAGS observed, `fetch_refcount > 1`  | unchanged                 |
//! | `PendingConfirm`    | last outstanding command finished     | `Clean`                   |
//! | other               | command finished                      | unchanged                 |
//!
//! A STORE whose echo never arrived (`STORE .SILENT`) stays in
//! `AwaitingLocalEcho` after it finishes. The next FLAGS observed is
//! taken as the late echo, and the next finished command makes the
//! message clean again.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum DirtyState {
    /// No local change outstanding; every observed change is checked.
    #[default]
    Clean,
    /// Local change was echoed; waiting for the command to finish.
    PendingConfirm,
    /// Local change issued, echo not seen yet.
    AwaitingLocalEcho,
    /// Echo seen, but other outstanding commands will observe it too.
    AwaitingLocalEchoQueued,
}

impl DirtyState {
    #[must_use]
    pub const fn is_clean(self) -> bool {
        matches!(self, Self::Clean)
    }

    /// A STORE for the message was sent by this session.
    #[must_use]
    pub const fn on_local_change(self) -> Self {
        Self::AwaitingLocalEcho
    }

    /// A FLAGS item for the message was received.
    #[must_use]
    pub const fn on_flags_observed(self, fetch_refcount: u32) -> Self {
        if fetch_refcount <= 1 {
            // Seen, but more updates for the same message may follow,
            // so don't go back to clean yet.
            if self.is_clean() {
                Self::Clean
            } else {
                Self::PendingConfirm
            }
        } else if matches!(self, Self::AwaitingLocalEcho) {
            Self::AwaitingLocalEchoQueued
        } else {
            self
        }
    }

    /// A command touching the message completed; `remaining` commands
    /// are still outstanding.
    #[must_use]
    pub const fn on_command_finished(self, remaining: u32) -> Self {
        if remaining == 0 && matches!(self, Self::PendingConfirm) {
            Self::Clean
        } else {
            self
        }
    }
}
