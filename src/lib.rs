//! IMAP mailbox state consistency checking
//!
//! Feeds the untagged responses that many concurrent sessions receive
//! for one mailbox into a shared model of that mailbox, and reports
//! every reply that contradicts what the server said earlier.
//!
//! Structural data (envelopes, body structures, sizes, header values)
//! is shared by Message-Id in the [`Mailbox`]. Flags and keywords are
//! tracked per session in a [`MailboxView`]. A [`StateHandler`] ties the
//! two together for one response:
//!
//! ```
//! use imap_state_check::{
//!     Mailbox, MailboxView, Reports, SessionId, StateHandler, parse_untagged,
//! };
//!
//! let mut mailbox = Mailbox::default();
//! let mut view = MailboxView::new(SessionId(1));
//! let mut reports = Reports::new();
//!
//! for line in ["* 1 EXISTS", "* FLAGS (\\Seen $Work)", "* 1 FETCH (UID 7 FLAGS ($Work))"] {
//!     let response = parse_untagged(line.as_bytes()).unwrap().unwrap();
//!     StateHandler::new(&mut mailbox, &mut view, &mut reports)
//!         .handle_response(&response)
//!         .unwrap();
//! }
//! assert!(reports.is_empty());
//! assert_eq!(view.uid(1), Some(7));
//! ```

mod args;
mod config;
mod dirty;
mod error;
mod fetch;
mod flag;
mod flags;
mod handler;
mod header;
mod keyword;
mod mailbox;
mod message;
mod metadata;
mod parser;
mod replay;
mod report;
mod session;
mod view;

pub use args::{ImapArg, fetch_item, list_to_imap_string};
pub use config::StateConfig;
pub use dirty::DirtyState;
pub use error::{Error, Result};
pub use fetch::{BODY_NIL_REPLY, ENVELOPE_NIL_REPLY, RFC822_SIZE_NIL_REPLY, parse_internaldate};
pub use flag::{Flag, SYSTEM_FLAG_COUNT, SystemFlags};
pub use handler::{MAX_MESSAGES, StateHandler};
pub use keyword::{KeywordName, KeywordRef, KeywordSet, ViewKeyword};
pub use mailbox::Mailbox;
pub use message::{Message, MessageHeader, MessageRef, MessageRegistry};
pub use metadata::{CanonicalMetadata, CanonicalTable, Uid};
pub use parser::{Untagged, parse_args, parse_untagged};
pub use replay::{Replay, read_response, replay_sessions};
pub use report::{Report, ReportKind, Reporter, Reports, TracingReporter};
pub use session::SessionId;
pub use view::{DynamicMetadata, MailboxView};
