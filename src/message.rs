//! Message identity registry
//!
//! Structural data about a message (envelope, body structure, sizes,
//! header values) doesn't depend on which UID or session it's seen
//! through, so it is keyed by the message's Message-Id.

use serde::Serialize;
use std::collections::HashMap;

/// Handle to a [`Message`] inside one [`MessageRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MessageRef(usize);

/// One header field value observed through `BODY[HEADER.FIELDS]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageHeader {
    /// Field name as first requested. Empty for the end-of-headers marker.
    pub name: String,
    pub value: Vec<u8>,
    /// The field was requested but the server returned nothing for it.
    pub missing: bool,
}

/// Shared structural record of one message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Message {
    pub message_id: String,
    pub envelope: Option<String>,
    pub body: Option<String>,
    pub bodystructure: Option<String>,
    pub full_size: Option<u64>,
    pub header_size: Option<u64>,
    pub body_size: Option<u64>,
    pub mime1_size: Option<u64>,
    pub headers: Vec<MessageHeader>,
}

impl Message {
    #[must_use]
    pub fn new(message_id: &str) -> Self {
        Self {
            message_id: message_id.to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&MessageHeader> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
    }
}

/// Table of all messages seen during the run, keyed by Message-Id.
#[derive(Debug, Default)]
pub struct MessageRegistry {
    messages: Vec<Message>,
    by_id: HashMap<String, MessageRef>,
}

impl MessageRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the message with `message_id`, registering it if new.
    pub fn get_or_create(&mut self, message_id: &str) -> MessageRef {
        if let Some(&msg) = self.by_id.get(message_id) {
            return msg;
        }
        let msg = MessageRef(self.messages.len());
        self.messages.push(Message::new(message_id));
        self.by_id.insert(message_id.to_string(), msg);
        msg
    }

    #[must_use]
    pub fn find(&self, message_id: &str) -> Option<MessageRef> {
        self.by_id.get(message_id).copied()
    }

    #[must_use]
    pub fn get(&self, msg: MessageRef) -> &Message {
        &self.messages[msg.0]
    }

    pub fn get_mut(&mut self, msg: MessageRef) -> &mut Message {
        &mut self.messages[msg.0]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
