use std::collections::HashSet;

use shared::domain::{Message, MessageId};

/// Append-only, insertion-ordered list of the messages of one session.
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    messages: Vec<Message>,
    ids: HashSet<MessageId>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` and leaves the transcript untouched if the id is already present.
    pub fn append(&mut self, message: Message) -> bool {
        if !self.ids.insert(message.id.clone()) {
            return false;
        }
        self.messages.push(message);
        true
    }

    pub fn to_vec(&self) -> Vec<Message> {
        self.messages.clone()
    }
}
