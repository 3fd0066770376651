//! Bounded conversation history.

use std::collections::VecDeque;

use crate::llm::Message;

/// 20 (user, assistant) exchanges.
pub const MAX_HISTORY: usize = 40;

/// Completed exchanges, oldest first. Appends past the cap evict from the
/// front.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<Message>,
    cap: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::with_cap(MAX_HISTORY)
    }
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cap(cap: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(cap + 2),
            cap,
        }
    }

    pub fn push_exchange(&mut self, user: Message, assistant: Message) {
        self.entries.push_back(user);
        self.entries.push_back(assistant);
        while self.entries.len() > self.cap {
            self.entries.pop_front();
        }
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
