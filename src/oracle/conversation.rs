//! Explicit chat context for oracle calls.
//!
//! Sequential calls may share one `Conversation` per caller; calls in a
//! concurrent batch each build a fresh one, so they never see each other's
//! turns. History is opt-in and bounded by `max_history_pairs`.

use std::collections::VecDeque;

use crate::gateway::Message;
use crate::prompts::PromptInstance;

#[derive(Debug, Clone)]
pub struct Conversation {
    system: String,
    history: VecDeque<(String, String)>,
    max_history_pairs: usize,
}

impl Conversation {
    pub fn new(system: impl Into<String>, max_history_pairs: usize) -> Self {
        Self {
            system: system.into(),
            history: VecDeque::new(),
            max_history_pairs,
        }
    }

    pub fn from_prompt(prompt: &PromptInstance, max_history_pairs: usize) -> Self {
        Self::new(prompt.system.clone(), max_history_pairs)
    }

    /// Remember a completed exchange, evicting the oldest beyond the window.
    pub fn push_exchange(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        if self.max_history_pairs == 0 {
            return;
        }
        self.history.push_back((user.into(), assistant.into()));
        while self.history.len() > self.max_history_pairs {
            self.history.pop_front();
        }
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Messages to send for the next user turn.
    pub fn messages_for(&self, user: &str) -> Vec<Message> {
        let mut messages = Vec::with_capacity(2 + self.history.len() * 2);
        if !self.system.is_empty() {
            messages.push(Message::system(self.system.clone()));
        }
        for (u, a) in &self.history {
            messages.push(Message::user(u.clone()));
            messages.push(Message::assistant(a.clone()));
        }
        messages.push(Message::user(user));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Role;

    #[test]
    fn zero_window_sends_only_system_and_user() {
        let mut convo = Conversation::new("sys", 0);
        convo.push_exchange("old question", "old answer");
        let msgs = convo.messages_for("new");
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, Role::System);
        assert_eq!(msgs[1], Message::user("new"));
    }

    #[test]
    fn window_keeps_most_recent_pairs() {
        let mut convo = Conversation::new("sys", 1);
        convo.push_exchange("q1", "a1");
        convo.push_exchange("q2", "a2");
        assert_eq!(convo.history_len(), 1);
        let msgs = convo.messages_for("q3");
        assert_eq!(msgs[1], Message::user("q2"));
        assert_eq!(msgs[2], Message::assistant("a2"));
        assert_eq!(msgs[3], Message::user("q3"));
    }

    #[test]
    fn empty_system_prompt_is_omitted() {
        let msgs = Conversation::new("", 0).messages_for("hi");
        assert_eq!(msgs, vec![Message::user("hi")]);
    }
}
