//! Client-side conversation history.

use relay_common::protocol::Turn;

/// Assistant turn every fresh conversation starts with.
pub const GREETING: &str = "Hi! I’m your AI assistant. Ask me anything.";

/// Ordered turn history, oldest first.
///
/// Turns are only ever appended. The trailing turn is the one place text can
/// change after the fact, through [`Conversation::replace_trailing_content`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    /// A conversation seeded with the assistant greeting.
    pub fn new() -> Self {
        Self {
            turns: vec![Turn::assistant(GREETING)],
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Overwrite the content of the newest turn. Returns `false` when empty.
    pub fn replace_trailing_content(&mut self, content: impl Into<String>) -> bool {
        match self.turns.last_mut() {
            Some(turn) => {
                turn.content = content.into();
                true
            }
            None => false,
        }
    }

    /// Copy of the history, as sent to the relay.
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.clone()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_common::protocol::Role;

    #[test]
    fn test_new_conversation_is_seeded() {
        let conversation = Conversation::new();
        assert_eq!(conversation.len(), 1);
        assert_eq!(conversation.turns()[0].role, Role::Assistant);
        assert_eq!(conversation.turns()[0].content, GREETING);
    }

    #[test]
    fn test_replace_trailing_content_only_touches_last() {
        let mut conversation = Conversation::new();
        conversation.push(Turn::user("Hi"));
        conversation.push(Turn::assistant(""));

        assert!(conversation.replace_trailing_content("Hel"));
        assert!(conversation.replace_trailing_content("Hello"));

        let turns = conversation.turns();
        assert_eq!(turns[0].content, GREETING);
        assert_eq!(turns[1].content, "Hi");
        assert_eq!(turns[2].content, "Hello");
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut conversation = Conversation::new();
        conversation.push(Turn::user("Hi"));
        let snapshot = conversation.snapshot();
        conversation.push(Turn::assistant(""));

        assert_eq!(snapshot.len(), 2);
        assert_eq!(conversation.len(), 3);
    }
}
