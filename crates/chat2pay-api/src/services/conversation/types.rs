use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::chat::ChatMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Assistant,
    System,
}

impl Role {
    /// Role name in the OpenAI-compatible chat format
    pub fn as_chat_role(&self) -> &'static str {
        match self {
            Self::Human => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// One message in a conversation. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn human(text: impl Into<String>) -> Self {
        Self::new(Role::Human, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage {
            role: self.role.as_chat_role().to_string(),
            content: self.text.clone(),
        }
    }
}

/// Returned when a strategy needs prior turns but the session has none
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no conversation history")]
pub struct NoHistory;

/// Ordered turns of one session. The first turn is always the persona.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    /// Fresh conversation holding only the persona turn
    pub fn with_persona(persona: &str) -> Self {
        Self {
            turns: vec![Turn::system(persona)],
        }
    }

    /// Restore the persona invariant on histories written without one
    pub fn ensure_persona(&mut self, persona: &str) {
        if !matches!(self.turns.first(), Some(t) if t.role == Role::System) {
            self.turns.insert(0, Turn::system(persona));
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

    pub fn extend(&mut self, turns: impl IntoIterator<Item = Turn>) {
        self.turns.extend(turns);
    }

    pub fn persona(&self) -> Option<&Turn> {
        self.turns.first().filter(|t| t.role == Role::System)
    }

    /// Text of the most recent non-persona turn
    pub fn last_context(&self) -> Result<&str, NoHistory> {
        self.turns
            .iter()
            .skip(usize::from(self.persona().is_some()))
            .next_back()
            .map(|t| t.text.trim())
            .filter(|text| !text.is_empty())
            .ok_or(NoHistory)
    }

    /// Persona turn followed by at most `window` most recent turns, as chat messages
    pub fn to_messages(&self, window: usize) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(window + 1);
        let rest = match self.persona() {
            Some(persona) => {
                messages.push(persona.to_chat_message());
                &self.turns[1..]
            }
            None => &self.turns[..],
        };
        let start = rest.len().saturating_sub(window);
        messages.extend(rest[start..].iter().map(Turn::to_chat_message));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_wire_names() {
        let json = serde_json::to_string(&Turn::human("hi")).unwrap();
        assert!(json.contains(r#""role":"human""#));
        assert_eq!(Role::Human.as_chat_role(), "user");
    }

    #[test]
    fn test_last_context_skips_persona() {
        let mut conv = Conversation::with_persona("persona");
        assert_eq!(conv.last_context(), Err(NoHistory));

        conv.extend([Turn::human("laptop"), Turn::assistant("Ditemukan 2 produk")]);
        assert_eq!(conv.last_context(), Ok("Ditemukan 2 produk"));
    }

    #[test]
    fn test_last_context_empty_text_is_no_history() {
        let mut conv = Conversation::with_persona("persona");
        conv.extend([Turn::assistant("   ")]);
        assert_eq!(conv.last_context(), Err(NoHistory));
        assert_eq!(Conversation::default().last_context(), Err(NoHistory));
    }

    #[test]
    fn test_ensure_persona_prepends_once() {
        let mut conv = Conversation::default();
        conv.extend([Turn::human("halo")]);
        conv.ensure_persona("persona");
        conv.ensure_persona("persona");
        assert_eq!(conv.len(), 2);
        assert_eq!(conv.turns()[0].role, Role::System);
    }

    #[test]
    fn test_to_messages_windows_after_persona() {
        let mut conv = Conversation::with_persona("persona");
        conv.extend((0..5).map(|i| Turn::human(format!("m{i}"))));

        let messages = conv.to_messages(2);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].content, "m3");
        assert_eq!(messages[2].content, "m4");
    }

    #[test]
    fn test_serializes_as_plain_array() {
        let conv = Conversation::with_persona("p");
        let json = serde_json::to_string(&conv).unwrap();
        assert!(json.starts_with('['));
        let back: Conversation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, conv);
    }
}
