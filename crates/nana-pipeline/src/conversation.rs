//! Conversation state: the ordered transcript shown to the user.

use nana_ai::{Part, Role};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One entry in the transcript.
///
/// Entries are replaced as whole values on update; observers holding an older
/// clone never see a half-applied change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub id: String,
    pub role: Role,
    pub parts: Vec<Part>,
    /// Creation time (Unix ms)
    pub created_at: i64,
    /// Error entries are shown but never replayed as history
    #[serde(default)]
    pub is_error: bool,
    /// Seconds the model spent reasoning, when it reasoned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_duration_secs: Option<f64>,
}

impl ConversationEntry {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            parts,
            created_at: chrono::Utc::now().timestamp_millis(),
            is_error: false,
            thinking_duration_secs: None,
        }
    }

    pub fn user(parts: Vec<Part>) -> Self {
        Self::new(Role::User, parts)
    }

    /// Empty model entry that a running task fills in
    pub fn placeholder() -> Self {
        Self::new(Role::Model, Vec::new())
    }

    /// Non-reasoning images, in order
    pub fn images(&self) -> impl Iterator<Item = &Part> {
        self.parts.iter().filter(|p| p.as_image().is_some())
    }

    /// First answer text part, if any
    pub fn first_text(&self) -> Option<&str> {
        self.parts.iter().find_map(Part::as_text)
    }
}

/// Ordered transcript of entries.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    entries: Vec<ConversationEntry>,
}

impl Conversation {
    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, entry: ConversationEntry) {
        self.entries.push(entry);
    }

    pub fn get(&self, id: &str) -> Option<&ConversationEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    /// Replace the entry with `id` by an edited copy and return the new value.
    pub fn update(
        &mut self,
        id: &str,
        edit: impl FnOnce(&mut ConversationEntry),
    ) -> Option<ConversationEntry> {
        let index = self.position(id)?;
        let mut next = self.entries[index].clone();
        edit(&mut next);
        self.entries[index] = next.clone();
        Some(next)
    }

    /// Remove a single entry. Returns false if it does not exist.
    pub fn delete(&mut self, id: &str) -> bool {
        match self.position(id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Cut the transcript back to just before the user turn that produced
    /// `id`, returning that user entry.
    ///
    /// `id` may name the user entry itself or the model entry directly after
    /// it. Returns `None` when no such turn exists.
    pub fn rewind_to_turn(&mut self, id: &str) -> Option<ConversationEntry> {
        let index = self.position(id)?;
        let user_index = match self.entries[index].role {
            Role::User => index,
            Role::Model if index > 0 && self.entries[index - 1].role == Role::User => index - 1,
            Role::Model => return None,
        };
        let user = self.entries[user_index].clone();
        self.entries.truncate(user_index);
        Some(user)
    }
}

/// Shared, lock-protected conversation.
///
/// Access goes through closures so a lock is never held across an await.
#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    inner: Arc<RwLock<Conversation>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read<R>(&self, f: impl FnOnce(&Conversation) -> R) -> R {
        f(&self.inner.read())
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut Conversation) -> R) -> R {
        f(&mut self.inner.write())
    }

    /// Clone of all entries
    pub fn snapshot(&self) -> Vec<ConversationEntry> {
        self.inner.read().entries().to_vec()
    }

    pub fn get(&self, id: &str) -> Option<ConversationEntry> {
        self.inner.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
