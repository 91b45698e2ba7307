//! Project the transcript into the history sent with a request.

use nana_ai::{Part, Role, Turn};

use crate::conversation::ConversationEntry;

/// Build request history from transcript entries.
///
/// Error entries are dropped, reasoning parts are stripped from model
/// entries, and entries left with no parts are skipped.
pub fn project(entries: &[ConversationEntry]) -> Vec<Turn> {
    entries
        .iter()
        .filter(|entry| !entry.is_error)
        .filter_map(|entry| {
            let parts: Vec<Part> = match entry.role {
                Role::Model => entry
                    .parts
                    .iter()
                    .filter(|p| !p.is_reasoning())
                    .cloned()
                    .collect(),
                Role::User => entry.parts.clone(),
            };
            (!parts.is_empty()).then(|| Turn::new(entry.role, parts))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error_entry() -> ConversationEntry {
        let mut entry = ConversationEntry::new(Role::Model, vec![Part::text("Error: boom")]);
        entry.is_error = true;
        entry
    }

    #[test]
    fn test_projection_rules() {
        let entries = vec![
            ConversationEntry::user(vec![Part::text("draw a cat")]),
            ConversationEntry::new(
                Role::Model,
                vec![
                    Part::thinking("planning"),
                    Part::thinking_image("AA==", "image/png"),
                    Part::image("BB==", "image/png"),
                ],
            ),
            ConversationEntry::user(vec![Part::text("again")]),
            error_entry(),
            ConversationEntry::new(Role::Model, vec![Part::thinking("only thoughts")]),
            ConversationEntry::placeholder(),
        ];

        let turns = project(&entries);
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].role, Role::Model);
        assert_eq!(turns[1].parts, vec![Part::image("BB==", "image/png")]);
        assert_eq!(turns[2].parts, vec![Part::text("again")]);
        assert!(turns.iter().flat_map(|t| &t.parts).all(|p| !p.is_reasoning()));
    }

    #[test]
    fn test_empty_transcript() {
        assert!(project(&[]).is_empty());
    }
}
