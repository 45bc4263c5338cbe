use crate::models::chat::{ Message, Role };
use crate::store::InMemoryConversationStore;
use std::io::{ self, Write };
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Tracks what has already been written for the newest assistant reply so
/// each store revision only prints the new suffix.
#[derive(Debug, Default)]
pub struct TranscriptPrinter {
    printed: String,
}

impl TranscriptPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_chunk(&mut self, content: &str) -> Option<String> {
        if content.len() <= self.printed.len() || !content.starts_with(self.printed.as_str()) {
            return None;
        }
        let chunk = content[self.printed.len()..].to_string();
        self.printed = content.to_string();
        Some(chunk)
    }

    pub fn render<W: Write>(
        &mut self,
        store: &InMemoryConversationStore,
        conversation_id: &str,
        out: &mut W
    ) -> io::Result<()> {
        let content = store
            .conversation(conversation_id)
            .and_then(|conv| latest_assistant(&conv.messages).map(|m| m.content.clone()));
        if let Some(chunk) = content.and_then(|c| self.next_chunk(&c)) {
            out.write_all(chunk.as_bytes())?;
            out.flush()?;
        }
        Ok(())
    }
}

fn latest_assistant(messages: &[Message]) -> Option<&Message> {
    messages.iter().rev().find(|m| m.role == Role::Assistant)
}

/// Prints the reply to stdout as the store changes, until `done` fires.
pub async fn follow(
    store: Arc<InMemoryConversationStore>,
    conversation_id: String,
    done: CancellationToken
) -> io::Result<()> {
    let mut revisions = store.subscribe();
    let mut printer = TranscriptPrinter::new();
    let mut stdout = io::stdout();
    loop {
        tokio::select! {
            _ = done.cancelled() => {
                printer.render(&store, &conversation_id, &mut stdout)?;
                break;
            }
            changed = revisions.changed() => {
                if changed.is_err() {
                    break;
                }
                printer.render(&store, &conversation_id, &mut stdout)?;
            }
        }
    }
    writeln!(stdout)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ConversationStore;

    #[test]
    fn prints_only_the_new_suffix() {
        let mut printer = TranscriptPrinter::new();
        assert_eq!(printer.next_chunk("abc").as_deref(), Some("abc"));
        assert_eq!(printer.next_chunk("abc"), None);
        assert_eq!(printer.next_chunk("abcdéf").as_deref(), Some("déf"));
        assert_eq!(printer.next_chunk("other"), None);
    }

    #[test]
    fn render_follows_latest_assistant_message() {
        let store = InMemoryConversationStore::new();
        let user = Message::optimistic_user("hi", &[]);
        let assistant = Message::assistant_placeholder();
        let id = assistant.local_id.clone();
        store.append_optimistic_messages("c1", vec![user, assistant]);
        store.update_message_by_id("c1", &id, &mut |m: &mut Message| m.content.push_str("Hel"));

        let mut printer = TranscriptPrinter::new();
        let mut out = Vec::new();
        printer.render(&store, "c1", &mut out).unwrap();
        store.update_message_by_id("c1", &id, &mut |m: &mut Message| m.content.push_str("lo"));
        printer.render(&store, "c1", &mut out).unwrap();
        printer.render(&store, "c1", &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Hello");
    }
}
