use crate::models::chat::{ Conversation, Message, MessageStatus, Role };
use log::{ debug, warn };
use parking_lot::RwLock;
use tokio::sync::watch;

/// Owner of the conversation/message collection.
///
/// Message lookups always key off `Message::local_id`, which stays stable
/// even after the server assigns its own id.
pub trait ConversationStore: Send + Sync {
    /// Appends messages to a conversation, creating the entry if needed.
    fn append_optimistic_messages(&self, conversation_id: &str, messages: Vec<Message>);

    /// Applies `updater` to the current state of one message. Returns false
    /// when the conversation or message is not present.
    fn update_message_by_id(
        &self,
        conversation_id: &str,
        local_id: &str,
        updater: &mut dyn FnMut(&mut Message)
    ) -> bool;

    /// Records the server-assigned id. Set once; later calls are ignored.
    fn replace_message_id(&self, conversation_id: &str, local_id: &str, server_id: &str) -> bool;

    fn mark_message_status(
        &self,
        conversation_id: &str,
        local_id: &str,
        status: MessageStatus
    ) -> bool;

    /// Swaps in the server's canonical conversation list. A conversation
    /// whose reply is still streaming keeps its local messages.
    fn replace_conversations(&self, conversations: Vec<Conversation>);

    /// Marks every still-generating assistant message as cancelled.
    fn cancel_generating(&self, conversation_id: &str) -> usize;
}

pub struct InMemoryConversationStore {
    conversations: RwLock<Vec<Conversation>>,
    revision: watch::Sender<u64>,
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            conversations: RwLock::new(Vec::new()),
            revision,
        }
    }

    /// Receiver that changes every time the collection is mutated.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.conversations.read().clone()
    }

    pub fn conversation(&self, conversation_id: &str) -> Option<Conversation> {
        self.conversations
            .read()
            .iter()
            .find(|c| c.id == conversation_id)
            .cloned()
    }

    /// Finds a message by its local id or by its server id.
    pub fn message(&self, conversation_id: &str, id: &str) -> Option<Message> {
        self.conversations
            .read()
            .iter()
            .find(|c| c.id == conversation_id)
            .and_then(|c| {
                c.messages
                    .iter()
                    .find(|m| m.local_id == id || m.server_id.as_deref() == Some(id))
                    .cloned()
            })
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| {
            *rev += 1;
        });
    }

    fn with_message<R>(
        &self,
        conversation_id: &str,
        local_id: &str,
        f: impl FnOnce(&mut Message) -> R
    ) -> Option<R> {
        let result = {
            let mut guard = self.conversations.write();
            guard
                .iter_mut()
                .find(|c| c.id == conversation_id)
                .and_then(|c| c.messages.iter_mut().find(|m| m.local_id == local_id))
                .map(f)
        };
        if result.is_some() {
            self.bump();
        } else {
            debug!("No message {} in conversation {}", local_id, conversation_id);
        }
        result
    }
}

impl ConversationStore for InMemoryConversationStore {
    fn append_optimistic_messages(&self, conversation_id: &str, messages: Vec<Message>) {
        {
            let mut guard = self.conversations.write();
            match guard.iter_mut().find(|c| c.id == conversation_id) {
                Some(conv) => {
                    conv.messages.extend(messages);
                    conv.messages_loaded = true;
                }
                None => {
                    let mut conv = Conversation::new(conversation_id);
                    conv.messages = messages;
                    conv.messages_loaded = true;
                    guard.insert(0, conv);
                }
            }
        }
        self.bump();
    }

    fn update_message_by_id(
        &self,
        conversation_id: &str,
        local_id: &str,
        updater: &mut dyn FnMut(&mut Message)
    ) -> bool {
        self.with_message(conversation_id, local_id, |msg| updater(msg)).is_some()
    }

    fn replace_message_id(&self, conversation_id: &str, local_id: &str, server_id: &str) -> bool {
        self.with_message(conversation_id, local_id, |msg| {
            match msg.server_id.as_deref() {
                None => {
                    msg.server_id = Some(server_id.to_string());
                    true
                }
                Some(existing) if existing == server_id => false,
                Some(existing) => {
                    warn!(
                        "Ignoring second server id {} for message {} (already {})",
                        server_id,
                        local_id,
                        existing
                    );
                    false
                }
            }
        }).unwrap_or(false)
    }

    fn mark_message_status(
        &self,
        conversation_id: &str,
        local_id: &str,
        status: MessageStatus
    ) -> bool {
        self.with_message(conversation_id, local_id, |msg| {
            msg.status = status;
        }).is_some()
    }

    fn replace_conversations(&self, conversations: Vec<Conversation>) {
        {
            let mut guard = self.conversations.write();
            let mut previous = std::mem::take(&mut *guard);
            let mut merged: Vec<Conversation> = conversations
                .into_iter()
                .map(|mut conv| {
                    if let Some(pos) = previous.iter().position(|p| p.id == conv.id) {
                        let old = previous.swap_remove(pos);
                        // Local messages stay authoritative while a reply is streaming.
                        if !conv.messages_loaded || old.has_pending_reply() {
                            if conv.messages_loaded {
                                debug!("Keeping local messages of {} until its reply finishes", conv.id);
                            }
                            conv.messages = old.messages;
                            conv.messages_loaded = old.messages_loaded;
                        }
                    }
                    conv
                })
                .collect();
            let pending: Vec<Conversation> = previous
                .into_iter()
                .filter(|conv| conv.has_pending_reply())
                .collect();
            for conv in pending.into_iter().rev() {
                merged.insert(0, conv);
            }
            *guard = merged;
        }
        self.bump();
    }

    fn cancel_generating(&self, conversation_id: &str) -> usize {
        let changed = {
            let mut guard = self.conversations.write();
            guard
                .iter_mut()
                .find(|c| c.id == conversation_id)
                .map(|conv| {
                    let mut count = 0;
                    for msg in conv.messages.iter_mut() {
                        if msg.role == Role::Assistant && msg.status == MessageStatus::Generating {
                            msg.status = MessageStatus::Cancelled;
                            count += 1;
                        }
                    }
                    count
                })
                .unwrap_or(0)
        };
        if changed > 0 {
            self.bump();
        }
        changed
    }
}
