use chrono::{ DateTime, Utc };
use serde::{ Deserialize, Serialize };
use serde_json::{ Map, Value as JsonValue };
use uuid::Uuid;

pub type Metadata = Map<String, JsonValue>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Generating,
    Completed,
    Cancelled,
    Error,
}

impl MessageStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, MessageStatus::Generating)
    }
}

/// One chat turn as held by the client.
///
/// `local_id` never changes and is what every store lookup uses.
/// `server_id` is filled in once the backend confirms persistence.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub local_id: String,
    pub server_id: Option<String>,
    pub role: Role,
    pub content: String,
    pub status: MessageStatus,
    pub metadata: Metadata,
    pub attached_documents: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn optimistic_user(content: &str, documents: &[String]) -> Self {
        let mut metadata = Metadata::new();
        if !documents.is_empty() {
            metadata.insert(
                "document_ids".to_string(),
                JsonValue::Array(documents.iter().cloned().map(JsonValue::String).collect())
            );
        }
        Self {
            local_id: temporary_id(Role::User),
            server_id: None,
            role: Role::User,
            content: content.to_string(),
            status: MessageStatus::Completed,
            metadata,
            attached_documents: documents.to_vec(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant_placeholder() -> Self {
        Self {
            local_id: temporary_id(Role::Assistant),
            server_id: None,
            role: Role::Assistant,
            content: String::new(),
            status: MessageStatus::Generating,
            metadata: Metadata::new(),
            attached_documents: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// The server id when known, otherwise the temporary client id.
    pub fn id(&self) -> &str {
        self.server_id.as_deref().unwrap_or(&self.local_id)
    }
}

fn temporary_id(role: Role) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("msg-{}-{}-{}", Utc::now().timestamp_millis(), role.as_str(), &suffix[..8])
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub status: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub storage_size: u64,
    pub messages: Vec<Message>,
    pub messages_loaded: bool,
}

impl Conversation {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            title: DEFAULT_TITLE.to_string(),
            status: None,
            created_at: None,
            updated_at: None,
            storage_size: 0,
            messages: Vec::new(),
            messages_loaded: false,
        }
    }

    /// True while an assistant reply in this conversation is still streaming.
    pub fn has_pending_reply(&self) -> bool {
        self.messages
            .iter()
            .any(|m| m.role == Role::Assistant && !m.status.is_terminal())
    }
}

const DEFAULT_TITLE: &str = "New Conversation";

#[derive(Clone, Debug, Deserialize)]
pub struct ConversationOut {
    pub id: String,
    pub title: Option<String>,
    pub status: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub storage_size: Option<u64>,
}

impl From<ConversationOut> for Conversation {
    fn from(conv: ConversationOut) -> Self {
        Self {
            id: conv.id,
            title: conv.title
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            status: conv.status,
            created_at: conv.created_at,
            updated_at: conv.updated_at,
            storage_size: conv.storage_size.unwrap_or(0),
            messages: Vec::new(),
            messages_loaded: false,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct MessageOut {
    pub id: String,
    pub role: Role,
    pub content_md: String,
    #[serde(default)]
    pub meta: Metadata,
    pub created_at: Option<String>,
}

impl From<MessageOut> for Message {
    fn from(msg: MessageOut) -> Self {
        let attached_documents = msg.meta
            .get("document_ids")
            .and_then(|v| v.as_array())
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| id.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            local_id: msg.id.clone(),
            server_id: Some(msg.id),
            role: msg.role,
            content: msg.content_md,
            status: MessageStatus::Completed,
            metadata: msg.meta,
            attached_documents,
            timestamp: msg.created_at
                .as_deref()
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(Utc::now),
        }
    }
}
