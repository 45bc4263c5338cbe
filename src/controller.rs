use crate::api::ApiClient;
use crate::error::ClientError;
use crate::models::account::{ QuotaUsage, TelemetrySummary };
use crate::models::chat::{ Conversation, Message };
use crate::models::stream::SendMessagePayload;
use crate::notify::{ Notifier, ToastLevel };
use crate::store::ConversationStore;
use crate::stream::{ PacingConfig, SessionOutcome, StreamingMessageSession };

use futures::future::join_all;
use log::{ info, warn };
use parking_lot::Mutex;
use std::sync::atomic::{ AtomicBool, AtomicU64, Ordering };
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const DEFAULT_TELEMETRY_RANGE: &str = "7d";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPrompt {
    pub conversation_id: Option<String>,
    pub message: String,
    pub documents: Vec<String>,
}

struct ActiveSend {
    id: u64,
    conversation_id: String,
    cancel: CancellationToken,
}

/// The message-send flow around a streaming session: optimistic messages,
/// the single shared cancellation handle, and the refreshes that follow a
/// successful reply.
pub struct ChatController {
    api: ApiClient,
    store: Arc<dyn ConversationStore>,
    notifier: Arc<dyn Notifier>,
    pacing: PacingConfig,
    active_send: Mutex<Option<ActiveSend>>,
    next_send_id: AtomicU64,
    last_prompt: Mutex<Option<PendingPrompt>>,
    can_retry: AtomicBool,
    quota: Mutex<Option<QuotaUsage>>,
    telemetry: Mutex<Option<TelemetrySummary>>,
}

impl ChatController {
    pub fn new(
        api: ApiClient,
        store: Arc<dyn ConversationStore>,
        notifier: Arc<dyn Notifier>,
        pacing: PacingConfig
    ) -> Self {
        Self {
            api,
            store,
            notifier,
            pacing,
            active_send: Mutex::new(None),
            next_send_id: AtomicU64::new(1),
            last_prompt: Mutex::new(None),
            can_retry: AtomicBool::new(false),
            quota: Mutex::new(None),
            telemetry: Mutex::new(None),
        }
    }

    pub fn can_retry(&self) -> bool {
        self.can_retry.load(Ordering::SeqCst)
    }

    pub fn is_generating(&self) -> bool {
        self.active_send.lock().is_some()
    }

    pub fn last_prompt(&self) -> Option<PendingPrompt> {
        self.last_prompt.lock().clone()
    }

    pub fn quota_usage(&self) -> Option<QuotaUsage> {
        self.quota.lock().clone()
    }

    pub fn telemetry(&self) -> Option<TelemetrySummary> {
        self.telemetry.lock().clone()
    }

    pub async fn create_conversation(&self, title: Option<&str>) -> Result<String, ClientError> {
        match self.api.create_conversation(title).await {
            Ok(conv) => {
                info!("Created conversation {}", conv.id);
                Ok(conv.id)
            }
            Err(e) => {
                self.notifier.error(&format!("Failed to create conversation: {}", e));
                Err(e)
            }
        }
    }

    /// Sends `message` and streams the reply into the store.
    ///
    /// Returns `Ok(None)` when the trimmed message is empty. Errors are only
    /// returned for failures before the stream starts; everything after that
    /// is reported through the outcome.
    pub async fn send_message(
        &self,
        conversation_id: Option<&str>,
        message: &str,
        documents: &[String]
    ) -> Result<Option<SessionOutcome>, ClientError> {
        let trimmed = message.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let conversation_id = match conversation_id.filter(|id| !id.trim().is_empty()) {
            Some(id) => id.to_string(),
            None => self.create_conversation(None).await?,
        };
        let documents = dedupe_documents(documents);

        let user_message = Message::optimistic_user(trimmed, &documents);
        let placeholder = Message::assistant_placeholder();
        let assistant_id = placeholder.local_id.clone();
        self.store.append_optimistic_messages(&conversation_id, vec![user_message, placeholder]);

        *self.last_prompt.lock() = Some(PendingPrompt {
            conversation_id: Some(conversation_id.clone()),
            message: trimmed.to_string(),
            documents: documents.clone(),
        });
        self.can_retry.store(false, Ordering::SeqCst);

        let (send_id, cancel) = self.begin_send(&conversation_id);
        let payload = SendMessagePayload {
            content: trimmed.to_string(),
            document_ids: documents,
        };
        let session = StreamingMessageSession::new(
            &conversation_id,
            &assistant_id,
            Arc::clone(&self.store),
            self.pacing,
            cancel
        );
        let outcome = session.run(&self.api, &payload).await;
        self.end_send(send_id);

        match &outcome {
            SessionOutcome::Completed { .. } => {
                self.can_retry.store(false, Ordering::SeqCst);
                self.refresh_after_reply().await;
                self.notifier.success("Response received");
                if self.api.auth().is_admin() {
                    self.refresh_telemetry(DEFAULT_TELEMETRY_RANGE).await;
                }
            }
            SessionOutcome::Cancelled => {
                self.can_retry.store(true, Ordering::SeqCst);
                self.notifier.info("Message sending cancelled");
            }
            SessionOutcome::Failed { message } => {
                self.can_retry.store(true, Ordering::SeqCst);
                self.notifier.error(message);
            }
        }
        Ok(Some(outcome))
    }

    /// Fires the shared cancellation handle. Safe to call repeatedly or when
    /// nothing is in flight; stale placeholders in `conversation_id` are
    /// marked cancelled in that case.
    pub fn cancel_generation(&self, conversation_id: &str) -> bool {
        let active = self.active_send.lock().take();
        let mut cancelled = false;
        let mut covered = false;
        if let Some(active) = active {
            info!("Cancelling in-flight send for conversation {}", active.conversation_id);
            active.cancel.cancel();
            covered = active.conversation_id == conversation_id;
            cancelled = true;
        }
        if !covered && self.store.cancel_generating(conversation_id) > 0 {
            cancelled = true;
        }
        if cancelled {
            self.can_retry.store(true, Ordering::SeqCst);
        }
        cancelled
    }

    pub async fn retry_last(&self) -> Result<Option<SessionOutcome>, ClientError> {
        let prompt = self.last_prompt.lock().clone();
        match prompt {
            Some(prompt) =>
                self.send_message(
                    prompt.conversation_id.as_deref(),
                    &prompt.message,
                    &prompt.documents
                ).await,
            None => Ok(None),
        }
    }

    /// Reloads every conversation with its messages so the store holds the
    /// server's canonical ordering and ids.
    pub async fn refresh_conversations(&self) -> Result<usize, ClientError> {
        let listed = self.api.list_conversations().await?;
        let loads = listed.into_iter().map(|out| async move {
            let mut conv = Conversation::from(out);
            match self.api.list_messages(&conv.id).await {
                Ok(messages) => {
                    conv.messages = messages.into_iter().map(Message::from).collect();
                    conv.messages_loaded = true;
                }
                Err(e) => warn!("Failed to load messages for {}: {}", conv.id, e),
            }
            conv
        });
        let conversations = join_all(loads).await;
        let count = conversations.len();
        self.store.replace_conversations(conversations);
        Ok(count)
    }

    pub async fn refresh_quota(&self) -> Option<QuotaUsage> {
        match self.api.quota_info().await {
            Ok(Some(info)) => {
                let usage = QuotaUsage::from(info);
                if usage.warn {
                    self.notifier.notify(
                        ToastLevel::Warning,
                        "Storage is almost full. Delete files or conversations to free space."
                    );
                }
                *self.quota.lock() = Some(usage.clone());
                Some(usage)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to load quota info: {}", e);
                None
            }
        }
    }

    pub async fn refresh_telemetry(&self, range: &str) -> Option<TelemetrySummary> {
        if !self.api.auth().is_admin() {
            return None;
        }
        match self.api.telemetry_summary(range).await {
            Ok(summary) => {
                *self.telemetry.lock() = summary.clone();
                summary
            }
            Err(e) => {
                warn!("Failed to load telemetry: {}", e);
                None
            }
        }
    }

    async fn refresh_after_reply(&self) {
        if let Err(e) = self.refresh_conversations().await {
            warn!("Failed to reload conversations: {}", e);
            self.notifier.error(&e.to_string());
        }
        self.refresh_quota().await;
    }

    fn begin_send(&self, conversation_id: &str) -> (u64, CancellationToken) {
        let id = self.next_send_id.fetch_add(1, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        let previous = self.active_send.lock().replace(ActiveSend {
            id,
            conversation_id: conversation_id.to_string(),
            cancel: cancel.clone(),
        });
        if let Some(previous) = previous {
            info!(
                "Cancelling previous send for conversation {} before starting a new one",
                previous.conversation_id
            );
            previous.cancel.cancel();
        }
        (id, cancel)
    }

    fn end_send(&self, id: u64) {
        let mut slot = self.active_send.lock();
        if slot.as_ref().map(|a| a.id) == Some(id) {
            *slot = None;
        }
    }
}

/// Drops empty ids and repeats, keeping first occurrence order.
pub fn dedupe_documents(documents: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    documents
        .iter()
        .map(|d| d.trim())
        .filter(|d| !d.is_empty())
        .filter(|d| seen.insert(d.to_string()))
        .map(str::to_string)
        .collect()
}
