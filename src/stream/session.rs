use crate::api::ApiClient;
use crate::error::ClientError;
use crate::models::chat::{ Message, MessageStatus };
use crate::models::stream::{ SendMessagePayload, StreamEvent };
use crate::store::ConversationStore;
use super::pacing::{ CharacterQueue, PacingConfig, PacingTimer };
use super::sse::SseDecoder;

use chrono::Utc;
use futures::{ Stream, StreamExt };
use log::{ debug, error, info, warn };
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const DEFAULT_STREAM_ERROR: &str = "Streaming error";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed {
        message_id: String,
    },
    Cancelled,
    Failed {
        message: String,
    },
}

impl SessionOutcome {
    pub fn status(&self) -> MessageStatus {
        match self {
            SessionOutcome::Completed { .. } => MessageStatus::Completed,
            SessionOutcome::Cancelled => MessageStatus::Cancelled,
            SessionOutcome::Failed { .. } => MessageStatus::Error,
        }
    }
}

/// Consumes one streamed assistant reply and keeps the placeholder message
/// in the store up to date until it reaches a terminal status.
pub struct StreamingMessageSession {
    conversation_id: String,
    local_id: String,
    server_id: Option<String>,
    store: Arc<dyn ConversationStore>,
    queue: CharacterQueue,
    timer: PacingTimer,
    chars_per_tick: usize,
    received_any_delta: bool,
    cancel: CancellationToken,
}

impl StreamingMessageSession {
    pub fn new(
        conversation_id: &str,
        assistant_local_id: &str,
        store: Arc<dyn ConversationStore>,
        pacing: PacingConfig,
        cancel: CancellationToken
    ) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            local_id: assistant_local_id.to_string(),
            server_id: None,
            store,
            queue: CharacterQueue::new(),
            timer: PacingTimer::new(pacing.tick_interval),
            chars_per_tick: pacing.chars_per_tick.max(1),
            received_any_delta: false,
            cancel,
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Opens the stream and consumes it. Never fails: every error is folded
    /// into the returned outcome after the message has been finalised.
    pub async fn run(mut self, api: &ApiClient, payload: &SendMessagePayload) -> SessionOutcome {
        let cancel = self.cancel.clone();
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            resp = api.open_message_stream(&self.conversation_id, payload) => resp,
        };
        match opened {
            Ok(resp) => self.consume(resp.bytes_stream()).await,
            Err(e) => self.finish(Err(e)),
        }
    }

    /// Consumes an already-open response body.
    pub async fn consume<S, B, E>(mut self, body: S) -> SessionOutcome
        where S: Stream<Item = Result<B, E>>, B: AsRef<[u8]>, E: Into<ClientError>
    {
        let result = self.pump(body).await;
        self.finish(result)
    }

    async fn pump<S, B, E>(&mut self, body: S) -> Result<(), ClientError>
        where S: Stream<Item = Result<B, E>>, B: AsRef<[u8]>, E: Into<ClientError>
    {
        futures::pin_mut!(body);
        let cancel = self.cancel.clone();
        let mut decoder = SseDecoder::new();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(ClientError::Cancelled);
                }
                _ = self.timer.tick() => {
                    self.reveal_next();
                }
                chunk = body.next() => {
                    match chunk {
                        Some(Ok(bytes)) => {
                            for payload in decoder.push(bytes.as_ref()) {
                                self.handle_payload(&payload)?;
                            }
                        }
                        Some(Err(e)) => {
                            return Err(e.into());
                        }
                        None => {
                            for payload in decoder.finish() {
                                self.handle_payload(&payload)?;
                            }
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    fn handle_payload(&mut self, payload: &str) -> Result<(), ClientError> {
        let event = match StreamEvent::parse(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!("Failed to parse stream chunk: {} (data: {})", e, payload);
                return Ok(());
            }
        };

        match event {
            StreamEvent::Delta { delta } => {
                self.received_any_delta = true;
                if let Some(delta) = delta {
                    self.enqueue(&delta);
                }
            }
            StreamEvent::Complete { answer, usage, latency_ms } => {
                if !self.received_any_delta {
                    if let Some(answer) = answer.as_ref().and_then(JsonValue::as_str) {
                        self.enqueue(answer);
                    }
                }
                if usage.is_some() || latency_ms.is_some() {
                    self.update(|msg| {
                        if let Some(usage) = &usage {
                            msg.metadata.insert("usage".to_string(), usage.clone());
                        }
                        if let Some(latency) = &latency_ms {
                            msg.metadata.insert("latency_ms".to_string(), latency.clone());
                        }
                    });
                }
            }
            StreamEvent::Saved { message_id } => {
                if let Some(id) = message_id.filter(|id| !id.is_empty()) {
                    self.adopt_server_id(&id);
                }
                let saved_at = Utc::now();
                self.update(|msg| {
                    msg.status = MessageStatus::Completed;
                    msg.timestamp = saved_at;
                });
            }
            StreamEvent::Error { error } => {
                let message = error
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| DEFAULT_STREAM_ERROR.to_string());
                return Err(ClientError::Server(message));
            }
            StreamEvent::Unknown => {
                debug!("Ignoring stream event of unknown type: {}", payload);
            }
        }
        Ok(())
    }

    fn adopt_server_id(&mut self, id: &str) {
        match self.server_id.as_deref() {
            None => {
                self.store.replace_message_id(&self.conversation_id, &self.local_id, id);
                self.server_id = Some(id.to_string());
            }
            Some(current) if current == id => {}
            Some(current) => {
                warn!("Ignoring saved event for {}; message already saved as {}", id, current);
            }
        }
    }

    fn enqueue(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.queue.push_str(text);
        self.timer.start();
    }

    fn reveal_next(&mut self) {
        let chunk = self.queue.take(self.chars_per_tick);
        if !chunk.is_empty() {
            self.append_content(&chunk);
        }
        if self.queue.is_empty() {
            self.timer.stop();
        }
    }

    fn flush(&mut self) {
        self.timer.stop();
        let rest = self.queue.drain_all();
        if !rest.is_empty() {
            self.append_content(&rest);
        }
    }

    fn append_content(&self, text: &str) {
        self.update(|msg| msg.content.push_str(text));
    }

    fn update(&self, mut updater: impl FnMut(&mut Message)) {
        if !self.store.update_message_by_id(&self.conversation_id, &self.local_id, &mut updater) {
            debug!(
                "Assistant message {} no longer present in conversation {}",
                self.local_id,
                self.conversation_id
            );
        }
    }

    fn finish(&mut self, result: Result<(), ClientError>) -> SessionOutcome {
        self.flush();
        let outcome = match result {
            Ok(()) =>
                SessionOutcome::Completed {
                    message_id: self.server_id.clone().unwrap_or_else(|| self.local_id.clone()),
                },
            Err(e) if e.is_abort() => SessionOutcome::Cancelled,
            Err(e) => SessionOutcome::Failed { message: e.to_string() },
        };
        self.store.mark_message_status(&self.conversation_id, &self.local_id, outcome.status());

        match &outcome {
            SessionOutcome::Completed { message_id } =>
                info!("Stream for conversation {} completed as {}", self.conversation_id, message_id),
            SessionOutcome::Cancelled =>
                info!("Stream for conversation {} cancelled", self.conversation_id),
            SessionOutcome::Failed { message } =>
                error!("Stream for conversation {} failed: {}", self.conversation_id, message),
        }
        outcome
    }
}
