use crate::auth::AuthContext;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::models::account::{ QuotaInfo, TelemetrySummary, UserProfile };
use crate::models::chat::{ ConversationOut, MessageOut };
use crate::models::stream::SendMessagePayload;
use log::{ debug, error };
use reqwest::{ header::AUTHORIZATION, Client as HttpClient, Method, Response, StatusCode };
use serde::de::DeserializeOwned;
use serde_json::{ json, Value as JsonValue };
use url::form_urlencoded;

const SESSION_EXPIRED: &str = "Session expired. Please sign in again.";

/// REST helper plus the stream opener for the chat backend.
#[derive(Clone)]
pub struct ApiClient {
    http: HttpClient,
    config: ClientConfig,
    auth: AuthContext,
}

impl ApiClient {
    pub fn new(config: ClientConfig, auth: AuthContext) -> Result<Self, ClientError> {
        let http = HttpClient::builder().build()?;
        Ok(Self { http, config, auth })
    }

    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    /// Plain JSON request with the configured timeout.
    ///
    /// Returns `Ok(None)` for 204 and for empty or unparseable bodies.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<JsonValue>,
        require_auth: bool
    ) -> Result<Option<T>, ClientError> {
        let token = self.auth.token();
        if require_auth && token.is_none() {
            return Err(ClientError::AuthRequired);
        }

        let url = self.config.endpoint_url(endpoint);
        let mut req = self.http.request(method.clone(), &url).timeout(self.config.request_timeout);
        if require_auth {
            if let Some(token) = &token {
                req = req.header(AUTHORIZATION, format!("Bearer {}", token));
            }
        }
        if let Some(body) = body {
            if method != Method::GET {
                req = req.json(&body);
            }
        }

        debug!("{} {}", method, url);
        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() { ClientError::Timeout } else { ClientError::Transport(e) }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let data = read_json_body(resp).await;
            return Err(self.request_error(status, data.as_ref()));
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let text = resp.text().await?;
        if text.is_empty() {
            return Ok(None);
        }
        match serde_json::from_str::<T>(&text) {
            Ok(data) => Ok(Some(data)),
            Err(e) => {
                error!("Failed to parse response JSON from {}: {}", url, e);
                Ok(None)
            }
        }
    }

    fn request_error(&self, status: StatusCode, data: Option<&JsonValue>) -> ClientError {
        let retry_after = data
            .filter(|_| status == StatusCode::TOO_MANY_REQUESTS)
            .and_then(|d| d.get("retryAfter"))
            .filter(|v| !v.is_null());
        let message = if status == StatusCode::UNAUTHORIZED {
            self.auth.invalidate();
            SESSION_EXPIRED.to_string()
        } else if let Some(msg) = data.and_then(|d| json_message(d, "error")) {
            msg
        } else if let Some(retry) = retry_after {
            format!(
                "Rate limit exceeded. Please wait {} seconds before trying again.",
                display_scalar(retry)
            )
        } else {
            status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
        };
        ClientError::Status { status: status.as_u16(), message }
    }

    /// Issues the streaming send. No timeout is applied; the caller owns
    /// cancellation. Non-2xx responses are turned into errors here.
    pub async fn open_message_stream(
        &self,
        conversation_id: &str,
        payload: &SendMessagePayload
    ) -> Result<Response, ClientError> {
        require_id(conversation_id, "conversationId")?;
        let url = self.config.endpoint_url(
            &format!("/api/v1/chat/conversations/{}/messages/stream", conversation_id)
        );

        let mut req = self.http.post(&url).json(payload);
        if let Some(token) = self.auth.token() {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        if status == StatusCode::UNAUTHORIZED {
            self.auth.invalidate();
        }
        let data = read_json_body(resp).await;
        let message = data
            .as_ref()
            .and_then(|d| json_message(d, "error").or_else(|| json_message(d, "detail")))
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        Err(ClientError::Status { status: status.as_u16(), message })
    }

    pub async fn list_conversations(&self) -> Result<Vec<ConversationOut>, ClientError> {
        Ok(
            self
                .request::<Vec<ConversationOut>>(
                    Method::GET,
                    "/api/v1/chat/conversations",
                    None,
                    true
                ).await?
                .unwrap_or_default()
        )
    }

    pub async fn list_messages(&self, conversation_id: &str) -> Result<Vec<MessageOut>, ClientError> {
        require_id(conversation_id, "conversationId")?;
        let endpoint = format!("/api/v1/chat/conversations/{}/messages", conversation_id);
        Ok(self.request::<Vec<MessageOut>>(Method::GET, &endpoint, None, true).await?.unwrap_or_default())
    }

    pub async fn create_conversation(
        &self,
        title: Option<&str>
    ) -> Result<ConversationOut, ClientError> {
        let body = match title.map(str::trim).filter(|t| !t.is_empty()) {
            Some(title) => json!({ "title": title }),
            None => json!({}),
        };
        self.request::<ConversationOut>(
            Method::POST,
            "/api/v1/chat/conversations",
            Some(body),
            true
        ).await?.ok_or_else(|| ClientError::Server("Invalid conversation response".to_string()))
    }

    /// Loads the signed-in user's profile and caches it on the auth context.
    pub async fn fetch_account(&self) -> Result<UserProfile, ClientError> {
        let profile = self
            .request::<UserProfile>(Method::GET, "/api/v1/settings/user", None, true).await?
            .ok_or_else(|| ClientError::Server("Invalid user profile response".to_string()))?;
        self.auth.set_profile(Some(profile.clone()));
        Ok(profile)
    }

    pub async fn quota_info(&self) -> Result<Option<QuotaInfo>, ClientError> {
        self.request::<QuotaInfo>(Method::GET, "/api/v1/quota/info", None, true).await
    }

    pub async fn telemetry_summary(
        &self,
        range: &str
    ) -> Result<Option<TelemetrySummary>, ClientError> {
        let query = form_urlencoded::Serializer::new(String::new()).append_pair("range", range).finish();
        let endpoint = format!("/api/v1/admin/analytics/summary?{}", query);
        self.request::<TelemetrySummary>(Method::GET, &endpoint, None, true).await
    }
}

fn require_id(value: &str, name: &str) -> Result<(), ClientError> {
    if value.trim().is_empty() {
        return Err(ClientError::InvalidArgument(format!("{} is required", name)));
    }
    Ok(())
}

async fn read_json_body(resp: Response) -> Option<JsonValue> {
    let text = resp.text().await.ok()?;
    if text.is_empty() {
        return None;
    }
    serde_json::from_str(&text).ok()
}

/// A non-empty string stored under `key`.
fn json_message(data: &JsonValue, key: &str) -> Option<String> {
    data.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn display_scalar(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_message_requires_non_empty_string() {
        let data = json!({"error": "quota_exceeded", "detail": [{"loc": "body"}], "blank": ""});
        assert_eq!(json_message(&data, "error").as_deref(), Some("quota_exceeded"));
        assert_eq!(json_message(&data, "detail"), None);
        assert_eq!(json_message(&data, "blank"), None);
    }

    #[test]
    fn unauthorized_invalidates_session() {
        let auth = AuthContext::new(Some("t".into()));
        let client = ApiClient::new(ClientConfig::default(), auth.clone()).unwrap();
        let err = client.request_error(StatusCode::UNAUTHORIZED, Some(&json!({"error": "x"})));
        assert_eq!(err.to_string(), SESSION_EXPIRED);
        assert!(auth.token().is_none());
    }

    #[test]
    fn rate_limit_message_includes_retry_hint() {
        let client = ApiClient::new(ClientConfig::default(), AuthContext::default()).unwrap();
        let err = client.request_error(StatusCode::TOO_MANY_REQUESTS, Some(&json!({"retryAfter": 30})));
        assert_eq!(
            err.to_string(),
            "Rate limit exceeded. Please wait 30 seconds before trying again."
        );
        let plain = client.request_error(StatusCode::BAD_GATEWAY, None);
        assert_eq!(plain.to_string(), "Bad Gateway");
    }
}
