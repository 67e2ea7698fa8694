//! Conversation API client.
//!
//! `ConversationApi` is the seam the container talks to; `HttpConversationApi`
//! is the REST implementation used by the binary.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error};
use uuid::Uuid;

use crate::config::Config;
use crate::models::{Conversation, ConversationId, Message, MessageId, RequestId, RequestStatus};

/// Operations the conversation room needs from the backend
#[async_trait]
pub trait ConversationApi: Send + Sync {
    /// Fetch a fresh copy of the conversation
    async fn fetch_conversation(&self, conversation: &Conversation) -> Result<Conversation>;

    /// Fetch one page of history, newest first
    async fn get_messages(&self, conversation_id: ConversationId, page: u32) -> Result<Vec<Message>>;

    /// Mark a message read and return the server copy
    async fn mark_message_as_read(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
    ) -> Result<Message>;

    /// Post a message. The server may or may not echo the created record.
    async fn send_message(&self, conversation_id: ConversationId, text: &str) -> Result<Option<Message>>;

    /// Move the request attached to a conversation to a new status
    async fn change_request_status(&self, request_id: RequestId, status: RequestStatus) -> Result<()>;

    /// Approve the listing a conversation is about
    async fn approve_listing(&self, conversation: &Conversation) -> Result<()>;
}

/// REST client for the conversation API
#[derive(Clone)]
pub struct HttpConversationApi {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpConversationApi {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token: config.get_api_token(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.url(path);
        let request_id = Uuid::new_v4().to_string();
        debug!("[API] {} {} (request {})", method, url, request_id);

        let builder = self
            .client
            .request(method, url)
            .header("Accept", "application/json")
            .header("X-Request-Id", request_id);

        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<reqwest::Response> {
        let response = builder
            .send()
            .await
            .with_context(|| format!("{} request failed", what))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("[API] {} failed with HTTP {}: {}", what, status, error_text);
            return Err(anyhow!("{} API error {}: {}", what, status, error_text));
        }

        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder, what: &str) -> Result<T> {
        let response = self.send(builder, what).await?;
        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read {} response", what))?;
        serde_json::from_str(&text).with_context(|| format!("Failed to parse {} response", what))
    }
}

#[async_trait]
impl ConversationApi for HttpConversationApi {
    async fn fetch_conversation(&self, conversation: &Conversation) -> Result<Conversation> {
        let builder = self.request(Method::GET, &format!("conversations/{}", conversation.id));
        self.send_json(builder, "Fetch conversation").await
    }

    async fn get_messages(&self, conversation_id: ConversationId, page: u32) -> Result<Vec<Message>> {
        let builder = self
            .request(Method::GET, &format!("conversations/{}/messages", conversation_id))
            .query(&[("page", page)]);
        self.send_json(builder, "Get messages").await
    }

    async fn mark_message_as_read(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
    ) -> Result<Message> {
        let builder = self.request(
            Method::PUT,
            &format!("conversations/{}/messages/{}/read", conversation_id, message_id),
        );
        self.send_json(builder, "Mark message as read").await
    }

    async fn send_message(&self, conversation_id: ConversationId, text: &str) -> Result<Option<Message>> {
        let builder = self
            .request(Method::POST, &format!("conversations/{}/messages", conversation_id))
            .json(&serde_json::json!({ "body": text }));
        let response = self.send(builder, "Send message").await?;
        let body = response
            .text()
            .await
            .context("Failed to read Send message response")?;
        Ok(parse_sent_message(&body))
    }

    async fn change_request_status(&self, request_id: RequestId, status: RequestStatus) -> Result<()> {
        let builder = self
            .request(Method::PATCH, &format!("requests/{}", request_id))
            .json(&serde_json::json!({ "status": status.as_param() }));
        self.send(builder, "Change request status").await?;
        Ok(())
    }

    async fn approve_listing(&self, conversation: &Conversation) -> Result<()> {
        let builder = self.request(
            Method::POST,
            &format!("conversations/{}/approve_listing", conversation.id),
        );
        self.send(builder, "Approve listing").await?;
        Ok(())
    }
}

/// Created message from a send reply. 204s, empty bodies and other payloads
/// are accepted and yield `None`.
fn parse_sent_message(body: &str) -> Option<Message> {
    if body.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(body) {
        Ok(message) => Some(message),
        Err(e) => {
            debug!("[API] send reply is not a message: {}", e);
            None
        }
    }
}
