//! Bot API client.
//!
//! Thin reqwest wrapper over the chat platform's HTTP API. The router only
//! depends on the [`ChatApi`] send seam, so handlers can be exercised against
//! a recording fake; polling and webhook registration need the full client.

pub mod types;

use std::path::Path;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::error::{Error, Result};
use types::{ApiResponse, Message, ReplyMarkup, SendMessage, Update, User};

/// Default API host; overridable in config for test servers.
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Outbound message surface the router depends on.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        markup: Option<ReplyMarkup>,
    ) -> Result<Message>;
}

/// HTTP client for the Bot API.
pub struct BotApi {
    base: String,
    token: SecretString,
    client: reqwest::Client,
}

impl BotApi {
    pub fn new(base: impl Into<String>, token: SecretString) -> Self {
        Self {
            base: base.into(),
            token,
            client: reqwest::Client::new(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.base.trim_end_matches('/'),
            self.token.expose_secret(),
            method
        )
    }

    /// POST a method call and unwrap the response envelope.
    async fn call<P, T>(&self, method: &str, params: &P) -> Result<T>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let resp = self
            .client
            .post(self.method_url(method))
            .json(params)
            .send()
            .await?;

        if resp.status() == StatusCode::FORBIDDEN {
            return Err(Error::Forbidden);
        }

        let envelope: ApiResponse<T> = resp.json().await?;
        envelope.into_result()
    }

    /// Identify the bot account the token belongs to.
    pub async fn get_me(&self) -> Result<User> {
        self.call("getMe", &json!({})).await
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<ReplyMarkup>,
    ) -> Result<Message> {
        self.call(
            "sendMessage",
            &SendMessage {
                chat_id,
                text: text.to_string(),
                reply_markup,
            },
        )
        .await
    }

    /// Long-poll for updates after `offset`. `timeout_s` keeps the HTTP
    /// request open server-side so an idle bot isn't busy-polling.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        limit: usize,
        timeout_s: u64,
    ) -> Result<Vec<Update>> {
        let mut params = json!({
            "limit": limit,
            "timeout": timeout_s,
        });
        if let Some(offset) = offset {
            params["offset"] = json!(offset);
        }
        self.call("getUpdates", &params).await
    }

    /// Register a webhook URL, optionally uploading a self-signed
    /// certificate for the platform to pin.
    pub async fn set_webhook(
        &self,
        url: &str,
        max_connections: usize,
        certificate: Option<&Path>,
    ) -> Result<bool> {
        let mut form = reqwest::multipart::Form::new()
            .text("url", url.to_string())
            .text("max_connections", max_connections.to_string());

        if let Some(cert) = certificate {
            let bytes = tokio::fs::read(cert).await?;
            let file_name = cert
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "certificate.pem".to_string());
            form = form.part(
                "certificate",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            );
        }

        let resp = self
            .client
            .post(self.method_url("setWebhook"))
            .multipart(form)
            .send()
            .await?;

        if resp.status() == StatusCode::FORBIDDEN {
            return Err(Error::Forbidden);
        }

        let envelope: ApiResponse<bool> = resp.json().await?;
        envelope.into_result()
    }

    /// Drop any registered webhook, so long polling can take over.
    pub async fn delete_webhook(&self) -> Result<bool> {
        self.call("deleteWebhook", &json!({})).await
    }
}

#[async_trait]
impl ChatApi for BotApi {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        markup: Option<ReplyMarkup>,
    ) -> Result<Message> {
        self.send_message(chat_id, text, markup).await
    }
}
