use async_trait::async_trait;
use log::{ debug, warn };
use reqwest::{ Client as HttpClient, Response, header::{ HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE } };
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::{ ChatApi, ReadReceipt, SendReceipt };
use crate::error::{ ChatError, Result };
use crate::models::wire::{
    ChatDocumentResponse,
    ChatListResponse,
    CreateChatRequest,
    ReadResponse,
    SendMessageRequest,
    SendMessageResponse,
    ServerChat,
    WireMessage,
};

const DEFAULT_SEND_FAILURE: &str = "Failed to send message";

pub struct HttpChatApi {
    http: HttpClient,
    base_url: String,
}

impl HttpChatApi {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e|
                ChatError::Config(format!("Invalid auth token format: {}", e))
            )?
        );

        let http = HttpClient::builder().default_headers(headers).timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }

    async fn check(resp: Response) -> Result<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ChatError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn json<T: DeserializeOwned>(resp: Response) -> Result<T> {
        let resp = Self::check(resp).await?;
        Ok(resp.json::<T>().await?)
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn list_chats(&self) -> Result<Vec<ServerChat>> {
        let resp = self.http.get(self.url("/api/chat")).send().await?;
        let body: ChatListResponse = Self::json(resp).await?;
        if !body.success {
            return Err(ChatError::Rejected("chat list request was not successful".to_string()));
        }
        Ok(body.data.unwrap_or_default().chats)
    }

    async fn chat_messages(&self, chat_id: &str) -> Result<ServerChat> {
        let resp = self.http.get(self.url(&format!("/api/chat/{}/messages", chat_id))).send().await?;
        let body: ChatDocumentResponse = Self::json(resp).await?;
        Ok(body.into_chat())
    }

    async fn send_message(&self, chat_id: &str, content: &str) -> Result<SendReceipt> {
        let req = SendMessageRequest { chat_id, content };
        let resp = self.http.post(self.url("/api/chat/messages")).json(&req).send().await?;
        let body: SendMessageResponse = Self::json(resp).await?;

        if !body.success {
            let reason = body.message
                .as_ref()
                .and_then(|m| m.as_str())
                .unwrap_or(DEFAULT_SEND_FAILURE)
                .to_string();
            return Err(ChatError::Rejected(reason));
        }

        let message = match body.message {
            Some(value) if value.is_object() =>
                match serde_json::from_value::<WireMessage>(value) {
                    Ok(message) => Some(message),
                    Err(e) => {
                        warn!("Send confirmation carried an unreadable message: {}", e);
                        None
                    }
                }
            _ => None,
        };
        Ok(SendReceipt { message })
    }

    async fn mark_read(&self, chat_id: &str) -> Result<ReadReceipt> {
        let resp = self.http.post(self.url(&format!("/api/chat/{}/read", chat_id))).send().await?;
        let text = Self::check(resp).await?.text().await?;
        if text.trim().is_empty() {
            return Ok(ReadReceipt::default());
        }
        let body = match serde_json::from_str::<ReadResponse>(&text) {
            Ok(body) => body,
            Err(e) => {
                debug!("Read confirmation for {} was not JSON: {}", chat_id, e);
                ReadResponse::default()
            }
        };
        Ok(ReadReceipt { unread_count: body.unread_count })
    }

    async fn create_chat(&self, mechanic_id: &str) -> Result<ServerChat> {
        let req = CreateChatRequest { mechanic_id };
        let resp = self.http.post(self.url("/api/chat")).json(&req).send().await?;
        let body: ChatDocumentResponse = Self::json(resp).await?;
        Ok(body.into_chat())
    }
}
