use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{DeliveryError, InlineButton, MessageTransport, OutgoingMessage};
use crate::store::MessageId;

#[derive(Clone)]
pub struct TelegramTransport {
    api_base: String,
    token: String,
    client: Client,
    timeout: Duration,
}

impl TelegramTransport {
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            token: token.into(),
            client: Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_thread_id: Option<i64>,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboard<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    link_preview_options: Option<LinkPreview<'a>>,
}

#[derive(Serialize)]
struct InlineKeyboard<'a> {
    inline_keyboard: &'a [Vec<InlineButton>],
}

#[derive(Serialize)]
struct LinkPreview<'a> {
    url: &'a str,
}

#[derive(Deserialize)]
struct BotReply<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

impl<T> BotReply<T> {
    fn into_result(self) -> Result<T, DeliveryError> {
        match (self.ok, self.result) {
            (true, Some(r)) => Ok(r),
            (true, None) => Err(DeliveryError::Malformed("ok without result".into())),
            (false, _) => Err(DeliveryError::Rejected(
                self.description.unwrap_or_else(|| "unknown error".into()),
            )),
        }
    }
}

#[derive(Deserialize)]
struct SentMessage {
    message_id: MessageId,
}

impl<'a> SendMessage<'a> {
    fn from_outgoing(msg: &'a OutgoingMessage) -> Self {
        Self {
            chat_id: msg.chat_id,
            message_thread_id: msg.thread_id,
            text: &msg.text,
            parse_mode: msg.html.then_some("HTML"),
            reply_markup: (!msg.keyboard.is_empty()).then(|| InlineKeyboard {
                inline_keyboard: &msg.keyboard,
            }),
            link_preview_options: msg.link_preview_url.as_deref().map(|url| LinkPreview { url }),
        }
    }
}

#[async_trait::async_trait]
impl MessageTransport for TelegramTransport {
    async fn send(&self, msg: &OutgoingMessage) -> Result<MessageId, DeliveryError> {
        let payload = SendMessage::from_outgoing(msg);
        let rsp = self
            .client
            .post(self.method_url("sendMessage"))
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await?;
        let status = rsp.status();
        let body = rsp.text().await?;
        let reply: BotReply<SentMessage> = serde_json::from_str(&body)
            .map_err(|e| DeliveryError::Malformed(format!("HTTP {status}: {e}")))?;
        reply.into_result().map(|m| m.message_id)
    }

    async fn answer_callback(&self, callback_id: &str, text: &str) -> Result<(), DeliveryError> {
        let body = serde_json::json!({ "callback_query_id": callback_id, "text": text });
        let rsp: BotReply<bool> = self
            .client
            .post(self.method_url("answerCallbackQuery"))
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?
            .json()
            .await
            .map_err(|e| DeliveryError::Malformed(e.to_string()))?;
        rsp.into_result().map(|_| ())
    }
}
