//! Telegram updates → control actions (start/stop scraping, block author).

use serde::Deserialize;

use crate::ingest::types::ChatId;
use crate::notify::BlockAction;

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    #[serde(default)]
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: ChatId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
}

impl Command {
    /// `/scrape` or `/stop`, optionally addressed as `/scrape@SomeBot`.
    pub fn parse(text: &str) -> Option<Self> {
        let first = text.split_whitespace().next()?;
        let cmd = first.split('@').next().unwrap_or(first);
        match cmd {
            "/scrape" | "/start_scraper" => Some(Command::Start),
            "/stop" | "/stop_scraper" => Some(Command::Stop),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Lifecycle {
        chat_id: ChatId,
        user_id: Option<i64>,
        command: Command,
    },
    Block {
        chat_id: Option<ChatId>,
        user_id: i64,
        callback_id: String,
        block: BlockAction,
    },
    Ignore,
}

impl Action {
    pub fn from_update(update: &Update) -> Self {
        if let Some(cb) = &update.callback_query {
            let Some(block) = cb.data.as_deref().and_then(BlockAction::parse) else {
                return Action::Ignore;
            };
            return Action::Block {
                chat_id: cb.message.as_ref().map(|m| m.chat.id),
                user_id: cb.from.id,
                callback_id: cb.id.clone(),
                block,
            };
        }

        if let Some(msg) = &update.message {
            if let Some(command) = msg.text.as_deref().and_then(Command::parse) {
                return Action::Lifecycle {
                    chat_id: msg.chat.id,
                    user_id: msg.from.as_ref().map(|u| u.id),
                    command,
                };
            }
        }

        Action::Ignore
    }
}
