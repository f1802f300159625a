// Discord bridge
//
// Opens the gateway WebSocket, routes DMs and @mentions to the chat turn and
// slash commands to the command handlers, and replies through the REST API
// with embeds coloured by the user's mood.

pub mod gateway;
pub mod rest;

use serde::Deserialize;
use thiserror::Error;

pub use gateway::DiscordBridge;

pub const DISCORD_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";
pub const DISCORD_API: &str = "https://discord.com/api/v10";

/// Key used for records created from direct messages, which have no guild.
pub const DIRECT_MESSAGE_SERVER: &str = "dm";

#[derive(Debug, Error)]
pub enum DiscordError {
    #[error("gateway connection error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("REST error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("payload error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("gateway protocol error: {0}")]
    Protocol(String),

    /// Needs operator action (bad token, missing intents); reconnecting will not help.
    #[error("{0}")]
    Fatal(String),
}

pub type DiscordResult<T> = std::result::Result<T, DiscordError>;

// ── Gateway payloads ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct GatewayPayload {
    pub op: u8,
    pub d: Option<serde_json::Value>,
    pub s: Option<u64>,
    pub t: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReadyEvent {
    pub user: DiscordUser,
    pub application: ReadyApplication,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReadyApplication {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DiscordUser {
    pub id: String,
    pub username: String,
    pub bot: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DiscordMessage {
    pub channel_id: String,
    pub author: DiscordUser,
    pub content: String,
    pub guild_id: Option<String>,
    #[serde(default)]
    pub mentions: Vec<DiscordUser>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Interaction {
    pub id: String,
    pub application_id: String,
    #[serde(rename = "type")]
    pub kind: u8,
    pub token: String,
    pub guild_id: Option<String>,
    pub member: Option<InteractionMember>,
    pub user: Option<DiscordUser>,
    pub data: Option<InteractionData>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InteractionMember {
    pub user: DiscordUser,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InteractionData {
    pub name: String,
}

impl Interaction {
    /// Guild interactions carry the user under `member`, DMs under `user`.
    pub fn invoker(&self) -> Option<&DiscordUser> {
        self.member.as_ref().map(|m| &m.user).or(self.user.as_ref())
    }
}

impl DiscordMessage {
    pub fn mentions_user(&self, user_id: &str) -> bool {
        self.mentions.iter().any(|u| u.id == user_id)
    }

    /// Message text with any `<@id>` / `<@!id>` mention of the bot removed.
    pub fn content_without_mention(&self, bot_id: &str) -> String {
        self.content
            .replace(&format!("<@{}>", bot_id), "")
            .replace(&format!("<@!{}>", bot_id), "")
            .trim()
            .to_string()
    }
}
