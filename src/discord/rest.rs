use serde_json::{json, Value};

use super::{DiscordError, DiscordResult, DISCORD_API};
use crate::shell::Reply;

/// Discord caps embed descriptions at 4096 characters.
const EMBED_DESCRIPTION_LIMIT: usize = 4000;

/// Slash commands registered on READY.
pub const SLASH_COMMANDS: &[(&str, &str)] = &[
    ("status", "Review your standing with Sebastian"),
    ("reward", "Reward your butler"),
    ("punish", "Discipline your butler"),
    ("quest", "Ask Sebastian for a task"),
    ("advance", "Carry your current task one step further"),
];

#[derive(Clone)]
pub struct DiscordRest {
    http: reqwest::Client,
    token: String,
    api_base: String,
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

/// Embed for a shell reply, coloured by mood.
pub fn embed(reply: &Reply) -> Value {
    let mut embed = json!({
        "description": truncate_chars(&reply.text, EMBED_DESCRIPTION_LIMIT),
        "color": reply.color(),
    });
    if let Some(title) = &reply.title {
        embed["title"] = json!(title);
    }
    if let Some(url) = &reply.image_url {
        embed["image"] = json!({ "url": url });
    }
    embed
}

impl DiscordRest {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base(token, DISCORD_API)
    }

    pub fn with_base(token: impl Into<String>, api_base: impl Into<String>) -> Self {
        DiscordRest {
            http: reqwest::Client::new(),
            token: token.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder, what: &str) -> DiscordResult<()> {
        let response = request
            .header("Authorization", format!("Bot {}", self.token))
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DiscordError::Protocol(format!("{} failed: {} {}", what, status, body)));
        }
        Ok(())
    }

    /// Overwrites the global command set for the application.
    pub async fn register_commands(&self, application_id: &str) -> DiscordResult<()> {
        let commands: Vec<Value> = SLASH_COMMANDS
            .iter()
            .map(|(name, description)| json!({ "name": name, "description": description, "type": 1 }))
            .collect();
        let url = format!("{}/applications/{}/commands", self.api_base, application_id);
        self.send(self.http.put(&url).json(&commands), "registering commands").await
    }

    pub async fn send_reply(&self, channel_id: &str, reply: &Reply) -> DiscordResult<()> {
        let url = format!("{}/channels/{}/messages", self.api_base, channel_id);
        let body = json!({ "embeds": [embed(reply)] });
        self.send(self.http.post(&url).json(&body), "sending message").await
    }

    pub async fn send_typing(&self, channel_id: &str) -> DiscordResult<()> {
        let url = format!("{}/channels/{}/typing", self.api_base, channel_id);
        self.send(self.http.post(&url), "sending typing").await
    }

    /// Acknowledges an interaction; the answer follows via [`Self::edit_interaction_reply`].
    pub async fn defer_interaction(&self, interaction_id: &str, token: &str) -> DiscordResult<()> {
        let url = format!("{}/interactions/{}/{}/callback", self.api_base, interaction_id, token);
        self.send(self.http.post(&url).json(&json!({ "type": 5 })), "deferring interaction")
            .await
    }

    pub async fn edit_interaction_reply(&self, application_id: &str, token: &str, reply: &Reply) -> DiscordResult<()> {
        let url = format!("{}/webhooks/{}/{}/messages/@original", self.api_base, application_id, token);
        let body = json!({ "embeds": [embed(reply)] });
        self.send(self.http.patch(&url).json(&body), "editing interaction reply")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::Mood;
    use httpmock::prelude::*;

    fn reply() -> Reply {
        Reply {
            title: Some("Prepare Tea".into()),
            text: "The kettle sings.".into(),
            mood: Mood::Wrathful,
            image_url: Some("https://example.com/tea.png".into()),
        }
    }

    #[test]
    fn test_embed_carries_mood_color_and_image() {
        let embed = embed(&reply());
        assert_eq!(embed["color"], json!(0xFF0000));
        assert_eq!(embed["title"], json!("Prepare Tea"));
        assert_eq!(embed["image"]["url"], json!("https://example.com/tea.png"));
    }

    #[test]
    fn test_long_text_is_truncated() {
        let text = "é".repeat(5000);
        let truncated = truncate_chars(&text, EMBED_DESCRIPTION_LIMIT);
        assert_eq!(truncated.chars().count(), EMBED_DESCRIPTION_LIMIT + 1);
        assert_eq!(truncate_chars("short", 10), "short");
    }

    #[tokio::test]
    async fn test_send_reply_posts_embed_with_bot_token() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/channels/c1/messages")
                    .header("Authorization", "Bot secret")
                    .body_contains("The kettle sings.");
                then.status(200).json_body(json!({"id": "m1"}));
            })
            .await;

        let rest = DiscordRest::with_base("secret", server.base_url());
        rest.send_reply("c1", &reply()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_request_is_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/applications/a1/commands");
                then.status(401).body("401: Unauthorized");
            })
            .await;

        let rest = DiscordRest::with_base("bad", server.base_url());
        let err = rest.register_commands("a1").await.unwrap_err();
        assert!(matches!(err, DiscordError::Protocol(_)));
    }
}
