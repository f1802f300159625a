use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, error, info, warn};

use super::rest::DiscordRest;
use super::{
    DiscordError, DiscordMessage, DiscordResult, GatewayPayload, Interaction, ReadyEvent, DIRECT_MESSAGE_SERVER,
    DISCORD_GATEWAY_URL,
};
use crate::core::record::Mood;
use crate::liveness::Readiness;
use crate::persona;
use crate::shell::{BotShell, Command, Reply};

const MAX_RECONNECT_ATTEMPTS: u32 = 8;
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);
const DEFAULT_HEARTBEAT_MS: u64 = 41250;

/// GUILDS | GUILD_MESSAGES | DIRECT_MESSAGES | MESSAGE_CONTENT
const INTENTS: u64 = (1 << 0) | (1 << 9) | (1 << 12) | (1 << 15);

/// Application command interactions; pings and components are ignored.
const INTERACTION_APPLICATION_COMMAND: u8 = 2;

/// Exponential backoff: 1s, 2s, 4s ... capped at one minute.
pub fn reconnect_delay(attempt: u32) -> Duration {
    let secs = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    Duration::from_secs(secs).min(MAX_RECONNECT_DELAY)
}

pub struct DiscordBridge {
    token: String,
    shell: Arc<BotShell>,
    readiness: Readiness,
    rest: DiscordRest,
}

/// Per-connection state learned from READY.
#[derive(Default)]
struct Session {
    bot_id: Option<String>,
}

impl DiscordBridge {
    pub fn new(token: impl Into<String>, shell: Arc<BotShell>, readiness: Readiness) -> Self {
        let token = token.into();
        let rest = DiscordRest::new(token.clone());
        DiscordBridge {
            token,
            shell,
            readiness,
            rest,
        }
    }

    /// Keeps a gateway session alive until a fatal close or too many failed reconnects.
    pub async fn run(&self) -> DiscordResult<()> {
        let mut attempt: u32 = 0;
        loop {
            let result = self.run_gateway_loop(&mut attempt).await;
            self.readiness.set(false);
            match result {
                Ok(()) => {
                    info!("Gateway session ended, reconnecting");
                }
                Err(DiscordError::Fatal(msg)) => {
                    error!("Fatal gateway error: {}", msg);
                    return Err(DiscordError::Fatal(msg));
                }
                Err(e) => {
                    attempt += 1;
                    if attempt > MAX_RECONNECT_ATTEMPTS {
                        error!("Max reconnect attempts ({}) reached, giving up", MAX_RECONNECT_ATTEMPTS);
                        return Err(e);
                    }
                    let delay = reconnect_delay(attempt - 1);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, "Gateway error: {}, reconnecting", e);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn run_gateway_loop(&self, attempt: &mut u32) -> DiscordResult<()> {
        let (ws_stream, _) = connect_async(DISCORD_GATEWAY_URL).await?;
        let (mut write, mut read) = ws_stream.split();

        let hello = read
            .next()
            .await
            .ok_or_else(|| DiscordError::Protocol("gateway closed before Hello".into()))??;
        let hello: GatewayPayload = serde_json::from_str(hello.to_text()?)?;
        if hello.op != 10 {
            return Err(DiscordError::Protocol(format!("expected Hello (op 10), got op {}", hello.op)));
        }
        let heartbeat_ms = hello
            .d
            .as_ref()
            .and_then(|d| d["heartbeat_interval"].as_u64())
            .unwrap_or(DEFAULT_HEARTBEAT_MS);
        info!(heartbeat_ms, "Connected to gateway");

        let identify = json!({
            "op": 2,
            "d": {
                "token": self.token,
                "intents": INTENTS,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": "sebastian",
                    "device": "sebastian"
                }
            }
        });
        write.send(WsMessage::Text(identify.to_string())).await?;

        let sequence = Arc::new(AtomicU64::new(0));
        let write = Arc::new(tokio::sync::Mutex::new(write));
        let heartbeat_task = {
            let write = write.clone();
            let sequence = sequence.clone();
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(Duration::from_millis(heartbeat_ms)).await;
                    let seq = match sequence.load(Ordering::Relaxed) {
                        0 => serde_json::Value::Null,
                        s => json!(s),
                    };
                    let beat = json!({ "op": 1, "d": seq });
                    if let Err(e) = write.lock().await.send(WsMessage::Text(beat.to_string())).await {
                        warn!("Heartbeat send failed: {}", e);
                        break;
                    }
                }
            })
        };

        let mut session = Session::default();
        let result = loop {
            let msg = match read.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => break Err(e.into()),
                None => break Ok(()),
            };

            let text = match msg {
                WsMessage::Text(t) => t,
                WsMessage::Close(frame) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.to_string()))
                        .unwrap_or((0, String::new()));
                    break close_result(code, &reason);
                }
                _ => continue,
            };

            let payload: GatewayPayload = match serde_json::from_str(&text) {
                Ok(p) => p,
                Err(e) => {
                    debug!("Skipping undecodable gateway payload: {}", e);
                    continue;
                }
            };
            if let Some(s) = payload.s {
                sequence.store(s, Ordering::Relaxed);
            }

            match payload.op {
                0 => {
                    if payload.t.as_deref() == Some("READY") {
                        *attempt = 0;
                    }
                    self.dispatch(&mut session, payload);
                }
                7 => {
                    info!("Gateway requested reconnect");
                    break Ok(());
                }
                9 => break Err(DiscordError::Protocol("invalid session".into())),
                11 => debug!("Heartbeat acknowledged"),
                _ => {}
            }
        };

        heartbeat_task.abort();
        result
    }

    fn dispatch(&self, session: &mut Session, payload: GatewayPayload) {
        let Some(data) = payload.d else { return };
        match payload.t.as_deref() {
            Some("READY") => match serde_json::from_value::<ReadyEvent>(data) {
                Ok(ready) => {
                    info!(user = %ready.user.username, id = %ready.user.id, "Logged in");
                    session.bot_id = Some(ready.user.id);
                    self.readiness.set(true);
                    let rest = self.rest.clone();
                    let application_id = ready.application.id;
                    tokio::spawn(async move {
                        match rest.register_commands(&application_id).await {
                            Ok(()) => info!("Slash commands registered"),
                            Err(e) => error!("Command registration failed: {}", e),
                        }
                    });
                }
                Err(e) => warn!("Malformed READY event: {}", e),
            },
            Some("MESSAGE_CREATE") => {
                let Some(bot_id) = session.bot_id.as_deref() else { return };
                match serde_json::from_value::<DiscordMessage>(data) {
                    Ok(msg) => self.on_message(bot_id, msg),
                    Err(e) => debug!("Skipping malformed message: {}", e),
                }
            }
            Some("INTERACTION_CREATE") => match serde_json::from_value::<Interaction>(data) {
                Ok(interaction) => self.on_interaction(interaction),
                Err(e) => debug!("Skipping malformed interaction: {}", e),
            },
            _ => {}
        }
    }

    fn on_message(&self, bot_id: &str, msg: DiscordMessage) {
        if msg.author.bot.unwrap_or(false) {
            return;
        }
        let is_dm = msg.guild_id.is_none();
        if !is_dm && !msg.mentions_user(bot_id) {
            return;
        }
        let content = msg.content_without_mention(bot_id);
        if content.is_empty() {
            return;
        }

        let server_id = msg.guild_id.clone().unwrap_or_else(|| DIRECT_MESSAGE_SERVER.to_string());
        let user_id = msg.author.id.clone();
        let channel_id = msg.channel_id;
        let shell = self.shell.clone();
        let rest = self.rest.clone();
        debug!(server = %server_id, user = %user_id, "Chat message received");

        // Off the read loop so heartbeats keep flowing during the adapter call.
        tokio::spawn(async move {
            if let Err(e) = rest.send_typing(&channel_id).await {
                debug!("Typing indicator failed: {}", e);
            }
            let reply = shell.handle_chat(&server_id, &user_id, &content).await;
            if let Err(e) = rest.send_reply(&channel_id, &reply).await {
                error!(channel = %channel_id, "Failed to send reply: {}", e);
            }
        });
    }

    fn on_interaction(&self, interaction: Interaction) {
        if interaction.kind != INTERACTION_APPLICATION_COMMAND {
            return;
        }
        let Some(user_id) = interaction.invoker().map(|u| u.id.clone()) else {
            warn!("Interaction without an invoking user");
            return;
        };
        let server_id = interaction
            .guild_id
            .clone()
            .unwrap_or_else(|| DIRECT_MESSAGE_SERVER.to_string());
        let name = interaction.data.as_ref().map(|d| d.name.clone()).unwrap_or_default();
        let shell = self.shell.clone();
        let rest = self.rest.clone();

        tokio::spawn(async move {
            if let Err(e) = rest.defer_interaction(&interaction.id, &interaction.token).await {
                error!(command = %name, "Failed to defer interaction: {}", e);
                return;
            }
            let reply = match Command::from_name(&name) {
                Some(command) => shell.handle_command(&server_id, &user_id, command).await,
                None => {
                    warn!(command = %name, "Unknown command");
                    Reply {
                        title: None,
                        text: persona::UNKNOWN_COMMAND_REPLY.to_string(),
                        mood: Mood::Calm,
                        image_url: None,
                    }
                }
            };
            if let Err(e) = rest
                .edit_interaction_reply(&interaction.application_id, &interaction.token, &reply)
                .await
            {
                error!(command = %name, "Failed to deliver command reply: {}", e);
            }
        });
    }
}

/// Maps a gateway close frame onto the reconnect policy.
fn close_result(code: u16, reason: &str) -> DiscordResult<()> {
    match code {
        4004 => Err(DiscordError::Fatal("authentication failed (4004): invalid bot token".into())),
        4014 => Err(DiscordError::Fatal(
            "disallowed intents (4014): enable the Message Content intent for the bot".into(),
        )),
        0 | 1000 => {
            info!(code, "Gateway closed normally");
            Ok(())
        }
        _ => Err(DiscordError::Protocol(format!("gateway closed: code={} {}", code, reason))),
    }
}
