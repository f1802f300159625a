//! Event handling around the progression core.
//!
//! Each event is one unit of work: load the record, transform it in memory,
//! call the conversation adapter if needed, then save. Store calls run on the
//! blocking pool and the store lock is never held across an adapter call, so
//! two rapid messages from the same user may race and the later save wins.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::adapter::{ChatMessage, ConversationAdapter};
use crate::config::Tuning;
use crate::cooldown::CooldownGate;
use crate::core::error::{BotError, Result};
use crate::core::progression::{self, chat_transition, remember, tick_transition};
use crate::core::quest::{self, QuestError, QuestProgress};
use crate::core::record::{Mood, UserRecord};
use crate::core::store::RecordStore;
use crate::persona;

/// Explicit user commands, as opposed to free-form chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Status,
    Reward,
    Punish,
    StartQuest,
    Advance,
}

impl Command {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "status" => Some(Command::Status),
            "reward" => Some(Command::Reward),
            "punish" => Some(Command::Punish),
            "quest" => Some(Command::StartQuest),
            "advance" => Some(Command::Advance),
            _ => None,
        }
    }
}

/// What the platform layer renders back to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub title: Option<String>,
    pub text: String,
    pub mood: Mood,
    pub image_url: Option<String>,
}

impl Reply {
    fn plain(text: impl Into<String>, mood: Mood) -> Self {
        Reply {
            title: None,
            text: text.into(),
            mood,
            image_url: None,
        }
    }

    pub fn color(&self) -> u32 {
        self.mood.color()
    }
}

pub struct BotShell {
    store: Arc<Mutex<RecordStore>>,
    adapter: Arc<dyn ConversationAdapter>,
    cooldown: CooldownGate,
    tuning: Tuning,
    rng: Mutex<StdRng>,
}

impl BotShell {
    pub fn new(store: RecordStore, adapter: Arc<dyn ConversationAdapter>, tuning: Tuning) -> Self {
        Self::with_rng(store, adapter, tuning, StdRng::from_entropy())
    }

    pub fn with_rng(store: RecordStore, adapter: Arc<dyn ConversationAdapter>, tuning: Tuning, rng: StdRng) -> Self {
        BotShell {
            store: Arc::new(Mutex::new(store)),
            cooldown: CooldownGate::new(tuning.command_cooldown),
            adapter,
            tuning,
            rng: Mutex::new(rng),
        }
    }

    /// Runs `f` against the store on the blocking pool.
    async fn with_store<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&RecordStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || {
            let store = match store.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            f(&store)
        })
        .await?
    }

    pub async fn record(&self, server_id: &str, user_id: &str) -> Result<UserRecord> {
        let (server_id, user_id) = (server_id.to_string(), user_id.to_string());
        self.with_store(move |store| store.get(&server_id, &user_id)).await
    }

    fn store_failure(&self, context: &str, err: BotError) -> Reply {
        tracing::error!(error = %err, "{} failed", context);
        Reply::plain(persona::STORE_FAILURE_REPLY, Mood::Calm)
    }

    /// A free-form message addressed to the bot.
    pub async fn handle_chat(&self, server_id: &str, user_id: &str, content: &str) -> Reply {
        let loaded = {
            let (server, user) = (server_id.to_string(), user_id.to_string());
            let limit = self.tuning.message_history_limit;
            self.with_store(move |store| {
                let record = store.get(&server, &user)?;
                let log = store.recent_messages(&user, limit)?;
                Ok((record, log))
            })
            .await
        };
        let (record, log) = match loaded {
            Ok(pair) => pair,
            Err(e) => return self.store_failure("loading record", e),
        };

        let record = {
            let mut rng = match self.rng.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            chat_transition(record, Utc::now(), &self.tuning, &mut *rng)
        };
        let mut record = remember(record, content, self.tuning.long_memory_limit);

        let mut history = persona::history_messages(&log);
        history.push(ChatMessage::user(content));
        let generated = match self
            .adapter
            .generate_reply(&persona::system_prompt(&record), &history, self.tuning.chat_timeout)
            .await
        {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(user_id, error = %e, "reply generation failed, using fallback");
                None
            }
        };

        let saved = {
            let said = content.to_string();
            let answered = generated.clone();
            self.with_store(move |store| {
                let mut lines = vec![("user", said.as_str())];
                if let Some(text) = &answered {
                    lines.push(("assistant", text.as_str()));
                }
                store.save_turn(&mut record, &lines)?;
                Ok(record)
            })
            .await
        };
        let record = match saved {
            Ok(record) => record,
            Err(e) => return self.store_failure("saving chat turn", e),
        };

        tracing::info!(
            server_id,
            user_id,
            mood = %record.mood,
            bond = record.bond,
            "chat turn processed"
        );

        let text = generated.unwrap_or_else(|| persona::FALLBACK_REPLY.to_string());
        Reply::plain(text, record.mood)
    }

    /// A slash command. Subject to the per-user cooldown.
    pub async fn handle_command(&self, server_id: &str, user_id: &str, command: Command) -> Reply {
        if let Err(remaining) = self.cooldown.try_acquire(user_id, Instant::now()) {
            tracing::debug!(user_id, ?command, ?remaining, "command rejected by cooldown");
            return Reply::plain(persona::cooldown_reply(remaining), Mood::Calm);
        }

        let record = match self.record(server_id, user_id).await {
            Ok(record) => record,
            Err(e) => return self.store_failure("loading record", e),
        };

        let outcome = match command {
            Command::Status => {
                let mut reply = Reply::plain(persona::status_summary(&record), record.mood);
                reply.title = Some("Household ledger".to_string());
                reply.image_url = record.current_step_image_url.clone();
                return reply;
            }
            Command::Reward => {
                let record = progression::apply_reward(record, &self.tuning);
                let text = format!(
                    "A reward, then. Bond {:.2}, obedience {:.2}.",
                    record.bond, record.obedience
                );
                (record, Reply::plain(text, Mood::Calm))
            }
            Command::Punish => {
                let record = progression::apply_punishment(record, &self.tuning);
                let text = format!(
                    "Discipline has been administered. Obedience {:.2}, soul {:.2}.",
                    record.obedience, record.soul
                );
                (record, Reply::plain(text, Mood::Calm))
            }
            Command::StartQuest => match quest::start_quest(record) {
                Ok(record) => self.illustrate_step(record).await,
                Err(QuestError::NoEligibleQuest) => {
                    return Reply::plain(persona::NO_ELIGIBLE_QUEST_REPLY, Mood::Calm);
                }
                Err(e) => {
                    tracing::warn!(user_id, error = %e, "unexpected quest outcome");
                    return Reply::plain(persona::NO_ELIGIBLE_QUEST_REPLY, Mood::Calm);
                }
            },
            Command::Advance => match quest::advance_step(record, &self.tuning) {
                Ok((record, QuestProgress::Step { .. })) => self.illustrate_step(record).await,
                Ok((record, QuestProgress::Completed { quest })) => {
                    tracing::info!(user_id, quest, "quest completed");
                    let text = format!(
                        "**{}** is complete. Well done. Bond {:.2}, story {}.",
                        quest, record.bond, record.story_progress
                    );
                    (record, Reply::plain(text, Mood::Calm))
                }
                Err(_) => return Reply::plain(persona::NO_ACTIVE_QUEST_REPLY, Mood::Calm),
            },
        };

        let (record, mut reply) = outcome;
        let mut record = progression::check_self_preservation(progression::derive_personality(record));
        let saved = self
            .with_store(move |store| {
                store.save(&mut record)?;
                Ok(record)
            })
            .await;
        let record = match saved {
            Ok(record) => record,
            Err(e) => return self.store_failure("saving command", e),
        };
        tracing::info!(server_id, user_id, ?command, mood = %record.mood, "command processed");

        reply.mood = record.mood;
        reply
    }

    /// Fetches an illustration for the current quest step. A failed image leaves the field untouched.
    async fn illustrate_step(&self, mut record: UserRecord) -> (UserRecord, Reply) {
        let quest = match record.current_quest.as_deref().and_then(quest::find_quest) {
            Some(quest) => quest,
            None => {
                let text = record.current_step_text.clone().unwrap_or_default();
                return (record, Reply::plain(text, Mood::Calm));
            }
        };

        let prompt = quest::image_prompt(quest, record.quest_stage);
        match self.adapter.generate_image(&prompt, self.tuning.image_timeout).await {
            Ok(url) => record.current_step_image_url = Some(url),
            Err(e) => tracing::warn!(quest = quest.name, error = %e, "step illustration failed"),
        }

        let reply = Reply {
            title: Some(quest.name.to_string()),
            text: record.current_step_text.clone().unwrap_or_default(),
            mood: Mood::Calm,
            image_url: record.current_step_image_url.clone(),
        };
        (record, reply)
    }

    /// Scheduled decay over every stored record. Returns how many were updated.
    pub async fn tick(&self) -> Result<usize> {
        let tuning = self.tuning.clone();
        let updated = self
            .with_store(move |store| {
                let mut updated = 0;
                for record in store.all()? {
                    let mut record = tick_transition(record, &tuning);
                    match store.save(&mut record) {
                        Ok(()) => updated += 1,
                        Err(e) => tracing::error!(
                            server_id = %record.server_id,
                            user_id = %record.user_id,
                            error = %e,
                            "tick save failed"
                        ),
                    }
                }
                Ok(updated)
            })
            .await?;
        tracing::info!(updated, "scheduled tick applied");
        Ok(updated)
    }
}
