use std::time::Duration;

use crate::adapter::ChatMessage;
use crate::core::record::{Ending, Mood, UserRecord};
use crate::core::store::LoggedMessage;

pub const SYSTEM_PROMPT: &str = "You are Sebastian Michaelis from Black Butler. Elegant, aristocratic, subtly cruel. Remain in character.";

/// Said when the model is unreachable; the turn still counts.
pub const FALLBACK_REPLY: &str = "Forgive me, my lord. Even a butler must occasionally gather his thoughts. Ask me again in a moment.";

pub const STORE_FAILURE_REPLY: &str = "A small disorder in the household ledgers. Please try again shortly.";

/// Said while a user's command is cooling down.
pub fn cooldown_reply(remaining: Duration) -> String {
    let secs = remaining.as_secs_f64().ceil().max(1.0) as u64;
    let unit = if secs == 1 { "second" } else { "seconds" };
    format!("Patience, my lord. A proper butler does not rush. Ask again in {} {}.", secs, unit)
}

pub const NO_ELIGIBLE_QUEST_REPLY: &str = "There is nothing I would entrust to you just yet. Earn a little more of my regard first.";

pub const NO_ACTIVE_QUEST_REPLY: &str = "You have no task in hand. Shall I find you one?";

pub const UNKNOWN_COMMAND_REPLY: &str = "I am afraid that order is not one I recognise.";

fn mood_directive(mood: Mood) -> &'static str {
    match mood {
        Mood::Calm => "You are composed and quietly attentive.",
        Mood::Protective => "You are protective of your master and sharp with anyone who threatens them.",
        Mood::Wrathful => "Your patience is thin; courtesy barely masks your contempt.",
        Mood::Mischievous => "You are playful and teasing, enjoying your master's discomfort.",
    }
}

/// System prompt for this user's turn, coloured by the record's state.
pub fn system_prompt(record: &UserRecord) -> String {
    let mut prompt = format!(
        "{}\n{}\nRelationship: bond {:.2}, obedience {:.2}, jealousy {:.2}, soul {:.2}.",
        SYSTEM_PROMPT,
        mood_directive(record.mood),
        record.bond,
        record.obedience,
        record.jealousy,
        record.soul,
    );

    if record.contract {
        prompt.push_str("\nYou are bound to this user by a contract.");
    }
    if let Some(Ending::Destroyed) = record.ending {
        prompt.push_str("\nThis user's soul is spent. Speak to them as one already lost.");
    }
    if let Some(quest) = &record.current_quest {
        prompt.push_str(&format!("\nThey are currently on the task \"{}\".", quest));
    }
    if !record.memory.is_empty() {
        prompt.push_str("\nThings you remember about them:\n");
        for snippet in &record.memory {
            prompt.push_str("- ");
            prompt.push_str(snippet);
            prompt.push('\n');
        }
    }
    prompt
}

/// Replays the logged turns; anything not written by the bot counts as the user.
pub fn history_messages(log: &[LoggedMessage]) -> Vec<ChatMessage> {
    log.iter()
        .map(|m| match m.role.as_str() {
            "assistant" => ChatMessage::assistant(m.content.as_str()),
            _ => ChatMessage::user(m.content.as_str()),
        })
        .collect()
}

/// Multi-line summary used by `/status` and the CLI.
pub fn status_summary(record: &UserRecord) -> String {
    let mut lines = vec![
        format!("Mood: {}", record.mood),
        format!(
            "Bond {:.2} | Obedience {:.2} | Jealousy {:.2}",
            record.bond, record.obedience, record.jealousy
        ),
        format!("Soul {:.2} | Corruption {:.2}", record.soul, record.corruption),
        format!(
            "Rewards {} | Punishments {} | Story {}",
            record.rewards, record.punishments, record.story_progress
        ),
    ];

    match &record.current_quest {
        Some(quest) => lines.push(format!("Quest: {} (stage {})", quest, record.quest_stage)),
        None => lines.push("Quest: none".to_string()),
    }
    if let Some(ending) = record.ending {
        lines.push(format!("Ending: {}", ending));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_reflects_mood_and_memory() {
        let mut record = UserRecord::new("guild", "ciel");
        record.mood = Mood::Wrathful;
        record.memory = vec!["prefers Earl Grey".into()];
        record.current_quest = Some("Prepare Tea".into());

        let prompt = system_prompt(&record);
        assert!(prompt.starts_with(SYSTEM_PROMPT));
        assert!(prompt.contains("patience is thin"));
        assert!(prompt.contains("- prefers Earl Grey"));
        assert!(prompt.contains("Prepare Tea"));
    }

    #[test]
    fn test_status_summary_mentions_ending() {
        let mut record = UserRecord::new("guild", "ciel");
        record.ending = Some(Ending::Destroyed);
        let summary = status_summary(&record);
        assert!(summary.contains("Mood: calm"));
        assert!(summary.contains("Quest: none"));
        assert!(summary.contains("Ending: Destroyed"));
    }

    #[test]
    fn test_history_keeps_roles_and_order() {
        let log = vec![
            LoggedMessage { user_id: "ciel".into(), role: "user".into(), content: "Tea?".into() },
            LoggedMessage { user_id: "ciel".into(), role: "assistant".into(), content: "At once.".into() },
            LoggedMessage { user_id: "ciel".into(), role: "system".into(), content: "odd".into() },
        ];
        let history = history_messages(&log);
        assert_eq!(history[0], ChatMessage::user("Tea?"));
        assert_eq!(history[1], ChatMessage::assistant("At once."));
        assert_eq!(history[2].role, "user");
    }

    #[test]
    fn test_cooldown_reply_rounds_up() {
        assert!(cooldown_reply(Duration::from_millis(5200)).contains("6 seconds"));
        assert!(cooldown_reply(Duration::ZERO).contains("1 second."));
    }
}
