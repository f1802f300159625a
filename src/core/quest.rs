use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::progression::apply_reward;
use super::record::UserRecord;
use crate::config::Tuning;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestKind {
    Bond,
    Obedience,
}

impl std::fmt::Display for QuestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuestKind::Bond => write!(f, "bond"),
            QuestKind::Obedience => write!(f, "obedience"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Quest {
    pub name: &'static str,
    pub kind: QuestKind,
    pub min_bond: f64,
    /// One line of narration per step.
    pub steps: &'static [&'static str],
}

pub const QUESTS: &[Quest] = &[
    Quest {
        name: "Prepare Tea",
        kind: QuestKind::Bond,
        min_bond: 0.0,
        steps: &[
            "Sebastian sets out the Wedgwood service and asks which leaves you would prefer this afternoon.",
            "The kettle sings. He watches, amused, as you warm the pot exactly as instructed.",
            "You pour. He tastes, pauses, and allows that it is very nearly acceptable.",
        ],
    },
    Quest {
        name: "Write Loyalty Letter",
        kind: QuestKind::Bond,
        min_bond: 3.0,
        steps: &[
            "A sheet of Phantomhive letterhead waits on the desk. \"Your pledge, if you please.\"",
            "He reads over your shoulder, correcting a flourish with one gloved finger.",
            "The wax seal cools. Sebastian tucks the letter away somewhere you will never find it.",
        ],
    },
    Quest {
        name: "Organize the Manor",
        kind: QuestKind::Obedience,
        min_bond: 2.0,
        steps: &[
            "The servants have made a ruin of the east wing. Sebastian hands you a list.",
            "Silverware, linens, the portrait gallery. He inspects each task with a raised brow.",
            "By nightfall the manor gleams. \"One hell of a staff,\" he murmurs.",
        ],
    },
    Quest {
        name: "Attend a Ball",
        kind: QuestKind::Bond,
        min_bond: 5.0,
        steps: &[
            "An invitation in black and gold. Sebastian is already measuring you for the occasion.",
            "The ballroom glitters. He leads the first dance without ever seeming to touch the floor.",
            "At midnight he bows. Every eye in the room follows you out.",
        ],
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuestError {
    #[error("no quest is available at the current bond")]
    NoEligibleQuest,
    #[error("no quest is in progress")]
    NoActiveQuest,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QuestProgress {
    Step { quest: &'static str, stage: u32 },
    Completed { quest: &'static str },
}

pub fn find_quest(name: &str) -> Option<&'static Quest> {
    QUESTS.iter().find(|q| q.name == name)
}

/// Narration for `stage`; the last template line repeats if the quest has more steps than lines.
pub fn step_text(quest: &Quest, stage: u32) -> String {
    let index = (stage as usize).min(quest.steps.len().saturating_sub(1));
    let line = quest.steps.get(index).copied().unwrap_or("Sebastian awaits your next move.");
    format!("**{}** (step {}): {}", quest.name, stage + 1, line)
}

pub fn image_prompt(quest: &Quest, stage: u32) -> String {
    format!(
        "Victorian gothic illustration, Black Butler style: {} (a {} quest, step {}). {}",
        quest.name,
        quest.kind,
        stage + 1,
        quest.steps.get(stage as usize).copied().unwrap_or("")
    )
}

fn first_eligible(record: &UserRecord) -> Option<&'static Quest> {
    QUESTS
        .iter()
        .find(|q| q.min_bond <= record.bond && !record.completed_quests.iter().any(|c| c == q.name))
}

/// Begins the first eligible catalog quest, replacing any quest in progress.
pub fn start_quest(mut record: UserRecord) -> Result<UserRecord, QuestError> {
    if QUESTS
        .iter()
        .all(|q| record.completed_quests.iter().any(|c| c == q.name))
    {
        record.completed_quests.clear();
    }

    let quest = first_eligible(&record).ok_or(QuestError::NoEligibleQuest)?;
    record.current_quest = Some(quest.name.to_string());
    record.quest_stage = 0;
    record.current_step_text = Some(step_text(quest, 0));
    record.current_step_image_url = None;
    Ok(record)
}

/// Moves the active quest one step forward, completing it after `quest_steps` steps.
pub fn advance_step(
    mut record: UserRecord,
    tuning: &Tuning,
) -> Result<(UserRecord, QuestProgress), QuestError> {
    let quest = record
        .current_quest
        .as_deref()
        .and_then(find_quest)
        .ok_or(QuestError::NoActiveQuest)?;

    record.quest_stage += 1;
    if record.quest_stage >= tuning.quest_steps {
        let mut record = apply_reward(record, tuning);
        record.current_quest = None;
        record.current_step_text = None;
        record.current_step_image_url = None;
        record.quest_stage = 0;
        record.story_progress += 1;
        record.completed_quests.push(quest.name.to_string());
        return Ok((record, QuestProgress::Completed { quest: quest.name }));
    }

    let stage = record.quest_stage;
    record.current_step_text = Some(step_text(quest, stage));
    Ok((record, QuestProgress::Step { quest: quest.name, stage }))
}
