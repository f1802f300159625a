use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Personality label derived from bond. Order matters: index = floor(bond) mod 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Calm,
    Protective,
    Wrathful,
    Mischievous,
}

pub const MOODS: [Mood; 4] = [Mood::Calm, Mood::Protective, Mood::Wrathful, Mood::Mischievous];

impl Mood {
    /// Parse a stored label. Anything outside the enum is treated as calm.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "protective" => Mood::Protective,
            "wrathful" => Mood::Wrathful,
            "mischievous" => Mood::Mischievous,
            _ => Mood::Calm,
        }
    }

    /// Embed colour shown alongside replies.
    pub fn color(&self) -> u32 {
        match self {
            Mood::Calm => 0x808080,
            Mood::Protective => 0x800080,
            Mood::Wrathful => 0xFF0000,
            Mood::Mischievous => 0x006400,
        }
    }
}

impl std::fmt::Display for Mood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mood::Calm => write!(f, "calm"),
            Mood::Protective => write!(f, "protective"),
            Mood::Wrathful => write!(f, "wrathful"),
            Mood::Mischievous => write!(f, "mischievous"),
        }
    }
}

/// Terminal state of a relationship. Once set it is never cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ending {
    Destroyed,
}

impl std::fmt::Display for Ending {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ending::Destroyed => write!(f, "Destroyed"),
        }
    }
}

impl std::str::FromStr for Ending {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Destroyed" => Ok(Ending::Destroyed),
            other => Err(format!("unknown ending: {}", other)),
        }
    }
}

/// Persisted relationship/progression state for one user on one server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub server_id: String,
    pub user_id: String,

    pub obedience: f64,
    pub bond: f64,
    pub jealousy: f64,
    pub soul: f64,
    pub corruption: f64,

    pub punishments: u32,
    pub rewards: u32,
    pub story_progress: u32,
    pub quest_stage: u32,

    pub contract: bool,
    pub married: bool,
    pub true_demon: bool,

    pub mood: Mood,
    pub ending: Option<Ending>,

    pub current_quest: Option<String>,
    pub current_step_text: Option<String>,
    pub current_step_image_url: Option<String>,
    /// Quests finished during the current pass through the catalog.
    pub completed_quests: Vec<String>,

    /// Recent conversational snippets, oldest first.
    pub memory: Vec<String>,
    pub last_seen: DateTime<Utc>,
}

impl UserRecord {
    /// Zero-valued record for a user seen for the first time.
    pub fn new(server_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        UserRecord {
            server_id: server_id.into(),
            user_id: user_id.into(),
            obedience: 0.0,
            bond: 0.0,
            jealousy: 0.0,
            soul: 0.0,
            corruption: 0.0,
            punishments: 0,
            rewards: 0,
            story_progress: 0,
            quest_stage: 0,
            contract: false,
            married: false,
            true_demon: false,
            mood: Mood::Calm,
            ending: None,
            current_quest: None,
            current_step_text: None,
            current_step_image_url: None,
            completed_quests: Vec::new(),
            memory: Vec::new(),
            last_seen: Utc::now(),
        }
    }

    pub fn has_active_quest(&self) -> bool {
        self.current_quest.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_zero_valued_and_calm() {
        let record = UserRecord::new("guild", "user");
        assert_eq!(record.server_id, "guild");
        assert_eq!(record.user_id, "user");
        assert_eq!(record.bond, 0.0);
        assert_eq!(record.soul, 0.0);
        assert_eq!(record.rewards, 0);
        assert_eq!(record.mood, Mood::Calm);
        assert!(record.ending.is_none());
        assert!(record.memory.is_empty());
        assert!(!record.has_active_quest());
    }

    #[test]
    fn test_mood_labels_and_colors() {
        for mood in MOODS {
            assert_eq!(Mood::from_label(&mood.to_string()), mood);
        }
        assert_eq!(Mood::Protective.color(), 0x800080);
        assert_eq!(Mood::Mischievous.color(), 0x006400);
    }

    #[test]
    fn test_unknown_mood_falls_back_to_calm() {
        assert_eq!(Mood::from_label("melancholy"), Mood::Calm);
        assert_eq!(Mood::from_label(""), Mood::Calm);
        assert_eq!(Mood::from_label("melancholy").color(), 0x808080);
    }

    #[test]
    fn test_ending_round_trips_label() {
        assert_eq!("Destroyed".parse::<Ending>(), Ok(Ending::Destroyed));
        assert!("Ascended".parse::<Ending>().is_err());
    }
}
