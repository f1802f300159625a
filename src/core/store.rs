use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

use super::error::{BotError, Result};
use super::progression::derive_personality;
use super::record::{Ending, Mood, UserRecord};

const USER_COLUMNS: &str = "server_id, user_id, contract, married, obedience, bond, punishments, rewards, \
     jealousy, soul, corruption, mood, ending, true_demon, story_progress, current_quest, quest_stage, \
     current_step_text, current_step_image_url, completed_quests, last_seen, memory";

/// One line of the append-only message log.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedMessage {
    pub user_id: String,
    pub role: String,
    pub content: String,
}

/// SQLite-backed user records and message log.
///
/// Every call is synchronous and blocks on disk I/O; async callers run it on
/// the blocking pool.
pub struct RecordStore {
    conn: Connection,
}

impl RecordStore {
    /// Open (or create) the database at `db_path`
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::init(Connection::open(db_path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                server_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                contract INTEGER NOT NULL DEFAULT 0,
                married INTEGER NOT NULL DEFAULT 0,
                obedience REAL NOT NULL DEFAULT 0,
                bond REAL NOT NULL DEFAULT 0,
                punishments INTEGER NOT NULL DEFAULT 0,
                rewards INTEGER NOT NULL DEFAULT 0,
                jealousy REAL NOT NULL DEFAULT 0,
                soul REAL NOT NULL DEFAULT 0,
                corruption REAL NOT NULL DEFAULT 0,
                mood TEXT NOT NULL DEFAULT 'calm',
                ending TEXT,
                true_demon INTEGER NOT NULL DEFAULT 0,
                story_progress INTEGER NOT NULL DEFAULT 0,
                current_quest TEXT,
                quest_stage INTEGER NOT NULL DEFAULT 0,
                current_step_text TEXT,
                current_step_image_url TEXT,
                completed_quests TEXT NOT NULL DEFAULT '[]',
                last_seen TEXT NOT NULL,
                memory TEXT NOT NULL DEFAULT '[]',
                PRIMARY KEY (server_id, user_id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                user_id TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'user',
                content TEXT NOT NULL,
                timestamp TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_user ON messages(user_id, timestamp)",
            [],
        )?;

        Ok(Self { conn })
    }

    /// Fetch the record for (server, user), creating a zero-valued one on first access.
    pub fn get(&self, server_id: &str, user_id: &str) -> Result<UserRecord> {
        let sql = format!("SELECT {} FROM users WHERE server_id = ?1 AND user_id = ?2", USER_COLUMNS);
        let existing = self
            .conn
            .query_row(&sql, params![server_id, user_id], RawRecord::from_row)
            .optional()?;

        let record = match existing {
            Some(raw) => raw.into_record()?,
            None => {
                let mut record = UserRecord::new(server_id, user_id);
                self.save(&mut record)?;
                tracing::info!(server_id, user_id, "created user record");
                record
            }
        };

        Ok(derive_personality(record))
    }

    /// Upsert the whole record; stamps `last_seen` with the current time.
    pub fn save(&self, record: &mut UserRecord) -> Result<()> {
        upsert_record(&self.conn, record)
    }

    /// Saves a chat turn: the record and its log lines commit together or not at all.
    pub fn save_turn(&self, record: &mut UserRecord, messages: &[(&str, &str)]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let stamped = record.last_seen;
        let written = upsert_record(&tx, record).and_then(|_| {
            messages
                .iter()
                .try_for_each(|(role, content)| insert_message(&tx, &record.user_id, role, content))
        });
        match written {
            Ok(()) => {
                tx.commit()?;
                Ok(())
            }
            Err(e) => {
                // dropping tx rolls back; keep the in-memory stamp consistent with disk
                record.last_seen = stamped;
                Err(e)
            }
        }
    }

    /// Every stored record, for the scheduled tick.
    pub fn all(&self) -> Result<Vec<UserRecord>> {
        let sql = format!("SELECT {} FROM users ORDER BY server_id, user_id", USER_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let raws = stmt
            .query_map([], RawRecord::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        raws.into_iter()
            .map(|raw| raw.into_record().map(derive_personality))
            .collect()
    }

    /// The last `limit` logged messages for a user, oldest first.
    pub fn recent_messages(&self, user_id: &str, limit: usize) -> Result<Vec<LoggedMessage>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, role, content FROM messages
             WHERE user_id = ?1
             ORDER BY rowid DESC
             LIMIT ?2",
        )?;

        let mut messages = stmt
            .query_map(params![user_id, limit as i64], |row| {
                Ok(LoggedMessage {
                    user_id: row.get(0)?,
                    role: row.get(1)?,
                    content: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        messages.reverse();
        Ok(messages)
    }
}

fn upsert_record(conn: &Connection, record: &mut UserRecord) -> Result<()> {
    record.last_seen = Utc::now();
    let sql = format!(
        "INSERT OR REPLACE INTO users ({}) VALUES \
         (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)",
        USER_COLUMNS
    );
    conn.execute(
        &sql,
        params![
            &record.server_id,
            &record.user_id,
            record.contract,
            record.married,
            record.obedience,
            record.bond,
            record.punishments,
            record.rewards,
            record.jealousy,
            record.soul,
            record.corruption,
            record.mood.to_string(),
            record.ending.map(|e| e.to_string()),
            record.true_demon,
            record.story_progress,
            &record.current_quest,
            record.quest_stage,
            &record.current_step_text,
            &record.current_step_image_url,
            serde_json::to_string(&record.completed_quests)?,
            record.last_seen.to_rfc3339(),
            serde_json::to_string(&record.memory)?,
        ],
    )?;
    Ok(())
}

fn insert_message(conn: &Connection, user_id: &str, role: &str, content: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO messages (user_id, role, content, timestamp) VALUES (?1, ?2, ?3, ?4)",
        params![user_id, role, content, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

fn parse_timestamp(raw: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e)))
}

/// Row as stored, before JSON and enum columns are decoded.
struct RawRecord {
    record: UserRecord,
    mood: String,
    ending: Option<String>,
    completed_quests: String,
    memory: String,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let last_seen: String = row.get(20)?;
        let record = UserRecord {
            server_id: row.get(0)?,
            user_id: row.get(1)?,
            contract: row.get(2)?,
            married: row.get(3)?,
            obedience: row.get(4)?,
            bond: row.get(5)?,
            punishments: row.get(6)?,
            rewards: row.get(7)?,
            jealousy: row.get(8)?,
            soul: row.get(9)?,
            corruption: row.get(10)?,
            mood: Mood::Calm,
            ending: None,
            true_demon: row.get(13)?,
            story_progress: row.get(14)?,
            current_quest: row.get(15)?,
            quest_stage: row.get(16)?,
            current_step_text: row.get(17)?,
            current_step_image_url: row.get(18)?,
            completed_quests: Vec::new(),
            memory: Vec::new(),
            last_seen: parse_timestamp(&last_seen, 20)?,
        };

        Ok(RawRecord {
            record,
            mood: row.get(11)?,
            ending: row.get(12)?,
            completed_quests: row.get(19)?,
            memory: row.get(21)?,
        })
    }

    fn into_record(self) -> Result<UserRecord> {
        let mut record = self.record;
        record.mood = Mood::from_label(&self.mood);
        record.ending = match self.ending {
            Some(label) => Some(label.parse::<Ending>().map_err(BotError::Parse)?),
            None => None,
        };
        record.completed_quests = serde_json::from_str(&self.completed_quests)?;
        record.memory = serde_json::from_str(&self.memory)?;
        Ok(record)
    }
}
