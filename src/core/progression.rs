//! Turn-by-turn evolution of a [`UserRecord`].
//!
//! Every function here is an in-memory transform: it takes a record and
//! returns the updated record. Storage and the conversation adapter are the
//! caller's concern.

use chrono::{DateTime, Utc};
use rand::Rng;

use super::record::{Ending, Mood, UserRecord, MOODS};
use crate::config::Tuning;

/// Scheduled erosion of obedience and jealousy, floored at zero.
pub fn apply_decay(mut record: UserRecord, tuning: &Tuning) -> UserRecord {
    record.obedience = (record.obedience - tuning.obedience_decay).max(0.0);
    record.jealousy = (record.jealousy - tuning.jealousy_decay).max(0.0);
    record
}

/// The persona drifting on its own will. Unclamped; see [`chat_transition`].
pub fn apply_autonomous_thought<R: Rng + ?Sized>(mut record: UserRecord, rng: &mut R) -> UserRecord {
    record.bond += rng.gen_range(-0.1..0.2);
    record.obedience += rng.gen_range(-0.05..0.1);
    record
}

pub fn apply_reward(mut record: UserRecord, tuning: &Tuning) -> UserRecord {
    record.bond += tuning.bond_reward;
    record.obedience += tuning.obedience_reward;
    record.rewards += 1;
    record.soul += tuning.soul_gain;
    record
}

/// Discipline: obedience rises, bond and soul erode, corruption creeps in.
pub fn apply_punishment(mut record: UserRecord, tuning: &Tuning) -> UserRecord {
    record.punishments += 1;
    record.obedience += tuning.obedience_reward;
    record.bond = (record.bond - tuning.bond_reward).max(0.0);
    record.jealousy += tuning.jealousy_decay;
    record.soul -= tuning.soul_gain;
    record.corruption += tuning.soul_gain;
    record
}

/// Mood for a bond value: `MOODS[floor(bond) mod 4]`.
pub fn mood_for_bond(bond: f64) -> Mood {
    let index = (bond.floor() as i64).rem_euclid(MOODS.len() as i64);
    MOODS[index as usize]
}

pub fn derive_personality(mut record: UserRecord) -> UserRecord {
    record.mood = mood_for_bond(record.bond);
    record
}

/// Marks the record Destroyed once soul is exhausted. An existing ending is kept
/// as is, even if soul has since recovered.
pub fn check_self_preservation(mut record: UserRecord) -> UserRecord {
    if record.ending.is_none() && record.soul <= 0.0 {
        record.ending = Some(Ending::Destroyed);
    }
    record
}

pub fn is_decay_due(record: &UserRecord, now: DateTime<Utc>, tuning: &Tuning) -> bool {
    match chrono::Duration::from_std(tuning.story_event_interval) {
        Ok(interval) => now - record.last_seen >= interval,
        Err(_) => false,
    }
}

/// Appends a snippet, evicting the oldest entries beyond `cap`.
pub fn remember(mut record: UserRecord, snippet: impl Into<String>, cap: usize) -> UserRecord {
    record.memory.push(snippet.into());
    if record.memory.len() > cap {
        let overflow = record.memory.len() - cap;
        record.memory.drain(..overflow);
    }
    record
}

/// The default path for an incoming chat message.
pub fn chat_transition<R: Rng + ?Sized>(
    record: UserRecord,
    now: DateTime<Utc>,
    tuning: &Tuning,
    rng: &mut R,
) -> UserRecord {
    let record = if is_decay_due(&record, now, tuning) {
        apply_decay(record, tuning)
    } else {
        record
    };
    let mut record = apply_autonomous_thought(record, rng);
    record.bond = record.bond.max(0.0);
    record.obedience = record.obedience.max(0.0);
    check_self_preservation(derive_personality(record))
}

/// The scheduled tick applied to every stored record.
pub fn tick_transition(record: UserRecord, tuning: &Tuning) -> UserRecord {
    check_self_preservation(derive_personality(apply_decay(record, tuning)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn record() -> UserRecord {
        UserRecord::new("guild", "ciel")
    }

    #[test]
    fn test_mood_follows_floor_of_bond() {
        assert_eq!(mood_for_bond(0.0), Mood::Calm);
        assert_eq!(mood_for_bond(1.2), Mood::Protective);
        assert_eq!(mood_for_bond(2.99), Mood::Wrathful);
        assert_eq!(mood_for_bond(3.7), Mood::Mischievous);
        assert_eq!(mood_for_bond(4.0), Mood::Calm);
        assert_eq!(mood_for_bond(9.5), Mood::Protective);
        assert_eq!(mood_for_bond(-0.5), Mood::Mischievous);
    }

    #[test]
    fn test_derive_personality_is_idempotent() {
        let mut r = record();
        r.bond = 3.7;
        r.mood = Mood::Calm;
        let once = derive_personality(r);
        let twice = derive_personality(once.clone());
        assert_eq!(once.mood, Mood::Mischievous);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_decay_floors_at_zero() {
        let tuning = Tuning::default();
        let mut r = record();
        r.obedience = 0.02;
        r.jealousy = 1.0;
        let r = apply_decay(r, &tuning);
        assert_eq!(r.obedience, 0.0);
        assert!((r.jealousy - 0.97).abs() < 1e-9);
    }

    #[test]
    fn test_autonomous_thought_stays_within_draw_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let mut r = record();
            r.bond = 2.0;
            r.obedience = 1.0;
            let r = apply_autonomous_thought(r, &mut rng);
            assert!(r.bond >= 1.9 && r.bond < 2.2);
            assert!(r.obedience >= 0.95 && r.obedience < 1.1);
        }
    }

    #[test]
    fn test_reward_increments() {
        let r = apply_reward(record(), &Tuning::default());
        assert_eq!(r.bond, 0.5);
        assert_eq!(r.obedience, 0.3);
        assert_eq!(r.rewards, 1);
        assert!((r.soul - 0.03).abs() < 1e-9);
    }

    #[test]
    fn test_punishment_costs_soul_and_bond() {
        let tuning = Tuning::default();
        let mut r = record();
        r.bond = 0.2;
        r.soul = 1.0;
        let r = apply_punishment(r, &tuning);
        assert_eq!(r.punishments, 1);
        assert_eq!(r.bond, 0.0);
        assert!((r.soul - 0.97).abs() < 1e-9);
        assert!((r.corruption - 0.03).abs() < 1e-9);
        assert_eq!(r.rewards, 0);
    }

    #[test]
    fn test_ending_is_terminal() {
        let r = check_self_preservation(record());
        assert_eq!(r.ending, Some(Ending::Destroyed));

        let again = check_self_preservation(r.clone());
        assert_eq!(again.ending, Some(Ending::Destroyed));

        let mut recovered = again;
        recovered.soul = 5.0;
        let recovered = check_self_preservation(recovered);
        assert_eq!(recovered.ending, Some(Ending::Destroyed));
    }

    #[test]
    fn test_positive_soul_has_no_ending() {
        let mut r = record();
        r.soul = 0.01;
        assert!(check_self_preservation(r).ending.is_none());
    }

    #[test]
    fn test_memory_keeps_most_recent_entries() {
        let mut r = record();
        for i in 0..21 {
            r = remember(r, format!("line {}", i), 20);
        }
        assert_eq!(r.memory.len(), 20);
        assert_eq!(r.memory.first().map(String::as_str), Some("line 1"));
        assert_eq!(r.memory.last().map(String::as_str), Some("line 20"));
    }

    #[test]
    fn test_decay_due_after_interval() {
        let tuning = Tuning::default();
        let now = Utc::now();
        let mut r = record();
        r.last_seen = now - chrono::Duration::minutes(10);
        assert!(!is_decay_due(&r, now, &tuning));
        r.last_seen = now - chrono::Duration::minutes(45);
        assert!(is_decay_due(&r, now, &tuning));
    }

    #[test]
    fn test_chat_transition_clamps_and_derives() {
        let tuning = Tuning::default();
        let mut rng = StdRng::seed_from_u64(42);
        let now = Utc::now();
        for _ in 0..50 {
            let mut r = record();
            r.last_seen = now - chrono::Duration::hours(2);
            r.obedience = 0.01;
            r.soul = 1.0;
            let r = chat_transition(r, now, &tuning, &mut rng);
            assert!(r.bond >= 0.0);
            assert!(r.obedience >= 0.0);
            assert_eq!(r.mood, mood_for_bond(r.bond));
            assert!(r.ending.is_none());
        }
    }

    #[test]
    fn test_tick_transition_decays_and_derives() {
        let tuning = Tuning::default();
        let mut r = record();
        r.bond = 2.5;
        r.obedience = 1.0;
        r.soul = 1.0;
        r.mood = Mood::Calm;
        let r = tick_transition(r, &tuning);
        assert!((r.obedience - 0.95).abs() < 1e-9);
        assert_eq!(r.mood, Mood::Wrathful);
    }
}
