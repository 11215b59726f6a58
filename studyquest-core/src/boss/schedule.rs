//! Respawn schedule and fight-duration formatting.
use chrono::{DateTime, Duration, Utc};

use crate::boss::{BossRoster, BossState};
use crate::error::{EngineError, RecordKind};
use crate::state::{PartyRecord, encode, fields, require};
use crate::store::{DocPath, DocumentStore, Patch};
use crate::{Clock, StudyQuestEngine};

/// First slot of the daily UTC schedule at least `cooldown` after `defeated_at`.
///
/// `spawn_hours` need not be sorted. An empty schedule spawns as soon as the
/// cooldown elapses.
#[must_use]
pub fn next_spawn_time(
    defeated_at: DateTime<Utc>,
    cooldown: Duration,
    spawn_hours: &[u32],
) -> DateTime<Utc> {
    let earliest = defeated_at + cooldown;
    let mut hours: Vec<u32> = spawn_hours.iter().copied().filter(|h| *h < 24).collect();
    hours.sort_unstable();
    hours.dedup();

    let mut day = earliest.date_naive();
    for _ in 0..2 {
        for hour in &hours {
            if let Some(slot) = day.and_hms_opt(*hour, 0, 0).map(|naive| naive.and_utc())
                && slot >= earliest
            {
                return slot;
            }
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    earliest
}

/// Human-readable fight length: `"2d 3h"`, `"5h 12m"` or `"42m"`.
#[must_use]
pub fn format_fight_duration(started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> String {
    let minutes = (ended_at - started_at).num_minutes().max(0);
    let days = minutes / (24 * 60);
    let hours = (minutes % (24 * 60)) / 60;
    let mins = minutes % 60;
    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {mins}m")
    } else {
        format!("{mins}m")
    }
}

/// Whether a defeated boss is due to be replaced at `now`.
#[must_use]
pub fn spawn_due(party: &PartyRecord, now: DateTime<Utc>) -> bool {
    !party.current_boss.is_alive
        && party
            .next_boss_spawns_at
            .is_some_and(|spawns_at| now >= spawns_at)
}

impl<S: DocumentStore, C: Clock> StudyQuestEngine<S, C> {
    /// Replace a defeated boss once its spawn time has passed.
    ///
    /// Returns the new boss, or `None` when nothing was due.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for an unknown party, or a store error.
    pub fn check_boss_spawn(&self, party_id: &str) -> Result<Option<BossState>, EngineError> {
        let now = self.now();
        let roster: &BossRoster = &self.config.roster;
        let path = DocPath::party(party_id);
        let spawned = self.store.run_transaction(|tx| {
            let party: PartyRecord = require(tx, &path, RecordKind::Party)?;
            if !spawn_due(&party, now) {
                return Ok::<_, EngineError>(None);
            }
            let boss = roster.spawn(roster.next_number(party.current_boss.boss_number), now);
            let encoded = encode(&path, &boss)?;
            tx.update(
                &path,
                Patch::new()
                    .set(fields::CURRENT_BOSS, encoded)
                    .set(fields::NEXT_BOSS_SPAWNS_AT, serde_json::Value::Null),
            );
            Ok(Some(boss))
        })?;
        match &spawned {
            Some(boss) => log::info!(
                "party {party_id} spawned boss #{} {} ({} hp)",
                boss.boss_number,
                boss.name,
                boss.max_health
            ),
            None => log::debug!("party {party_id} has no boss spawn due"),
        }
        Ok(spawned)
    }
}
