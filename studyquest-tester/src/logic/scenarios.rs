//! Seeded scenarios exercising the engine end to end.
//!
//! Each scenario builds its own in-memory store, drives the engine with a
//! deterministic RNG and clock, and fails with the first broken invariant.
use anyhow::{Context, Result, bail, ensure};
use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::thread;

use studyquest_core::constants::MAX_LEVEL;
use studyquest_core::{
    BandReward, Collection, DocPath, DocumentStore, EngineError, ErrorKind, FixedClock,
    MemoryStore, PARTIES, Patch, RewardsCatalog, StudyQuestEngine, UserRecord, exp_progress,
    level_from_total_exp, total_exp_for_level,
};

type Engine = StudyQuestEngine<MemoryStore, FixedClock>;

pub struct Scenario {
    pub key: &'static str,
    pub description: &'static str,
    pub run: fn(u64) -> Result<()>,
}

const SCENARIOS: &[Scenario] = &[
    Scenario {
        key: "level-curve",
        description: "Level thresholds round-trip and progress stays in range",
        run: level_curve,
    },
    Scenario {
        key: "loot-distribution",
        description: "Loot rolls land in each band at its configured odds",
        run: loot_distribution,
    },
    Scenario {
        key: "party-season",
        description: "Two weeks of logins, study and boss fights keep records consistent",
        run: party_season,
    },
    Scenario {
        key: "award-atomicity",
        description: "Failed or conflicting awards never leave partial state",
        run: award_atomicity,
    },
    Scenario {
        key: "boss-race",
        description: "Concurrent damage defeats a boss exactly once",
        run: boss_race,
    },
];

const LOOT_DRAWS: u32 = 20_000;
const LOOT_TOLERANCE: f64 = 0.02;
const SEASON_DAYS: u32 = 14;
const SEASON_PLAYERS: usize = 9;

pub fn list_scenarios() -> impl Iterator<Item = (&'static str, &'static str)> {
    SCENARIOS.iter().map(|s| (s.key, s.description))
}

pub fn get_scenario(name: &str) -> Option<&'static Scenario> {
    SCENARIOS.iter().find(|s| s.key == name)
}

pub fn all_scenario_keys() -> Vec<String> {
    SCENARIOS.iter().map(|s| s.key.to_string()).collect()
}

fn season_start() -> Result<DateTime<Utc>> {
    Utc.with_ymd_and_hms(2024, 9, 2, 8, 0, 0)
        .single()
        .context("invalid season start")
}

fn new_engine() -> Result<(Engine, FixedClock)> {
    let clock = FixedClock::new(season_start()?);
    let store = MemoryStore::with_clock(clock.clone());
    Ok((StudyQuestEngine::new(store, clock.clone()), clock))
}

fn register_players(engine: &Engine, ids: &[String]) -> Result<()> {
    let created = season_start()? - Duration::days(10);
    for id in ids {
        engine.register_user(&UserRecord::new(id, id, created))?;
    }
    Ok(())
}

fn level_curve(seed: u64) -> Result<()> {
    for level in 2..=MAX_LEVEL {
        let total = total_exp_for_level(level);
        ensure!(
            level_from_total_exp(total) == level,
            "threshold of level {level} ({total}) derives another level"
        );
        ensure!(
            level_from_total_exp(total - 1) == level - 1,
            "one below level {level} is not level {}",
            level - 1
        );
    }

    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let ceiling = total_exp_for_level(60);
    for _ in 0..1_000 {
        let exp = rng.gen_range(0..ceiling);
        let level = level_from_total_exp(exp);
        let progress = exp_progress(exp, level);
        ensure!(
            progress.current < progress.required,
            "exp {exp} shows {}/{} at level {level}",
            progress.current,
            progress.required
        );
        ensure!(
            (0.0..100.0).contains(&progress.percentage),
            "exp {exp} shows {:.2}%",
            progress.percentage
        );
    }
    Ok(())
}

fn loot_distribution(seed: u64) -> Result<()> {
    let catalog = RewardsCatalog::default_catalog();
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let collection = Collection::default();
    let mut counts = vec![0_u32; catalog.bands.len()];

    for _ in 0..LOOT_DRAWS {
        let reward = catalog.roll_reward(&collection, false, &mut rng);
        let index = catalog
            .bands
            .iter()
            .position(|band| band.contains(reward.roll))
            .with_context(|| format!("roll {} fell outside every band", reward.roll))?;
        let consistent = match catalog.bands[index].reward {
            BandReward::FlatXp => reward.rarity.is_none() && reward.booster.is_none(),
            BandReward::Booster => reward.rarity.is_none() && reward.booster.is_some(),
            BandReward::Cosmetic { rarity } => reward.rarity == Some(rarity),
        };
        ensure!(consistent, "roll {} paid {reward:?}", reward.roll);
        counts[index] += 1;
    }

    for (band, count) in catalog.bands.iter().zip(counts) {
        let expected = (band.end - band.start) / 100.0;
        let observed = f64::from(count) / f64::from(LOOT_DRAWS);
        ensure!(
            (observed - expected).abs() <= LOOT_TOLERANCE,
            "band [{}, {}) drew {observed:.4}, expected {expected:.2}",
            band.start,
            band.end
        );
    }
    Ok(())
}

fn party_season(seed: u64) -> Result<()> {
    let (engine, clock) = new_engine()?;
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let ids: Vec<String> = (0..SEASON_PLAYERS).map(|n| format!("p{n}")).collect();
    register_players(&engine, &ids)?;

    for day in 0..SEASON_DAYS {
        for id in &ids {
            if !rng.gen_bool(0.8) {
                continue;
            }
            engine.on_login(id)?;
            if rng.gen_bool(0.75) {
                let minutes = rng.gen_range(5..=75);
                let cards = rng.gen_range(0..=60);
                engine.finish_study_session(id, minutes, cards, &mut rng)?;
            }
        }
        if day == SEASON_DAYS / 2 {
            let mover = &ids[rng.gen_range(0..ids.len())];
            engine.leave_party(mover)?;
            engine.assign_user_to_party(mover)?;
        }
        clock.advance(Duration::days(1));
    }

    check_season_records(&engine, &ids)
}

fn check_season_records(engine: &Engine, ids: &[String]) -> Result<()> {
    let capacity = engine.config().schedule.max_party_members;
    let mut seated = 0_usize;
    for (party_id, _) in engine.store().list(PARTIES)? {
        let party = engine.party(&party_id)?;
        let members = engine.members(&party_id)?;
        ensure!(
            party.member_count <= capacity,
            "party {party_id} holds {} members",
            party.member_count
        );
        ensure!(
            usize::try_from(party.member_count)? == members.len(),
            "party {party_id} counts {} but lists {}",
            party.member_count,
            members.len()
        );
        ensure!(
            party.current_boss.current_health <= party.current_boss.max_health,
            "party {party_id} boss overhealed"
        );
        for member in &members {
            let user = engine.user(&member.user_id)?;
            ensure!(
                user.current_party_id.as_deref() == Some(party_id.as_str()),
                "{} is listed in {party_id} but points elsewhere",
                user.id
            );
            ensure!(
                (member.exp, member.level, member.health) == (user.exp, user.level, user.health),
                "member mirror of {} drifted",
                user.id
            );
        }
        seated += members.len();
    }

    let mut logged_in = 0_usize;
    for id in ids {
        let user = engine.user(id)?;
        ensure!(
            user.level == level_from_total_exp(user.exp),
            "{id} is level {} with {} exp",
            user.level,
            user.exp
        );
        ensure!(user.health > 0, "{id} was left dead");
        if user.current_party_id.is_some() {
            logged_in += 1;
        }
    }
    ensure!(
        seated == logged_in,
        "{seated} seats for {logged_in} seated players"
    );
    Ok(())
}

fn award_atomicity(seed: u64) -> Result<()> {
    let (engine, _) = new_engine()?;
    let id = "scribe".to_string();
    register_players(&engine, std::slice::from_ref(&id))?;
    let party_id = engine.assign_user_to_party(&id)?;
    let mut rng = ChaCha20Rng::seed_from_u64(seed);

    let before = engine.store().snapshot();
    engine.store().fail_writes_under("leaderboards/");
    match engine.award_xp(&id, rng.gen_range(1..=500)) {
        Ok(result) => bail!("award succeeded despite failing leaderboard: {result:?}"),
        Err(err) => ensure!(
            err.kind() == ErrorKind::Internal,
            "unexpected error kind: {err}"
        ),
    }
    ensure!(
        engine.store().snapshot() == before,
        "failed award left partial writes"
    );
    engine.store().clear_faults();

    let conflicts = u32::try_from(seed % 4)?;
    let amount = rng.gen_range(1..=500);
    engine.store().inject_conflicts(conflicts);
    engine.award_xp(&id, amount)?;
    let user = engine.user(&id)?;
    ensure!(
        user.exp == amount,
        "retried award applied {} instead of {amount}",
        user.exp
    );
    let member = engine
        .members(&party_id)?
        .into_iter()
        .next()
        .context("member record missing")?;
    ensure!(member.exp == amount, "member mirror holds {}", member.exp);

    let missing = engine.award_xp("nobody", 10);
    ensure!(
        matches!(missing, Err(EngineError::NotFound { .. })),
        "award to a missing user did not report NotFound"
    );
    Ok(())
}

fn with_retries<T>(mut op: impl FnMut() -> Result<T, EngineError>) -> Result<T> {
    for _ in 0..1_000 {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.kind() == ErrorKind::Transient => thread::yield_now(),
            Err(err) => return Err(err.into()),
        }
    }
    bail!("operation never settled")
}

fn boss_race(seed: u64) -> Result<()> {
    let (engine, _) = new_engine()?;
    let ids: Vec<String> = (0..6).map(|n| format!("racer{n}")).collect();
    register_players(&engine, &ids)?;
    let mut party_id = String::new();
    for id in &ids {
        party_id = engine.assign_user_to_party(id)?;
    }

    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let health = rng.gen_range(50..=400_u64);
    engine.store().update(
        &DocPath::party(&party_id),
        Patch::new().set("currentBoss.currentHealth", health),
    )?;

    let kills = AtomicU32::new(0);
    let landed = AtomicU64::new(0);
    let outcomes: Vec<Result<()>> = thread::scope(|scope| {
        let handles: Vec<_> = ids
            .iter()
            .map(|id| {
                let (engine, party_id, kills, landed) = (&engine, &party_id, &kills, &landed);
                scope.spawn(move || -> Result<()> {
                    for _ in 0..20 {
                        let outcome =
                            with_retries(|| engine.deal_boss_damage(party_id, id, 7, 1))?;
                        landed.fetch_add(outcome.damage_dealt, Ordering::SeqCst);
                        if outcome.defeated {
                            kills.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                    Ok(())
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(anyhow::anyhow!("damage thread panicked")))
            })
            .collect()
    });
    for outcome in outcomes {
        outcome?;
    }

    ensure!(
        kills.load(Ordering::SeqCst) == 1,
        "boss was defeated {} times",
        kills.load(Ordering::SeqCst)
    );
    ensure!(
        landed.load(Ordering::SeqCst) == health,
        "landed {} damage on a {health} hp boss",
        landed.load(Ordering::SeqCst)
    );
    let party = engine.party(&party_id)?;
    let results = party
        .last_boss_results
        .context("defeat left no results")?;
    ensure!(
        results.total_damage >= health,
        "rankings sum to {} below {health}",
        results.total_damage
    );
    ensure!(party.bosses_defeated == 1, "defeat counted twice");
    Ok(())
}
