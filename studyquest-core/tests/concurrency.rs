use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::thread;

use chrono::{DateTime, Duration, TimeZone, Utc};
use studyquest_core::{
    DocumentStore, EngineError, ErrorKind, FixedClock, MemoryStore, PARTIES, StudyQuestEngine,
    UserRecord,
};

type Engine = StudyQuestEngine<MemoryStore, FixedClock>;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
}

fn engine() -> Engine {
    let clock = FixedClock::new(start());
    StudyQuestEngine::new(MemoryStore::with_clock(clock.clone()), clock)
}

/// Re-run `op` while it fails with a transient error.
fn with_retries<T>(mut op: impl FnMut() -> Result<T, EngineError>) -> T {
    for _ in 0..1_000 {
        match op() {
            Ok(value) => return value,
            Err(err) if err.kind() == ErrorKind::Transient => thread::yield_now(),
            Err(err) => panic!("unexpected error: {err}"),
        }
    }
    panic!("operation never settled");
}

#[test]
fn concurrent_assignment_never_overfills_a_party() {
    let engine = engine();
    let ids: Vec<String> = (0..24).map(|n| format!("u{n:02}")).collect();
    for id in &ids {
        let user = UserRecord::new(id, id, start() - Duration::days(30));
        engine.register_user(&user).unwrap();
    }

    thread::scope(|scope| {
        for id in &ids {
            let engine = &engine;
            scope.spawn(move || with_retries(|| engine.assign_user_to_party(id)));
        }
    });

    let parties = engine.store().list(PARTIES).unwrap();
    let mut seated = 0;
    for (party_id, _) in &parties {
        let party = engine.party(party_id).unwrap();
        let members = engine.members(party_id).unwrap();
        assert!(party.member_count <= 6, "{party_id} has {}", party.member_count);
        assert_eq!(usize::try_from(party.member_count).unwrap(), members.len());
        seated += members.len();
    }
    assert_eq!(seated, ids.len());
    for id in &ids {
        let party_id = engine.user(id).unwrap().current_party_id.unwrap();
        assert!(engine.members(&party_id).unwrap().iter().any(|m| &m.user_id == id));
    }
}

#[test]
fn concurrent_damage_defeats_the_boss_exactly_once() {
    let engine = engine();
    let ids: Vec<String> = (0..6).map(|n| format!("hero{n}")).collect();
    let mut party_id = String::new();
    for id in &ids {
        let user = UserRecord::new(id, id, start() - Duration::days(30));
        engine.register_user(&user).unwrap();
        party_id = engine.assign_user_to_party(id).unwrap();
    }
    assert_eq!(engine.party(&party_id).unwrap().member_count, 6);

    let kills = AtomicU32::new(0);
    let landed = AtomicU64::new(0);
    thread::scope(|scope| {
        for id in &ids {
            let (engine, party_id, kills, landed) = (&engine, &party_id, &kills, &landed);
            scope.spawn(move || {
                for _ in 0..10 {
                    let outcome = with_retries(|| engine.deal_boss_damage(party_id, id, 10, 1));
                    landed.fetch_add(outcome.damage_dealt, Ordering::SeqCst);
                    if outcome.defeated {
                        kills.fetch_add(1, Ordering::SeqCst);
                    }
                }
            });
        }
    });

    assert_eq!(kills.load(Ordering::SeqCst), 1);
    assert_eq!(landed.load(Ordering::SeqCst), 500);
    let party = engine.party(&party_id).unwrap();
    assert!(!party.current_boss.is_alive);
    assert_eq!(party.bosses_defeated, 1);
    let results = party.last_boss_results.unwrap();
    assert_eq!(results.total_damage, 500);
    assert_eq!(results.rankings.len(), 6);
    assert!(results
        .rankings
        .windows(2)
        .all(|pair| pair[0].damage >= pair[1].damage));
}
