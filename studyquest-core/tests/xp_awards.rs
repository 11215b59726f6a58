use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::de::DeserializeOwned;
use studyquest_core::{
    BoosterGrant, Cosmetic, CosmeticKind, DailySession, DocPath, DocumentStore, EngineError,
    ErrorKind, FixedClock, LeaderboardEntry, MemoryStore, Rarity, SessionRewards,
    StudyQuestEngine, UserRecord, day_key, month_id, week_id,
};

type Engine = StudyQuestEngine<MemoryStore, FixedClock>;

const GRANT: BoosterGrant = BoosterGrant {
    multiplier: 2,
    duration_minutes: 20,
};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
}

fn engine() -> (Engine, FixedClock) {
    let clock = FixedClock::new(start());
    let store = MemoryStore::with_clock(clock.clone());
    (StudyQuestEngine::new(store, clock.clone()), clock)
}

fn player(id: &str) -> UserRecord {
    UserRecord::new(id, &format!("Player {id}"), start() - Duration::days(30))
}

fn doc<T: DeserializeOwned>(engine: &Engine, path: &DocPath) -> Option<T> {
    engine
        .store()
        .get(path)
        .unwrap()
        .map(|value| serde_json::from_value(value).unwrap())
}

fn booster_rewards(count: usize) -> SessionRewards {
    SessionRewards {
        rolls: u32::try_from(count).unwrap(),
        boosters: vec![GRANT; count],
        ..SessionRewards::default()
    }
}

#[test]
fn first_award_levels_up_and_fans_out() {
    let (engine, _) = engine();
    engine.register_user(&player("u1")).unwrap();

    let result = engine.award_xp("u1", 100).unwrap();
    assert!(result.success);
    assert!(result.leveled_up);
    assert_eq!(result.xp_gain, 100);
    assert_eq!(result.multiplier, 1);
    assert_eq!(result.new_level, 2);
    assert_eq!(result.levels_gained, 1);
    assert_eq!(result.coin_bonus, 50);
    assert!(result.unlocked_titles.is_empty());

    let user = engine.user("u1").unwrap();
    assert_eq!((user.exp, user.level, user.coins), (100, 2, 50));

    let day: DailySession = doc(&engine, &DocPath::daily_session("u1", &day_key(start()))).unwrap();
    assert_eq!(day.date, "2024-03-04");
    assert_eq!(day.exp_earned, 100);

    assert_eq!(week_id(start()), "2024-W10");
    for path in [
        DocPath::weekly_entry(&week_id(start()), "u1"),
        DocPath::monthly_entry(&month_id(start()), "u1"),
    ] {
        let entry: LeaderboardEntry = doc(&engine, &path).unwrap();
        assert_eq!(entry.user_id, "u1");
        assert_eq!(entry.exp, 100);
        assert_eq!(entry.level, 2);
        assert_eq!(entry.display_name, "Player u1");
        assert!(!entry.is_pro);
        assert_eq!(entry.title, None);
        assert_eq!(entry.updated_at, Some(start()));
    }
}

#[test]
fn small_awards_accumulate_without_coins() {
    let (engine, _) = engine();
    engine.register_user(&player("u1")).unwrap();

    for _ in 0..2 {
        let result = engine.award_xp("u1", 30).unwrap();
        assert!(!result.leveled_up);
        assert_eq!(result.coin_bonus, 0);
    }
    let user = engine.user("u1").unwrap();
    assert_eq!((user.exp, user.level, user.coins), (60, 1, 0));
    let entry: LeaderboardEntry =
        doc(&engine, &DocPath::weekly_entry(&week_id(start()), "u1")).unwrap();
    assert_eq!(entry.exp, 60);
    let day: DailySession = doc(&engine, &DocPath::daily_session("u1", &day_key(start()))).unwrap();
    assert_eq!(day.exp_earned, 60);
}

#[test]
fn party_member_mirror_follows_awards() {
    let (engine, _) = engine();
    engine.register_user(&player("u1")).unwrap();
    let party_id = engine.assign_user_to_party("u1").unwrap();

    engine.award_xp("u1", 215).unwrap();
    let members = engine.members(&party_id).unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].exp, 215);
    assert_eq!(members[0].level, 3);
}

#[test]
fn milestone_titles_unlock_once() {
    let (engine, _) = engine();
    engine.register_user(&player("u1")).unwrap();

    let result = engine.award_xp("u1", 499).unwrap();
    assert_eq!(result.new_level, 5);
    assert_eq!(result.levels_gained, 4);
    assert_eq!(result.coin_bonus, 200);
    assert_eq!(result.unlocked_titles, vec!["title_apprentice".to_string()]);
    assert!(engine.user("u1").unwrap().unlocked_titles.contains("title_apprentice"));

    let result = engine.award_xp("u1", 1_000).unwrap();
    assert_eq!(result.new_level, 8);
    assert!(result.unlocked_titles.is_empty());
    assert_eq!(engine.user("u1").unwrap().unlocked_titles.len(), 1);
}

#[test]
fn unknown_user_writes_nothing() {
    let (engine, _) = engine();
    let err = engine.award_xp("ghost", 10).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(engine.store().snapshot().is_empty());
}

#[test]
fn failed_leaderboard_write_rolls_back_everything() {
    let (engine, _) = engine();
    engine.register_user(&player("u1")).unwrap();
    let party_id = engine.assign_user_to_party("u1").unwrap();
    let before = engine.store().snapshot();

    engine.store().fail_writes_under("leaderboards/");
    let err = engine.award_xp("u1", 100).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(engine.store().snapshot(), before);
    assert_eq!(engine.user("u1").unwrap().exp, 0);
    assert_eq!(engine.members(&party_id).unwrap()[0].exp, 0);

    engine.store().clear_faults();
    engine.award_xp("u1", 100).unwrap();
    assert_eq!(engine.user("u1").unwrap().exp, 100);
}

#[test]
fn failed_day_session_write_leaves_every_document_untouched() {
    let (engine, _) = engine();
    engine.register_user(&player("u1")).unwrap();
    let party_id = engine.assign_user_to_party("u1").unwrap();
    engine.award_xp("u1", 40).unwrap();
    let weekly = DocPath::weekly_entry(&week_id(start()), "u1");
    let monthly = DocPath::monthly_entry(&month_id(start()), "u1");
    let before = engine.store().snapshot();

    engine.store().fail_writes_under("users/u1/dailySessions");
    let err = engine.award_xp("u1", 100).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(engine.store().snapshot(), before);

    let user = engine.user("u1").unwrap();
    assert_eq!((user.exp, user.level), (40, 1));
    assert_eq!(engine.members(&party_id).unwrap()[0].exp, 40);
    let entry: LeaderboardEntry = doc(&engine, &weekly).unwrap();
    assert_eq!(entry.exp, 40);
    let entry: LeaderboardEntry = doc(&engine, &monthly).unwrap();
    assert_eq!(entry.exp, 40);
}

#[test]
fn conflicting_commits_are_retried_once_applied() {
    let (engine, _) = engine();
    engine.register_user(&player("u1")).unwrap();

    engine.store().inject_conflicts(2);
    engine.award_xp("u1", 40).unwrap();
    assert_eq!(engine.store().retry_count(), 2);
    assert_eq!(engine.user("u1").unwrap().exp, 40);
}

#[test]
fn active_booster_multiplies_awards_until_it_ends() {
    let (engine, clock) = engine();
    engine.register_user(&player("u1")).unwrap();

    let applied = engine.apply_session_rewards("u1", &booster_rewards(1)).unwrap();
    assert_eq!(applied.boosters_saved, 1);
    assert!(applied.award.is_none());

    let active = engine.activate_booster("u1", 0).unwrap();
    assert_eq!(active.multiplier, 2);
    assert_eq!(active.ends_at, start() + Duration::minutes(20));

    let boosted = engine.award_xp("u1", 50).unwrap();
    assert_eq!((boosted.xp_gain, boosted.multiplier), (100, 2));

    let err = engine.activate_booster("u1", 0).unwrap_err();
    assert!(matches!(err, EngineError::BoosterAlreadyActive { .. }));
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    clock.advance(Duration::minutes(21));
    let plain = engine.award_xp("u1", 50).unwrap();
    assert_eq!((plain.xp_gain, plain.multiplier), (50, 1));
    assert!(engine.expire_boosters("u1").unwrap());
    assert!(engine.user("u1").unwrap().active_booster.is_none());

    let err = engine.activate_booster("u1", 0).unwrap_err();
    assert!(matches!(err, EngineError::BoosterUnavailable { index: 0 }));
    assert_eq!(engine.user("u1").unwrap().exp, 150);
}

#[test]
fn saved_boosters_lapse_after_a_week() {
    let (engine, clock) = engine();
    engine.register_user(&player("u1")).unwrap();
    engine.apply_session_rewards("u1", &booster_rewards(1)).unwrap();

    clock.advance(Duration::days(8));
    let err = engine.activate_booster("u1", 0).unwrap_err();
    assert!(matches!(err, EngineError::BoosterExpired { index: 0, .. }));
    assert!(engine.expire_boosters("u1").unwrap());
    assert!(engine.user("u1").unwrap().saved_boosters.is_empty());
    assert!(!engine.expire_boosters("u1").unwrap());
}

#[test]
fn overflowing_boosters_become_xp() {
    let (engine, _) = engine();
    engine.register_user(&player("u1")).unwrap();

    let applied = engine.apply_session_rewards("u1", &booster_rewards(4)).unwrap();
    assert_eq!(applied.boosters_saved, 3);
    assert_eq!(applied.boosters_converted, 1);
    assert_eq!(applied.bonus_xp, 100);
    assert_eq!(applied.award.map(|award| award.xp_gain), Some(100));

    let user = engine.user("u1").unwrap();
    assert_eq!(user.saved_boosters.len(), 3);
    assert_eq!(user.exp, 100);
}

#[test]
fn cosmetics_owned_in_the_meantime_pay_duplicate_xp() {
    let (engine, _) = engine();
    let mut user = player("u1");
    user.unlocked_titles.insert("title_night_owl".to_string());
    engine.register_user(&user).unwrap();

    let rewards = SessionRewards {
        rolls: 2,
        cosmetics: vec![
            Cosmetic {
                kind: CosmeticKind::Title,
                id: "title_night_owl".to_string(),
                name: "Night Owl".to_string(),
                rarity: Rarity::Uncommon,
            },
            Cosmetic {
                kind: CosmeticKind::Avatar,
                id: "avatar_fox".to_string(),
                name: "Study Fox".to_string(),
                rarity: Rarity::Uncommon,
            },
        ],
        ..SessionRewards::default()
    };
    let applied = engine.apply_session_rewards("u1", &rewards).unwrap();
    assert_eq!(applied.unlocked.len(), 1);
    assert_eq!(applied.unlocked[0].id, "avatar_fox");
    assert_eq!(applied.duplicates_converted, 1);
    assert_eq!(applied.bonus_xp, 100);

    let user = engine.user("u1").unwrap();
    assert!(user.unlocked_avatars.contains("avatar_fox"));
    assert_eq!(user.exp, 100);
}

#[test]
fn late_duplicates_replace_their_bonus_instead_of_adding_to_it() {
    let (engine, _) = engine();
    let mut user = player("u1");
    user.unlocked_titles.insert("title_flash_sage".to_string());
    user.unlocked_titles.insert("title_mind_unbound".to_string());
    engine.register_user(&user).unwrap();

    let rewards = SessionRewards {
        rolls: 2,
        bonus_xp: 50 + 250,
        cosmetics: vec![
            Cosmetic {
                kind: CosmeticKind::Title,
                id: "title_flash_sage".to_string(),
                name: "Flash Sage".to_string(),
                rarity: Rarity::Rare,
            },
            Cosmetic {
                kind: CosmeticKind::Title,
                id: "title_mind_unbound".to_string(),
                name: "Mind Unbound".to_string(),
                rarity: Rarity::Legendary,
            },
        ],
        ..SessionRewards::default()
    };
    let applied = engine.apply_session_rewards("u1", &rewards).unwrap();
    assert!(applied.unlocked.is_empty());
    assert_eq!(applied.duplicates_converted, 2);
    assert_eq!(applied.bonus_xp, 250 + 500);
    assert_eq!(engine.user("u1").unwrap().exp, 750);
}

#[test]
fn study_sessions_track_streak_and_daily_totals() {
    let (engine, clock) = engine();
    engine.register_user(&player("u1")).unwrap();

    let first = engine.record_study_session("u1", 30, 10).unwrap();
    assert_eq!(first.streak, 1);
    assert!(first.damage.is_none());
    let again = engine.record_study_session("u1", 15, 5).unwrap();
    assert_eq!(again.streak, 1);
    let day: DailySession = doc(&engine, &DocPath::daily_session("u1", &day_key(start()))).unwrap();
    assert_eq!((day.minutes_studied, day.cards_reviewed), (45, 15));

    clock.advance(Duration::days(1));
    assert_eq!(engine.record_study_session("u1", 10, 0).unwrap().streak, 2);
    clock.advance(Duration::days(2));
    assert_eq!(engine.record_study_session("u1", 10, 0).unwrap().streak, 1);
}
