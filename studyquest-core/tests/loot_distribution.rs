use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use studyquest_core::{Collection, Rarity, RewardsCatalog, generate_reward, get_session_rewards};

const DRAWS: u32 = 100_000;
const TOLERANCE: f64 = 0.01;

#[derive(Default)]
struct Tally {
    flat_xp: u32,
    booster: u32,
    uncommon: u32,
    rare: u32,
    legendary: u32,
    small: u32,
    medium: u32,
    large: u32,
}

fn share(count: u32, total: u32) -> f64 {
    f64::from(count) / f64::from(total)
}

fn assert_share(label: &str, count: u32, total: u32, expected: f64) {
    let observed = share(count, total);
    assert!(
        (observed - expected).abs() <= TOLERANCE,
        "{label}: expected {expected:.3}, observed {observed:.4}"
    );
}

fn tally_draws(is_pro: bool, seed: u64) -> Tally {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let collection = Collection::default();
    let mut tally = Tally::default();

    for _ in 0..DRAWS {
        let reward = generate_reward(&collection, is_pro, &mut rng);
        match reward.rarity {
            Some(Rarity::Uncommon) => tally.uncommon += 1,
            Some(Rarity::Rare) => tally.rare += 1,
            Some(Rarity::Legendary) => tally.legendary += 1,
            Some(Rarity::Milestone) => panic!("milestone titles are never dropped"),
            None if reward.booster.is_some() => tally.booster += 1,
            None => {
                tally.flat_xp += 1;
                match reward.bonus_xp {
                    50 => tally.small += 1,
                    100 => tally.medium += 1,
                    250 => tally.large += 1,
                    other => panic!("unexpected flat xp {other}"),
                }
            }
        }
    }
    tally
}

fn assert_band_odds(tally: &Tally) {
    assert_share("flat xp", tally.flat_xp, DRAWS, 0.56);
    assert_share("booster", tally.booster, DRAWS, 0.14);
    assert_share("uncommon", tally.uncommon, DRAWS, 0.20);
    assert_share("rare", tally.rare, DRAWS, 0.08);
    assert_share("legendary", tally.legendary, DRAWS, 0.02);

    assert_share("small tier", tally.small, tally.flat_xp, 0.60);
    assert_share("medium tier", tally.medium, tally.flat_xp, 0.30);
    assert_share("large tier", tally.large, tally.flat_xp, 0.10);
}

#[test]
fn hundred_thousand_draws_match_band_odds() {
    assert_band_odds(&tally_draws(false, 42));
}

#[test]
fn pro_players_share_the_same_band_odds() {
    assert_band_odds(&tally_draws(true, 77));
}

#[test]
fn session_rewards_aggregate_their_rolls() {
    let mut rng = ChaCha20Rng::seed_from_u64(2024);
    let catalog = RewardsCatalog::default_catalog();
    for minutes in [5, 25, 45, 60, 180] {
        let rewards = get_session_rewards(minutes, &Collection::default(), false, &mut rng);
        assert_eq!(rewards.rolls, studyquest_core::roll_count(minutes));
        let boosters = rewards
            .rewards
            .iter()
            .filter(|reward| reward.booster.is_some())
            .count();
        assert_eq!(rewards.boosters.len(), boosters);
        let cosmetics = rewards
            .rewards
            .iter()
            .filter(|reward| reward.cosmetic.is_some() && !reward.duplicate)
            .count();
        assert_eq!(rewards.cosmetics.len(), cosmetics);
        for cosmetic in &rewards.cosmetics {
            assert!(catalog.rule(cosmetic.rarity).duplicate_xp > 0);
        }
    }
}
