use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;
use sim_ai::{DecisionConfig, DecisionContext, DecisionEngine, FeatureExtractor};
use sim_core::{
    Archetype, BehaviorProfile, CompetitorId, CompetitorState, CompetitorSummary, Finances,
    GameContext, MarketSnapshot, SimTime, TimeContext,
};
use sim_director::{DifficultyLevel, DifficultySettings};
use sim_econ::MarketOutlook;
use sim_progress::{default_milestones, ProgressionAccumulator, ProgressionConfig};

fn competitors(n: u32) -> Vec<CompetitorState> {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let archetypes = Archetype::ALL;
    (0..n)
        .map(|i| {
            let profile =
                BehaviorProfile::generate(archetypes[i as usize % archetypes.len()], 0.1, &mut rng);
            CompetitorState::new(
                CompetitorId(i),
                format!("C{i}"),
                profile,
                Finances::new(Decimal::new(20_000_000, 0), Decimal::new(8_000_000, 0), 4, 50.0),
                64,
            )
        })
        .collect()
}

fn bench_decide(c: &mut Criterion) {
    let agents = competitors(10);
    let game = GameContext {
        player_assets: Decimal::new(25_000_000, 0),
        market: MarketSnapshot::default(),
        competitors: agents.iter().map(CompetitorSummary::from).collect(),
        time: TimeContext::at(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            SimTime::from_secs(600),
            60,
        ),
    };
    let progression = ProgressionAccumulator::new(ProgressionConfig::default(), default_milestones())
        .unwrap()
        .snapshot();
    let difficulty = DifficultySettings::for_level(DifficultyLevel::new(0.5));
    let outlook = MarketOutlook::default();
    let ctx = DecisionContext {
        game: &game,
        progression: &progression,
        difficulty: &difficulty,
        outlook: &outlook,
    };

    c.bench_function("extract features", |b| {
        b.iter(|| black_box(FeatureExtractor::extract(&agents[0], &ctx)))
    });

    let mut engine = DecisionEngine::new(DecisionConfig::default(), None, 42).unwrap();
    c.bench_function("decide 10 competitors", |b| {
        b.iter(|| {
            for a in &agents {
                black_box(engine.decide(a, &ctx));
            }
        })
    });
}

criterion_group!(benches, bench_decide);
criterion_main!(benches);
