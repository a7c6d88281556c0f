// ========================================================================================
//
//                 IGS FORECAST TRAINING AND ROLLOUT BENCHMARK
//
// ========================================================================================
//
// Measures the ridge fit on a synthetic training set and the autoregressive rollout
// across horizons, with and without the full intervention set applied.
//
// ========================================================================================

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use igs_forecast::estimate::{DEFAULT_ALPHA, train_model};
use igs_forecast::intervention::{Intervention, InterventionSet, apply_interventions};
use igs_forecast::rollout::{StartingState, roll_forward};
use igs_forecast::types::{
    FEATURE_COUNT, FeatureName, FeatureTractId, ScoreTractId, TractFeatureVector,
    TrainingExample,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// --- Benchmark Tuning Parameters ---

/// Number of synthetic tracts in the training set.
const NUM_TRACTS: usize = 200;
/// Consecutive observed years per tract.
const YEARS_PER_TRACT: i32 = 8;
/// Horizons to roll out. This array defines the x-axis of the rollout group.
const HORIZONS: [u32; 4] = [1, 5, 10, 15];

fn random_features(rng: &mut StdRng) -> [f64; FEATURE_COUNT] {
    let mut values = [0.0; FEATURE_COUNT];
    for name in FeatureName::ALL {
        let (min, max) = name.kind().bounds();
        let upper = if max.is_finite() { max } else { 250_000.0 };
        values[name.index()] = rng.gen_range(min..upper);
    }
    values
}

fn synthetic_examples(rng: &mut StdRng) -> Vec<TrainingExample> {
    let mut examples = Vec::with_capacity(NUM_TRACTS * YEARS_PER_TRACT as usize);
    for tract in 0..NUM_TRACTS {
        let tract_id = ScoreTractId::parse(&format!("{:010}", 1_121_000_000 + tract)).unwrap();
        let features = random_features(rng);
        let mut score: f64 = rng.gen_range(10.0..90.0);
        for offset in 0..YEARS_PER_TRACT {
            let next: f64 = (score + rng.gen_range(-2.0..2.5)).clamp(0.0, 100.0);
            examples.push(TrainingExample {
                tract_id: tract_id.clone(),
                year: 2014 + offset,
                features,
                current_score: score,
                next_score: next,
            });
            score = next;
        }
    }
    examples
}

fn bench_forecasting(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0x165_F0CA);
    let examples = synthetic_examples(&mut rng);

    c.bench_function("train_ridge", |b| {
        b.iter(|| train_model(black_box(&examples), black_box(DEFAULT_ALPHA)).unwrap())
    });

    let model = train_model(&examples, DEFAULT_ALPHA).unwrap();
    let base = TractFeatureVector::new(
        FeatureTractId::parse("01121010500").unwrap(),
        examples[0].features,
    );
    let all: InterventionSet = Intervention::ALL.into_iter().collect();
    let perturbed = apply_interventions(&base, &all);
    let start = StartingState {
        year: 2022,
        score: examples[0].current_score,
    };

    let mut group = c.benchmark_group("rollout");
    for &horizon in &HORIZONS {
        group.bench_with_input(BenchmarkId::new("baseline", horizon), &horizon, |b, &h| {
            b.iter(|| roll_forward(&model, black_box(base.values()), start, h).unwrap())
        });
        group.bench_with_input(
            BenchmarkId::new("all_interventions", horizon),
            &horizon,
            |b, &h| b.iter(|| roll_forward(&model, black_box(perturbed.values()), start, h).unwrap()),
        );
    }
    group.finish();
}

criterion_group!(benches, bench_forecasting);
criterion_main!(benches);
