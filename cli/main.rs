#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::PathBuf;
use std::process;

use igs_forecast::cleaning::{write_cleaned_features, write_cleaned_scores};
use igs_forecast::config::{ForecastConfig, MissingFeaturePolicy};
use igs_forecast::data::{SourceData, load_sources};
use igs_forecast::estimate::train_model;
use igs_forecast::io::write_atomically;
use igs_forecast::model::TrainedModel;
use igs_forecast::rollout::scenario_grid;
use igs_forecast::service::{ForecastService, PredictionRequest, PredictionResponse};
use igs_forecast::summary::{score_gap, summarize};
use igs_forecast::transitions::{TractIndex, build_training_examples};
use igs_forecast::types::ScoreTractId;

#[derive(Clone, Copy, ValueEnum)]
pub enum MissingFeaturesCli {
    /// Report blank feature cells as validation violations
    Reject,
    /// Fill blank feature cells with zero and log a warning
    FillZero,
}

impl From<MissingFeaturesCli> for MissingFeaturePolicy {
    fn from(value: MissingFeaturesCli) -> Self {
        match value {
            MissingFeaturesCli::Reject => MissingFeaturePolicy::Reject,
            MissingFeaturesCli::FillZero => MissingFeaturePolicy::FillZero,
        }
    }
}

/// Source table locations. Each flag overrides the config file.
#[derive(Args)]
pub struct DataArgs {
    /// Score table with `Census Tract FIPS code`, `Year`, `Inclusive Growth Score`
    #[arg(long, value_name = "PATH")]
    pub scores: Option<PathBuf>,

    /// Feature table with `tract_fips` and the thirteen feature columns
    #[arg(long, value_name = "PATH")]
    pub features: Option<PathBuf>,

    /// How blank feature cells are handled
    #[arg(long, value_enum)]
    pub missing_features: Option<MissingFeaturesCli>,
}

#[derive(Args)]
pub struct TrainArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Ridge penalty on every coefficient except the intercept
    #[arg(long)]
    pub alpha: Option<f64>,

    /// Where to write the trained model
    #[arg(long, value_name = "PATH")]
    pub model: Option<PathBuf>,
}

#[derive(Args)]
pub struct PredictArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Trained model file
    #[arg(long, value_name = "PATH")]
    pub model: Option<PathBuf>,

    /// 10-digit tract code as it appears in the score table
    #[arg(long)]
    pub tract: String,

    /// Comma-separated interventions: digital, housing, entrepreneurship, workforce
    #[arg(long, value_delimiter = ',')]
    pub interventions: Vec<String>,

    /// Number of years to forecast (defaults to the configured horizon)
    #[arg(long)]
    pub years_ahead: Option<u32>,
}

#[derive(Args)]
pub struct ScenariosArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Trained model file
    #[arg(long, value_name = "PATH")]
    pub model: Option<PathBuf>,

    /// 10-digit tract code as it appears in the score table
    #[arg(long)]
    pub tract: String,

    /// Number of years to forecast (defaults to the configured horizon)
    #[arg(long)]
    pub years_ahead: Option<u32>,

    /// Write the JSON grid here instead of standard output
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

#[derive(Parser)]
#[command(
    name = "igs-forecast",
    about = "Inclusive Growth Score forecasting for census tracts",
    long_about = "Validates tract score and demographic tables, trains a ridge model of \
                 next year's Inclusive Growth Score, and forecasts scores under \
                 hypothetical policy interventions."
)]
struct Cli {
    /// Optional TOML config file; command-line flags take precedence
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate both source tables and report join coverage
    #[command(about = "Validate the source tables")]
    Validate(DataArgs),

    /// Write normalized, fully quoted copies of both source tables
    #[command(about = "Write cleaned copies of the source tables")]
    Clean {
        #[command(flatten)]
        data: DataArgs,

        /// Output path for the cleaned score table
        #[arg(long, value_name = "PATH")]
        scores_out: PathBuf,

        /// Output path for the cleaned feature table
        #[arg(long, value_name = "PATH")]
        features_out: PathBuf,
    },

    /// Fit the one-step ridge model on consecutive-year transitions
    #[command(about = "Train the forecasting model (outputs: model.toml)")]
    Train(TrainArgs),

    /// Forecast one tract and print the JSON prediction response
    #[command(about = "Forecast a tract's score")]
    Predict(PredictArgs),

    /// Forecast one tract under every combination of interventions
    #[command(about = "Forecast every intervention scenario for a tract")]
    Scenarios(ScenariosArgs),

    /// Compare the observed score histories of two tracts
    #[command(about = "Compare two tracts' observed scores")]
    Compare {
        #[command(flatten)]
        data: DataArgs,

        /// Reference tract
        #[arg(value_name = "TRACT_A")]
        tract_a: String,

        /// Tract compared against the reference
        #[arg(value_name = "TRACT_B")]
        tract_b: String,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { config, command } = Cli::parse();

    let result = match command {
        Some(Commands::Validate(data)) => validate(config, data),
        Some(Commands::Clean {
            data,
            scores_out,
            features_out,
        }) => clean(config, data, scores_out, features_out),
        Some(Commands::Train(args)) => train(config, args),
        Some(Commands::Predict(args)) => predict(config, args),
        Some(Commands::Scenarios(args)) => scenarios(config, args),
        Some(Commands::Compare {
            data,
            tract_a,
            tract_b,
        }) => compare(config, data, tract_a, tract_b),
        None => Cli::command()
            .print_help()
            .map(|_| println!())
            .map_err(Into::into),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Reads the config file if one was given, then applies the data flags.
fn resolve_config(
    path: Option<PathBuf>,
    data: &DataArgs,
) -> Result<ForecastConfig, Box<dyn std::error::Error>> {
    let mut config = match path {
        Some(path) => ForecastConfig::load(&path)?,
        None => ForecastConfig::default(),
    };
    if let Some(scores) = &data.scores {
        config.scores_path = scores.clone();
    }
    if let Some(features) = &data.features {
        config.features_path = features.clone();
    }
    if let Some(policy) = data.missing_features {
        config.missing_features = policy.into();
    }
    Ok(config)
}

fn load(config: &ForecastConfig) -> Result<SourceData, Box<dyn std::error::Error>> {
    Ok(load_sources(
        &config.scores_path,
        &config.features_path,
        config.missing_features,
    )?)
}

fn validate(config: Option<PathBuf>, data: DataArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = resolve_config(config, &data)?;
    let sources = load(&config)?;
    let index = TractIndex::build(&sources);
    let examples = build_training_examples(&index);

    println!(
        "Score table: {} rows. Feature table: {} rows.",
        sources.scores.len(),
        sources.features.len()
    );
    println!(
        "Joined tracts: {}. Excluded tracts: {}. Training examples: {}.",
        index.len(),
        index.exclusions.len(),
        examples.len()
    );
    for exclusion in &index.exclusions {
        println!("  - {exclusion}");
    }
    Ok(())
}

fn clean(
    config: Option<PathBuf>,
    data: DataArgs,
    scores_out: PathBuf,
    features_out: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = resolve_config(config, &data)?;
    let sources = load(&config)?;
    write_cleaned_scores(&scores_out, &sources.scores)?;
    write_cleaned_features(&features_out, &sources.features)?;
    println!(
        "Cleaned tables written to {} and {}.",
        scores_out.display(),
        features_out.display()
    );
    Ok(())
}

pub fn train(config: Option<PathBuf>, args: TrainArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = resolve_config(config, &args.data)?;
    if let Some(alpha) = args.alpha {
        config.alpha = alpha;
    }
    if let Some(model) = args.model {
        config.model_path = model;
    }
    config.validate()?;

    let sources = load(&config)?;
    let index = TractIndex::build(&sources);
    let examples = build_training_examples(&index);
    let model = train_model(&examples, config.alpha)?;

    model.save(&config.model_path)?;
    let summary = &model.fit_summary;
    println!(
        "Trained on {} examples from {} tracts ({}-{}); in-sample RMSE {:.4}.",
        summary.n_examples, summary.n_tracts, summary.first_year, summary.last_year, summary.rmse
    );
    println!("Model saved to: {}", config.model_path.display());
    Ok(())
}

/// Builds a service over freshly validated data and the configured model.
fn build_service(
    config: &ForecastConfig,
) -> Result<ForecastService, Box<dyn std::error::Error>> {
    let model = TrainedModel::load(&config.model_path)?;
    let sources = load(config)?;
    Ok(ForecastService::new(model, TractIndex::build(&sources))
        .with_horizons(config.default_years_ahead, config.max_years_ahead)
        .with_change_bounds(config.yearly_change_bounds))
}

fn predict(config: Option<PathBuf>, args: PredictArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = resolve_config(config, &args.data)?;
    if let Some(model) = args.model {
        config.model_path = model;
    }
    config.validate()?;
    let service = build_service(&config)?;

    let request = PredictionRequest {
        tract: args.tract,
        interventions: args.interventions,
        years_ahead: args.years_ahead,
    };
    let response = service.respond(&request);
    println!("{}", serde_json::to_string_pretty(&response)?);

    match response {
        PredictionResponse::Success(_) => Ok(()),
        PredictionResponse::Failure(failure) => Err(failure.error.into()),
    }
}

fn scenarios(
    config: Option<PathBuf>,
    args: ScenariosArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = resolve_config(config, &args.data)?;
    if let Some(model) = args.model {
        config.model_path = model;
    }
    config.validate()?;
    let service = build_service(&config)?;

    let tract = ScoreTractId::parse(&args.tract)?;
    let years_ahead = args.years_ahead.unwrap_or(config.default_years_ahead);
    let grid = scenario_grid(
        &service.model().current(),
        service.index(),
        &tract,
        years_ahead,
        config.yearly_change_bounds,
    )?;
    let json = serde_json::to_string_pretty(&grid)?;

    match args.output {
        Some(path) => {
            write_atomically(&path, |file| file.write_all(json.as_bytes()))?;
            println!("Scenario grid written to: {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn compare(
    config: Option<PathBuf>,
    data: DataArgs,
    tract_a: String,
    tract_b: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = resolve_config(config, &data)?;
    let index = TractIndex::build(&load(&config)?);

    let mut states = Vec::with_capacity(2);
    for raw in [&tract_a, &tract_b] {
        let tract = ScoreTractId::parse(raw)?;
        let state = index
            .get(&tract)
            .ok_or_else(|| format!("Tract '{tract}' is not present in the joined data."))?;
        match summarize(&state.history) {
            Some(s) => println!(
                "Tract {tract}: mean {:.2}, min {:.2}, max {:.2}, latest {:.2}, trend {}",
                s.mean, s.min, s.max, s.latest, s.trend
            ),
            None => println!("Tract {tract}: no observed scores"),
        }
        states.push(state);
    }

    if let Some(gap) = score_gap(states[0], states[1]) {
        println!("Latest score gap ({tract_b} minus {tract_a}): {gap:+.2}");
    }
    Ok(())
}
