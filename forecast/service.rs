//! # Prediction Service
//!
//! Answers collaborator-facing prediction requests against a shared model.
//!
//! The active [`TrainedModel`] lives behind a [`ModelHandle`]. Reads are
//! wait-free and each request takes its own `Arc` to the model, so a
//! concurrent [`ModelHandle::replace`] or [`ModelHandle::reload_from`] never
//! affects a request already in flight.

use crate::intervention::{InterventionError, InterventionSet};
use crate::model::{ModelError, TrainedModel};
use crate::rollout::{
    DEFAULT_YEARS_AHEAD, ForecastError, MAX_YEARS_AHEAD, MIN_YEARS_AHEAD, YearlyChangeBounds,
    check_horizon, forecast_tract,
};
use crate::transitions::TractIndex;
use crate::types::{ScoreTractId, TractIdError};
use arc_swap::ArcSwap;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub tract: String,
    /// A single name is accepted in place of a list.
    #[serde(default, deserialize_with = "one_or_many")]
    pub interventions: Vec<String>,
    /// Falls back to the service's default horizon when absent.
    #[serde(default)]
    pub years_ahead: Option<u32>,
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(name) => vec![name],
        OneOrMany::Many(names) => names,
    })
}

/// Response scores carry two decimals.
fn round_score(score: f64) -> f64 {
    (score * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionSuccess {
    pub success: bool,
    pub tract: String,
    /// Canonical names of the applied interventions, in application order.
    pub interventions: Vec<String>,
    pub years_ahead: u32,
    /// Rounded to two decimals.
    pub predictions: Vec<f64>,
    pub years: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionFailure {
    pub success: bool,
    pub error: String,
}

/// The wire shape of a response. Failures never carry partial predictions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PredictionResponse {
    Success(PredictionSuccess),
    Failure(PredictionFailure),
}

impl PredictionResponse {
    fn failure(error: &ServiceError) -> Self {
        PredictionResponse::Failure(PredictionFailure {
            success: false,
            error: error.to_string(),
        })
    }
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Malformed prediction request: {0}")]
    MalformedRequest(#[from] serde_json::Error),
    #[error("Invalid tract identifier: {0}")]
    InvalidTract(#[from] TractIdError),
    #[error(transparent)]
    Intervention(#[from] InterventionError),
    #[error("years_ahead must be between {min} and {max}, got {requested}.")]
    InvalidHorizon { requested: u32, min: u32, max: u32 },
    #[error(transparent)]
    Forecast(ForecastError),
}

impl From<ForecastError> for ServiceError {
    fn from(err: ForecastError) -> Self {
        match err {
            ForecastError::InvalidHorizon {
                requested,
                min,
                max,
            } => ServiceError::InvalidHorizon {
                requested,
                min,
                max,
            },
            other => ServiceError::Forecast(other),
        }
    }
}

/// The single swap point for the active model.
#[derive(Debug)]
pub struct ModelHandle {
    current: ArcSwap<TrainedModel>,
}

impl ModelHandle {
    pub fn new(model: TrainedModel) -> Self {
        Self {
            current: ArcSwap::from_pointee(model),
        }
    }

    /// The model new requests should use.
    pub fn current(&self) -> Arc<TrainedModel> {
        self.current.load_full()
    }

    /// Installs `model` and returns the one it replaced.
    pub fn replace(&self, model: TrainedModel) -> Arc<TrainedModel> {
        self.current.swap(Arc::new(model))
    }

    /// Loads and validates a model file, then swaps it in.
    ///
    /// On failure the previous model stays active.
    pub fn reload_from(&self, path: &Path) -> Result<(), ModelError> {
        let model = TrainedModel::load(path)?;
        self.replace(model);
        log::info!("Reloaded model from {}.", path.display());
        Ok(())
    }
}

/// Validated tract data plus the active model.
#[derive(Debug)]
pub struct ForecastService {
    model: ModelHandle,
    index: TractIndex,
    default_years_ahead: u32,
    max_years_ahead: u32,
    change_bounds: Option<YearlyChangeBounds>,
}

impl ForecastService {
    pub fn new(model: TrainedModel, index: TractIndex) -> Self {
        Self {
            model: ModelHandle::new(model),
            index,
            default_years_ahead: DEFAULT_YEARS_AHEAD,
            max_years_ahead: MAX_YEARS_AHEAD,
            change_bounds: None,
        }
    }

    /// Overrides the horizon limits. `max` never exceeds [`MAX_YEARS_AHEAD`].
    pub fn with_horizons(mut self, default: u32, max: u32) -> Self {
        self.max_years_ahead = max.clamp(MIN_YEARS_AHEAD, MAX_YEARS_AHEAD);
        self.default_years_ahead = default.clamp(MIN_YEARS_AHEAD, self.max_years_ahead);
        self
    }

    /// Limits every rollout step to `bounds`.
    pub fn with_change_bounds(mut self, bounds: Option<YearlyChangeBounds>) -> Self {
        self.change_bounds = bounds;
        self
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    pub fn index(&self) -> &TractIndex {
        &self.index
    }

    /// Validates and answers one request.
    pub fn handle(&self, request: &PredictionRequest) -> Result<PredictionSuccess, ServiceError> {
        let tract = ScoreTractId::parse(&request.tract)?;
        let interventions = InterventionSet::parse(&request.interventions)?;
        let years_ahead = request.years_ahead.unwrap_or(self.default_years_ahead);
        check_horizon(years_ahead, self.max_years_ahead)?;

        let model = self.model.current();
        let forecast = forecast_tract(
            &model,
            &self.index,
            &tract,
            &interventions,
            years_ahead,
            self.change_bounds,
        )?;

        Ok(PredictionSuccess {
            success: true,
            tract: tract.to_string(),
            interventions: interventions.names(),
            years_ahead,
            predictions: forecast.predictions.into_iter().map(round_score).collect(),
            years: forecast.years,
        })
    }

    /// Like [`ForecastService::handle`], with errors folded into the response.
    pub fn respond(&self, request: &PredictionRequest) -> PredictionResponse {
        match self.handle(request) {
            Ok(success) => PredictionResponse::Success(success),
            Err(err) => {
                log::warn!("Rejected prediction request for '{}': {err}", request.tract);
                PredictionResponse::failure(&err)
            }
        }
    }

    /// Parses a JSON request body and returns the JSON response body.
    pub fn respond_json(&self, body: &str) -> Result<String, serde_json::Error> {
        let response = match serde_json::from_str::<PredictionRequest>(body) {
            Ok(request) => self.respond(&request),
            Err(err) => PredictionResponse::failure(&ServiceError::MalformedRequest(err)),
        };
        serde_json::to_string(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{fixed_model, sample_sources};
    use serde_json::{Value, json};

    fn service() -> ForecastService {
        ForecastService::new(fixed_model(), TractIndex::build(&sample_sources()))
    }

    fn request(tract: &str, interventions: &[&str], years_ahead: Option<u32>) -> PredictionRequest {
        PredictionRequest {
            tract: tract.to_string(),
            interventions: interventions.iter().map(|s| s.to_string()).collect(),
            years_ahead,
        }
    }

    #[test]
    fn default_horizon_is_five_years() {
        let response = service().handle(&request("1121010500", &[], None)).unwrap();
        assert_eq!(response.years_ahead, 5);
        assert_eq!(response.years, vec![1, 2, 3, 4, 5]);
        assert_eq!(response.predictions.len(), 5);
        assert!(response.interventions.is_empty());
    }

    #[test]
    fn intervention_order_does_not_change_predictions() {
        let service = service();
        let a = service
            .handle(&request("1121010500", &["housing", "digital"], Some(7)))
            .unwrap();
        let b = service
            .handle(&request("1121010500", &["digital", "housing"], Some(7)))
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.interventions, vec!["digital", "housing"]);
    }

    #[test]
    fn rejections_are_identifiable() {
        let service = service();
        assert!(matches!(
            service.handle(&request("1121010500", &["not_a_real_intervention"], None)),
            Err(ServiceError::Intervention(InterventionError::Unknown(_)))
        ));
        assert!(matches!(
            service.handle(&request("9999999999", &[], None)),
            Err(ServiceError::Forecast(ForecastError::UnknownTract(_)))
        ));
        assert!(matches!(
            service.handle(&request("01121010500", &[], None)),
            Err(ServiceError::InvalidTract(_))
        ));
        assert!(matches!(
            service.handle(&request("1121010500", &[], Some(16))),
            Err(ServiceError::InvalidHorizon { requested: 16, .. })
        ));
        assert!(matches!(
            service.handle(&request("1121010500", &[], Some(0))),
            Err(ServiceError::InvalidHorizon { requested: 0, .. })
        ));
    }

    #[test]
    fn configured_horizon_limits_apply() {
        let service = service().with_horizons(3, 10);
        let response = service.handle(&request("1121010500", &[], None)).unwrap();
        assert_eq!(response.years_ahead, 3);
        assert!(matches!(
            service.handle(&request("1121010500", &[], Some(11))),
            Err(ServiceError::InvalidHorizon { max: 10, .. })
        ));
    }

    #[test]
    fn json_success_shape() {
        let body = json!({"tract": "1121011100", "interventions": ["Workforce"], "years_ahead": 2});
        let response: Value =
            serde_json::from_str(&service().respond_json(&body.to_string()).unwrap()).unwrap();
        assert_eq!(response["success"], json!(true));
        assert_eq!(response["tract"], json!("1121011100"));
        assert_eq!(response["interventions"], json!(["workforce"]));
        assert_eq!(response["years_ahead"], json!(2));
        assert_eq!(response["years"], json!([1, 2]));
        assert_eq!(response["predictions"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn json_failure_shape_has_no_predictions() {
        let body = json!({"tract": "1121010500", "interventions": ["not_a_real_intervention"]});
        let response: Value =
            serde_json::from_str(&service().respond_json(&body.to_string()).unwrap()).unwrap();
        assert_eq!(response["success"], json!(false));
        assert!(
            response["error"]
                .as_str()
                .unwrap()
                .contains("not_a_real_intervention")
        );
        assert!(response.get("predictions").is_none());

        let malformed: Value =
            serde_json::from_str(&service().respond_json("{\"years_ahead\": 3}").unwrap()).unwrap();
        assert_eq!(malformed["success"], json!(false));
    }

    #[test]
    fn a_single_intervention_name_is_accepted() {
        let single: PredictionRequest =
            serde_json::from_value(json!({"tract": "1121010500", "interventions": "digital"}))
                .unwrap();
        let listed: PredictionRequest =
            serde_json::from_value(json!({"tract": "1121010500", "interventions": ["digital"]}))
                .unwrap();
        assert_eq!(single, listed);
        assert_eq!(single.interventions, vec!["digital"]);

        let none: PredictionRequest =
            serde_json::from_value(json!({"tract": "1121010500"})).unwrap();
        assert!(none.interventions.is_empty());
        let numeric = json!({"tract": "1121010500", "interventions": 3});
        assert!(serde_json::from_value::<PredictionRequest>(numeric).is_err());
    }

    #[test]
    fn response_predictions_have_two_decimals() {
        let response = service().handle(&request("1121010500", &[], Some(4))).unwrap();
        let model = fixed_model();
        let index = TractIndex::build(&sample_sources());
        let tract = ScoreTractId::parse("1121010500").unwrap();
        let exact =
            forecast_tract(&model, &index, &tract, &InterventionSet::empty(), 4, None).unwrap();
        for (rounded, exact) in response.predictions.iter().zip(&exact.predictions) {
            assert!((rounded - exact).abs() <= 0.005 + 1e-12);
            assert_eq!(*rounded, (rounded * 100.0).round() / 100.0);
        }
    }

    #[test]
    fn configured_change_bounds_reach_the_rollout() {
        let mut steep = fixed_model();
        steep.coefficients.current_score = 1.5;
        let service = ForecastService::new(steep, TractIndex::build(&sample_sources()))
            .with_change_bounds(Some(YearlyChangeBounds::OBSERVED));
        let response = service.handle(&request("1121010500", &[], Some(3))).unwrap();
        // Last observed score is 24.5; each step may gain at most 3.5 points.
        assert_eq!(response.predictions, vec![28.0, 31.5, 35.0]);
    }

    #[test]
    fn replacing_the_model_leaves_held_references_intact() {
        let handle = ModelHandle::new(fixed_model());
        let in_flight = handle.current();

        let mut retrained = fixed_model();
        retrained.coefficients.intercept = 5.0;
        let previous = handle.replace(retrained);

        assert_eq!(in_flight.coefficients.intercept, 2.0);
        assert_eq!(previous.coefficients.intercept, 2.0);
        assert_eq!(handle.current().coefficients.intercept, 5.0);
    }

    #[test]
    fn failed_reload_keeps_the_previous_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.toml");
        std::fs::write(&path, "not = [valid").unwrap();

        let handle = ModelHandle::new(fixed_model());
        assert!(handle.reload_from(&path).is_err());
        assert_eq!(*handle.current(), fixed_model());

        let mut retrained = fixed_model();
        retrained.alpha = 3.0;
        retrained.save(&path).unwrap();
        handle.reload_from(&path).unwrap();
        assert_eq!(handle.current().alpha, 3.0);
    }

    #[test]
    fn concurrent_readers_see_whole_models() {
        let handle = ModelHandle::new(fixed_model());
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        let model = handle.current();
                        assert!(model.validate().is_ok());
                    }
                });
            }
            scope.spawn(|| {
                for i in 0..50 {
                    let mut model = fixed_model();
                    model.coefficients.intercept = f64::from(i);
                    handle.replace(model);
                }
            });
        });
        assert_eq!(handle.current().coefficients.intercept, 49.0);
    }
}
