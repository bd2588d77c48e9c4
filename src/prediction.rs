use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::feature_store::{FeatureStore, StoreError};
use crate::features::{FighterFeatures, assemble};
use crate::predictor::{LazyPredictor, ModelError};
use crate::{Corner, FighterId};

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("{corner} corner fighter {fighter_id} has no features")]
    MissingFeatures { corner: Corner, fighter_id: FighterId },
    #[error(transparent)]
    Store(StoreError),
    #[error("model unavailable: {0}")]
    Model(#[from] ModelError),
}

impl PredictionError {
    /// True when the caller can fix the request (backfill the fighter and
    /// retry); everything else is a server fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, PredictionError::MissingFeatures { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub red_corner_id: FighterId,
    pub blue_corner_id: FighterId,
    pub red_win_probability: f64,
    pub blue_win_probability: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FightPredictionRequest {
    pub red_corner_id: FighterId,
    pub blue_corner_id: FighterId,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FightPredictionResponse {
    pub red_corner_id: FighterId,
    pub blue_corner_id: FighterId,
    pub red_corner_win_probability: f64,
    pub blue_corner_win_probability: f64,
}

impl From<PredictionResult> for FightPredictionResponse {
    fn from(r: PredictionResult) -> Self {
        Self {
            red_corner_id: r.red_corner_id,
            blue_corner_id: r.blue_corner_id,
            red_corner_win_probability: r.red_win_probability,
            blue_corner_win_probability: r.blue_win_probability,
        }
    }
}

/// Turns two stored fighters into win probabilities. Stored features are
/// the only input; nothing is fetched at prediction time.
pub struct PredictionService<S> {
    store: S,
    predictor: Arc<LazyPredictor>,
}

impl<S: FeatureStore> PredictionService<S> {
    pub fn new(store: S, predictor: Arc<LazyPredictor>) -> Self {
        Self { store, predictor }
    }

    pub fn predict_fight(
        &self,
        red_id: FighterId,
        blue_id: FighterId,
    ) -> Result<PredictionResult, PredictionError> {
        let red = self.resolve(Corner::Red, red_id)?;
        let blue = self.resolve(Corner::Blue, blue_id)?;
        let vector = assemble(&red.stats, &blue.stats);

        let predictor = self.predictor.get()?;
        let probs = predictor.predict(&vector)?;
        debug!(
            red = %red_id,
            blue = %blue_id,
            red_p = probs.red,
            blue_p = probs.blue,
            "fight predicted"
        );

        Ok(PredictionResult {
            red_corner_id: red_id,
            blue_corner_id: blue_id,
            red_win_probability: probs.red,
            blue_win_probability: probs.blue,
        })
    }

    pub fn handle(
        &self,
        req: FightPredictionRequest,
    ) -> Result<FightPredictionResponse, PredictionError> {
        self.predict_fight(req.red_corner_id, req.blue_corner_id)
            .map(FightPredictionResponse::from)
    }

    fn resolve(
        &self,
        corner: Corner,
        fighter_id: FighterId,
    ) -> Result<FighterFeatures, PredictionError> {
        match self.store.get_features(fighter_id) {
            Ok(row) => Ok(row),
            Err(StoreError::NotFound { .. }) => {
                Err(PredictionError::MissingFeatures { corner, fighter_id })
            }
            Err(err) => Err(PredictionError::Store(err)),
        }
    }
}
