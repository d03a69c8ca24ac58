use crate::error::{Error, Result};
use crate::features::{FeatureExtractor, ProfileSource};
use crate::types::*;
use nalgebra as na;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, info_span, warn};

/// Which strategy produced a duration estimate
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionMethod {
    #[serde(rename = "static_math")]
    StaticMath,
    #[serde(rename = "ai_multivariate_regression")]
    Regression,
}

impl PredictionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionMethod::StaticMath => "static_math",
            PredictionMethod::Regression => "ai_multivariate_regression",
        }
    }
}

impl fmt::Display for PredictionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed-form duration: songs in a credit times song length plus setup
#[derive(Clone, Debug, PartialEq)]
pub struct HeuristicModel {
    minutes_per_song: f64,
    setup_minutes: f64,
    solo_songs: u32,
    duo_songs: u32,
}

impl HeuristicModel {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            minutes_per_song: config.minutes_per_song,
            setup_minutes: config.setup_minutes,
            solo_songs: config.solo_songs,
            duo_songs: config.duo_songs,
        }
    }

    pub fn minutes(&self, features: &GroupFeatures) -> f64 {
        let songs = if features.participant_count >= 2 {
            self.duo_songs
        } else {
            self.solo_songs
        };
        songs as f64 * self.minutes_per_song + self.setup_minutes
    }
}

/// Numeric columns: participant count, host rank, guest rank
const NUMERIC_COLUMNS: usize = 3;

/// Maps feature records to model inputs using statistics frozen at training time
#[derive(Clone, Debug, PartialEq)]
struct FeatureEncoder {
    /// Training mean per numeric column; also the imputation value
    means: [f64; NUMERIC_COLUMNS],
    /// Training standard deviation per numeric column (1 when constant)
    scales: [f64; NUMERIC_COLUMNS],
    p1_vocabulary: Vec<&'static str>,
    p2_vocabulary: Vec<&'static str>,
}

fn numeric_values(features: &GroupFeatures) -> [Option<f64>; NUMERIC_COLUMNS] {
    [
        Some(features.participant_count as f64),
        features.p1_rank.map(f64::from),
        features.p2_rank.map(f64::from),
    ]
}

/// Categories in first-seen order
fn vocabulary<'a>(labels: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = Vec::new();
    for label in labels {
        if !seen.contains(&label) {
            seen.push(label);
        }
    }
    seen
}

impl FeatureEncoder {
    fn fit(samples: &[GroupFeatures]) -> Self {
        let mut means = [0.0; NUMERIC_COLUMNS];
        let mut scales = [1.0; NUMERIC_COLUMNS];

        for column in 0..NUMERIC_COLUMNS {
            let observed: Vec<f64> = samples
                .iter()
                .filter_map(|f| numeric_values(f)[column])
                .collect();
            if observed.is_empty() {
                continue;
            }
            let mean = observed.iter().sum::<f64>() / observed.len() as f64;
            let variance = observed.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
                / observed.len() as f64;
            means[column] = mean;
            if variance > 0.0 {
                scales[column] = variance.sqrt();
            }
        }

        Self {
            means,
            scales,
            p1_vocabulary: vocabulary(samples.iter().map(|f| f.p1_style_label())),
            p2_vocabulary: vocabulary(samples.iter().map(|f| f.p2_style_label())),
        }
    }

    fn width(&self) -> usize {
        NUMERIC_COLUMNS + self.p1_vocabulary.len() + self.p2_vocabulary.len()
    }

    /// Encode a record; categories unseen during training encode as all zeros
    fn encode(&self, features: &GroupFeatures) -> Vec<f64> {
        let mut row = Vec::with_capacity(self.width());
        for (column, value) in numeric_values(features).iter().enumerate() {
            let value = value.unwrap_or(self.means[column]);
            row.push((value - self.means[column]) / self.scales[column]);
        }
        let p1 = features.p1_style_label();
        row.extend(self.p1_vocabulary.iter().map(|&c| if c == p1 { 1.0 } else { 0.0 }));
        let p2 = features.p2_style_label();
        row.extend(self.p2_vocabulary.iter().map(|&c| if c == p2 { 1.0 } else { 0.0 }));
        row
    }
}

/// Linear model over encoded features
#[derive(Clone, Debug, PartialEq)]
pub struct RegressionModel {
    encoder: FeatureEncoder,
    intercept: f64,
    coefficients: Vec<f64>,
}

impl RegressionModel {
    /// Least-squares fit with intercept. The ridge term is not applied to the
    /// intercept.
    pub fn fit(samples: &[(GroupFeatures, f64)], ridge_penalty: f64) -> Result<Self> {
        if samples.is_empty() {
            return Err(Error::Training {
                reason: "no training samples".to_string(),
            });
        }
        if let Some((_, bad)) = samples.iter().find(|(_, minutes)| !minutes.is_finite()) {
            return Err(Error::Training {
                reason: format!("non-finite duration {}", bad),
            });
        }

        let features: Vec<GroupFeatures> = samples.iter().map(|(f, _)| f.clone()).collect();
        let encoder = FeatureEncoder::fit(&features);
        let width = encoder.width() + 1;

        // Design matrix with the intercept in the last column
        let rows: Vec<f64> = samples
            .iter()
            .flat_map(|(features, _)| {
                let mut row = encoder.encode(features);
                row.push(1.0);
                row
            })
            .collect();
        let design = na::DMatrix::from_row_slice(samples.len(), width, &rows);
        let target = na::DVector::from_iterator(samples.len(), samples.iter().map(|(_, m)| *m));

        // Normal equations (X'X + λI) β = X'y
        let mut gram = design.tr_mul(&design);
        for i in 0..width - 1 {
            gram[(i, i)] += ridge_penalty;
        }
        let moments = design.tr_mul(&target);

        let beta = gram
            .cholesky()
            .ok_or_else(|| Error::Training {
                reason: "normal equations are not positive definite".to_string(),
            })?
            .solve(&moments);
        if beta.iter().any(|b| !b.is_finite()) {
            return Err(Error::Training {
                reason: "fitted coefficients are not finite".to_string(),
            });
        }

        Ok(Self {
            encoder,
            intercept: beta[width - 1],
            coefficients: beta.iter().take(width - 1).copied().collect(),
        })
    }

    /// Raw model output in minutes, before clamping
    pub fn minutes(&self, features: &GroupFeatures) -> f64 {
        self.encoder
            .encode(features)
            .iter()
            .zip(&self.coefficients)
            .map(|(x, b)| x * b)
            .sum::<f64>()
            + self.intercept
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Strategy {
    Heuristic,
    Regression(RegressionModel),
}

/// Session duration predictor, chosen once per training call
#[derive(Clone, Debug, PartialEq)]
pub struct DurationPredictor {
    strategy: Strategy,
    heuristic: HeuristicModel,
    min_duration: f64,
    max_duration: f64,
}

impl DurationPredictor {
    pub fn heuristic(config: &EngineConfig) -> Self {
        Self {
            strategy: Strategy::Heuristic,
            heuristic: HeuristicModel::from_config(config),
            min_duration: config.min_duration,
            max_duration: config.max_duration,
        }
    }

    fn regression(model: RegressionModel, config: &EngineConfig) -> Self {
        Self {
            strategy: Strategy::Regression(model),
            ..Self::heuristic(config)
        }
    }

    pub fn method(&self) -> PredictionMethod {
        match self.strategy {
            Strategy::Heuristic => PredictionMethod::StaticMath,
            Strategy::Regression(_) => PredictionMethod::Regression,
        }
    }

    /// Expected session length in minutes, always within the configured bounds
    pub fn predict(&self, features: &GroupFeatures) -> f64 {
        let minutes = match &self.strategy {
            Strategy::Heuristic => self.heuristic.minutes(features),
            Strategy::Regression(model) => {
                let minutes = model.minutes(features);
                if minutes.is_nan() {
                    warn!(?features, "regression produced NaN, using heuristic");
                    self.heuristic.minutes(features)
                } else {
                    minutes
                }
            }
        };
        minutes.max(self.min_duration).min(self.max_duration)
    }
}

/// Keep sessions with both timestamps and a duration inside the training band
pub fn training_samples<S: ProfileSource + ?Sized>(
    history: &[HistoricalSession],
    profiles: &S,
    config: &EngineConfig,
) -> Vec<(GroupFeatures, f64)> {
    let extractor = FeatureExtractor::new(profiles);
    history
        .iter()
        .filter_map(|session| {
            let minutes = session.duration_minutes()?;
            config
                .in_training_band(minutes)
                .then(|| (extractor.extract(session.participants.as_slice()), minutes))
        })
        .collect()
}

/// Build the predictor for one run.
///
/// Falls back to the heuristic when there is too little usable history or
/// when fitting fails; the failure is logged, never returned.
pub fn train_predictor<S: ProfileSource + ?Sized>(
    history: &[HistoricalSession],
    profiles: &S,
    config: &EngineConfig,
) -> DurationPredictor {
    let samples = training_samples(history, profiles, config);
    let _span = info_span!("train_predictor", history = history.len(), usable = samples.len())
        .entered();

    if samples.len() < config.min_training_sessions {
        debug!(
            needed = config.min_training_sessions,
            "not enough usable sessions, using heuristic"
        );
        return DurationPredictor::heuristic(config);
    }

    match RegressionModel::fit(&samples, config.ridge_penalty) {
        Ok(model) => {
            info!(
                coefficients = model.coefficients.len(),
                intercept = model.intercept,
                "regression predictor trained"
            );
            DurationPredictor::regression(model, config)
        }
        Err(e) => {
            warn!(error = %e, "training failed, using heuristic");
            DurationPredictor::heuristic(config)
        }
    }
}
