use crate::error::{Error, Result};
use crate::types::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Label reported with every ranking
pub const RANKING_METHOD: &str = "knn_standardized_euclidean";

/// Partner suggestions for one requester
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchReport {
    pub requester: String,
    pub method: String,
    /// Nearest first
    pub matches: Vec<RankedCandidate>,
    /// Why the match list is empty, when it is
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl MatchReport {
    fn empty(requester: &str, message: &str) -> Self {
        Self {
            requester: requester.to_string(),
            method: RANKING_METHOD.to_string(),
            matches: Vec::new(),
            message: Some(message.to_string()),
        }
    }
}

/// Per-column location and spread of the current pool
#[derive(Clone, Copy, Debug, PartialEq)]
struct Standardizer {
    means: [f64; 2],
    scales: [f64; 2],
}

impl Standardizer {
    /// Population statistics; a constant column keeps unit scale
    fn fit(points: &[[f64; 2]]) -> Self {
        let n = points.len().max(1) as f64;
        let mut means = [0.0; 2];
        let mut scales = [1.0; 2];
        for column in 0..2 {
            let mean = points.iter().map(|p| p[column]).sum::<f64>() / n;
            let variance = points.iter().map(|p| (p[column] - mean).powi(2)).sum::<f64>() / n;
            means[column] = mean;
            if variance > 0.0 {
                scales[column] = variance.sqrt();
            }
        }
        Self { means, scales }
    }

    fn transform(&self, point: &[f64; 2]) -> [f64; 2] {
        [
            (point[0] - self.means[0]) / self.scales[0],
            (point[1] - self.means[1]) / self.scales[1],
        ]
    }
}

/// Ranks candidates by similarity of rank and play-style intensity
pub struct CompatibilityRanker<'a> {
    style_weights: &'a StyleWeights,
}

impl<'a> CompatibilityRanker<'a> {
    pub fn new(style_weights: &'a StyleWeights) -> Self {
        Self { style_weights }
    }

    fn raw_features(&self, candidate: &Candidate) -> [f64; 2] {
        [
            candidate.rank as f64,
            self.style_weights.intensity(candidate.play_style) as f64,
        ]
    }

    /// Euclidean distance between two standardized points
    pub fn calculate_distance(a: &[f64; 2], b: &[f64; 2]) -> f64 {
        ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
    }

    /// The `k` candidates nearest to the requester, nearest first.
    ///
    /// Scaling is fitted on the pool passed in, requester included, so
    /// distances only compare within one call. The search asks for `k + 1`
    /// neighbours because the requester is its own nearest neighbour, then
    /// drops it. Equal distances keep pool order.
    pub fn rank(&self, requester_id: &str, pool: &[Candidate], k: usize) -> MatchReport {
        let Some(requester) = pool.iter().find(|c| c.id == requester_id) else {
            debug!(requester_id, pool = pool.len(), "requester not in candidate pool");
            return MatchReport::empty(requester_id, "requester not found in candidate pool");
        };
        if pool.len() < 2 {
            return MatchReport::empty(requester_id, "not enough candidates to suggest a partner");
        }

        let raw: Vec<[f64; 2]> = pool.iter().map(|c| self.raw_features(c)).collect();
        let scaler = Standardizer::fit(&raw);
        let origin = scaler.transform(&self.raw_features(requester));

        let mut neighbours: Vec<(usize, f64)> = raw
            .iter()
            .enumerate()
            .map(|(index, point)| (index, Self::calculate_distance(&origin, &scaler.transform(point))))
            .collect();
        // Stable, so ties stay in pool order
        neighbours.sort_by(|a, b| a.1.total_cmp(&b.1));
        neighbours.truncate(k.saturating_add(1));

        let matches: Vec<RankedCandidate> = neighbours
            .into_iter()
            .filter(|&(index, _)| pool[index].id != requester_id)
            .take(k)
            .map(|(index, distance)| {
                let candidate = &pool[index];
                RankedCandidate {
                    id: candidate.id.clone(),
                    distance,
                    rank: candidate.rank,
                    play_style: candidate.play_style,
                    username: candidate.username.clone(),
                }
            })
            .collect();

        debug!(requester_id, pool = pool.len(), k, returned = matches.len(), "ranked candidates");

        MatchReport {
            requester: requester_id.to_string(),
            method: RANKING_METHOD.to_string(),
            matches,
            message: None,
        }
    }
}

/// Suggest play partners for a requester from the branch's waiting users
pub fn rank_candidates(
    requester_id: &str,
    candidates: &[Candidate],
    k: usize,
    config: &EngineConfig,
) -> Result<MatchReport> {
    if requester_id.is_empty() {
        return Err(Error::EmptyIdentifier { what: "requester id" });
    }
    config.validate()?;
    config.validate_neighbours(k)?;
    Ok(CompatibilityRanker::new(&config.style_weights).rank(requester_id, candidates, k))
}
