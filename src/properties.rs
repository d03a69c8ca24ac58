//! Property-based tests for the dispatch, prediction and ranking engines.
//!
//! These tests use proptest to verify:
//! - Cabinet clocks never go negative and absorb exactly the dispatched minutes
//! - Predictions stay inside the duration bounds for any feature record
//! - Rankings exclude the requester and have the documented length
//! - Rankings ignore a uniform shift of every rank

#![cfg(test)]

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::HashMap;

use crate::matchmaker::rank_candidates;
use crate::predictor::{train_predictor, DurationPredictor};
use crate::simulation::WaitSimulator;
use crate::types::*;

// =============================================================================
// Arbitrary Generators
// =============================================================================

fn arb_style() -> impl Strategy<Value = PlayStyle> {
    prop::sample::select(PlayStyle::ALL.to_vec())
}

prop_compose! {
    fn arb_features()(
        duo in any::<bool>(),
        p1_rank in prop::option::of(any::<u32>()),
        p1_style in arb_style(),
        p2_rank in prop::option::of(any::<u32>()),
        p2_style in arb_style(),
    ) -> GroupFeatures {
        GroupFeatures {
            participant_count: if duo { 2 } else { 1 },
            p1_rank,
            p1_style,
            p2_rank: if duo { p2_rank } else { Some(0) },
            p2_style: if duo { Some(p2_style) } else { None },
        }
    }
}

prop_compose! {
    fn arb_pool()(ranks in prop::collection::vec((0u32..20_000, arb_style()), 2..15)) -> Vec<Candidate> {
        ranks
            .into_iter()
            .enumerate()
            .map(|(i, (rank, style))| Candidate::new(&format!("c{}", i), rank, style))
            .collect()
    }
}

fn roster() -> HashMap<String, ParticipantProfile> {
    (0..8)
        .map(|i| {
            let style = PlayStyle::ALL[i % PlayStyle::ALL.len()];
            (format!("p{}", i), ParticipantProfile::new(800 + 250 * i as u32, style))
        })
        .collect()
}

fn group(members: &[usize]) -> Vec<String> {
    members.iter().map(|m| format!("p{}", m % 8)).collect()
}

/// Regression predictor with a steep rank slope, so extreme inputs overshoot
fn steep_predictor() -> DurationPredictor {
    let profiles = roster();
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
    let history: Vec<HistoricalSession> = (0..40)
        .map(|n| {
            let host = n % 8;
            let minutes = 6 + host as i64 * 4;
            let started = start + Duration::hours(n as i64);
            HistoricalSession {
                participants: group(&[host]),
                started_at: Some(started),
                ended_at: Some(started + Duration::minutes(minutes)),
            }
        })
        .collect();
    train_predictor(&history, &profiles, &EngineConfig::default())
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn clocks_stay_non_negative_and_conserve_minutes(
        resource_count in 1usize..5,
        active in prop::collection::vec((prop::collection::vec(0usize..8, 1..3), 0i64..90), 0..7),
        waiting in prop::collection::vec(prop::collection::vec(0usize..8, 1..3), 1..12),
    ) {
        let profiles = roster();
        let config = EngineConfig::default();
        let predictor = DurationPredictor::heuristic(&config);
        let simulator = WaitSimulator::new(&predictor, &profiles, &config);
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 19, 0, 0).unwrap();

        let active: Vec<Session> = active
            .iter()
            .map(|(members, elapsed)| Session {
                id: None,
                participants: group(members),
                started_at: Some(now - Duration::minutes(*elapsed)),
                created_at: None,
                status: SessionStatus::Playing,
            })
            .collect();
        let waiting: Vec<Session> = waiting
            .iter()
            .map(|members| Session {
                participants: group(members),
                ..Session::queued(&[])
            })
            .collect();

        let outcome = simulator.simulate(resource_count, &active, &waiting, None, now);

        prop_assert!(outcome.initial_clocks.as_slice().iter().all(|c| *c >= 0.0));
        prop_assert!(outcome.final_clocks.as_slice().iter().all(|c| *c >= 0.0));
        prop_assert_eq!(outcome.assignments.len(), waiting.len());

        let dispatched: f64 = outcome.assignments.iter().map(|a| a.duration).sum();
        let absorbed = outcome.final_clocks.total() - outcome.initial_clocks.total();
        prop_assert!((dispatched - absorbed).abs() < 1e-9);
        prop_assert!(outcome.estimated_minutes >= 0.0);
    }

    #[test]
    fn predictions_respect_bounds(features in arb_features()) {
        let config = EngineConfig::default();
        for predictor in [DurationPredictor::heuristic(&config), steep_predictor()] {
            let minutes = predictor.predict(&features);
            prop_assert!((5.0..=30.0).contains(&minutes), "{} out of bounds", minutes);
        }
    }

    #[test]
    fn ranking_excludes_requester(pool in arb_pool(), pick in any::<prop::sample::Index>(), k in 1usize..=6) {
        let requester = pool[pick.index(pool.len())].id.clone();
        let report = rank_candidates(&requester, &pool, k, &EngineConfig::default()).unwrap();

        prop_assert_eq!(report.matches.len(), k.min(pool.len() - 1));
        prop_assert!(report.matches.iter().all(|m| m.id != requester));
        prop_assert!(report.matches.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn ranking_ignores_uniform_rank_shift(pool in arb_pool(), shift in 0u32..100_000, k in 1usize..=6) {
        let config = EngineConfig::default();
        let shifted: Vec<Candidate> = pool
            .iter()
            .map(|c| Candidate { rank: c.rank + shift, ..c.clone() })
            .collect();

        let before = rank_candidates("c0", &pool, k, &config).unwrap().matches;
        let after = rank_candidates("c0", &shifted, k, &config).unwrap().matches;

        prop_assert_eq!(before.len(), after.len());
        for (i, (b, a)) in before.iter().zip(&after).enumerate() {
            prop_assert!((b.distance - a.distance).abs() < 1e-6);
            // Ids only compare where float noise cannot reorder near-ties
            let isolated = before
                .iter()
                .enumerate()
                .all(|(j, other)| j == i || (other.distance - b.distance).abs() > 1e-6);
            if isolated {
                prop_assert_eq!(&b.id, &a.id);
            }
        }
    }
}

#[test]
fn ranking_changes_under_per_candidate_shift() {
    let config = EngineConfig::default();
    let pool = vec![
        Candidate::new("me", 1000, PlayStyle::Casual),
        Candidate::new("near", 1100, PlayStyle::Casual),
        Candidate::new("away", 2000, PlayStyle::Casual),
    ];
    let first = rank_candidates("me", &pool, 1, &config).unwrap();
    assert_eq!(first.matches[0].id, "near");

    let mut moved = pool.clone();
    moved[1].rank += 5000;
    let second = rank_candidates("me", &moved, 1, &config).unwrap();
    assert_eq!(second.matches[0].id, "away");
}

#[test]
fn steep_predictor_uses_regression() {
    assert_eq!(steep_predictor().method().as_str(), "ai_multivariate_regression");
}
