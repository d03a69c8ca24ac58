use crate::error::{Error, Result};
use crate::features::{FeatureExtractor, ProfileSource};
use crate::predictor::{DurationPredictor, PredictionMethod};
use crate::types::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Minutes until each cabinet becomes free
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceClocks {
    clocks: Vec<f64>,
}

impl ResourceClocks {
    pub fn new(resource_count: usize) -> Self {
        Self {
            clocks: vec![0.0; resource_count],
        }
    }

    /// Earliest free cabinet; the lowest index wins ties
    pub fn earliest(&self) -> Option<(usize, f64)> {
        self.clocks
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best, (index, value)| match best {
                Some((_, best_value)) if best_value <= value => best,
                _ => Some((index, value)),
            })
    }

    pub fn min(&self) -> f64 {
        self.earliest().map(|(_, value)| value).unwrap_or(0.0)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.clocks
    }

    pub fn total(&self) -> f64 {
        self.clocks.iter().sum()
    }
}

/// One waiting group placed on a cabinet
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    /// Position in the waiting list
    pub group_index: usize,
    pub resource: usize,
    /// Minutes from now until the group starts playing
    pub starts_in: f64,
    pub duration: f64,
}

/// Result of one simulation pass
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationOutcome {
    pub estimated_minutes: f64,
    pub queue_length: usize,
    /// True when the target participant was found in the waiting list
    pub in_queue: bool,
    /// Clocks after seeding active sessions
    pub initial_clocks: ResourceClocks,
    /// Clocks after the whole waiting list was dispatched
    pub final_clocks: ResourceClocks,
    pub assignments: Vec<Assignment>,
}

/// Greedy earliest-free-cabinet dispatcher driven by a duration predictor
pub struct WaitSimulator<'a, S: ProfileSource + ?Sized> {
    predictor: &'a DurationPredictor,
    extractor: FeatureExtractor<'a, S>,
    active_floor_minutes: f64,
}

impl<'a, S: ProfileSource + ?Sized> WaitSimulator<'a, S> {
    pub fn new(predictor: &'a DurationPredictor, profiles: &'a S, config: &EngineConfig) -> Self {
        Self {
            predictor,
            extractor: FeatureExtractor::new(profiles),
            active_floor_minutes: config.active_floor_minutes,
        }
    }

    fn predicted_minutes(&self, session: &Session) -> f64 {
        let features = self.extractor.extract(session.participants.as_slice());
        self.predictor.predict(&features)
    }

    /// Run one deterministic dispatch pass.
    ///
    /// Active sessions occupy cabinets in input order, one each; sessions
    /// beyond `resource_count` are ignored. Waiting groups are then placed
    /// first-in-first-out on the earliest free cabinet. When the target's
    /// group is placed, the wait it saw before its own duration was added is
    /// the estimate; otherwise the estimate is the earliest free time after
    /// the whole queue.
    ///
    /// `resource_count` must be at least one.
    pub fn simulate(
        &self,
        resource_count: usize,
        active_sessions: &[Session],
        waiting_groups: &[Session],
        target_participant_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> SimulationOutcome {
        let mut clocks = ResourceClocks::new(resource_count);

        if active_sessions.len() > resource_count {
            debug!(
                active = active_sessions.len(),
                resource_count, "more active sessions than cabinets, ignoring extras"
            );
        }
        for (clock, session) in clocks.clocks.iter_mut().zip(active_sessions) {
            let remaining = self.predicted_minutes(session) - session.elapsed_minutes(now);
            *clock = remaining.max(self.active_floor_minutes);
        }
        let initial_clocks = clocks.clone();

        let mut target_wait = None;
        let mut assignments = Vec::with_capacity(waiting_groups.len());
        for (group_index, group) in waiting_groups.iter().enumerate() {
            let Some((resource, starts_in)) = clocks.earliest() else {
                break;
            };

            if target_wait.is_none() && target_participant_id.is_some_and(|id| group.includes(id)) {
                target_wait = Some(starts_in);
            }

            let duration = self.predicted_minutes(group);
            clocks.clocks[resource] += duration;
            assignments.push(Assignment {
                group_index,
                resource,
                starts_in,
                duration,
            });
        }

        let (estimated_minutes, in_queue) = match target_wait {
            Some(wait) => (wait, true),
            None => (clocks.min(), false),
        };

        SimulationOutcome {
            estimated_minutes,
            queue_length: waiting_groups.len(),
            in_queue,
            initial_clocks,
            final_clocks: clocks,
            assignments,
        }
    }
}

/// Inputs for a wait estimate at one branch
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitRequest {
    pub branch_capacity: u32,
    #[serde(default)]
    pub active_sessions: Vec<Session>,
    /// Already in arrival order
    #[serde(default)]
    pub waiting_groups: Vec<Session>,
    #[serde(default)]
    pub target_participant_id: Option<String>,
}

impl WaitRequest {
    /// Build a request from a branch record and its mixed session list
    pub fn for_branch(
        branch: &BranchInfo,
        sessions: impl IntoIterator<Item = Session>,
        target_participant_id: Option<String>,
    ) -> Self {
        let snapshot = QueueSnapshot::from_sessions(sessions);
        Self {
            branch_capacity: branch.capacity(),
            active_sessions: snapshot.active,
            waiting_groups: snapshot.waiting,
            target_participant_id,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.branch_capacity == 0 {
            return Err(Error::ZeroCapacity);
        }
        if matches!(self.target_participant_id.as_deref(), Some("")) {
            return Err(Error::EmptyIdentifier {
                what: "target participant id",
            });
        }
        Ok(())
    }
}

/// Wait estimate reported to the host
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WaitEstimate {
    pub estimated_minutes: f64,
    pub queue_length: usize,
    /// Cabinets the simulation dispatched onto
    pub active_machines: u32,
    pub method: PredictionMethod,
    pub in_queue: bool,
}

/// Estimate the wait at a branch with an already trained predictor
pub fn estimate_wait<S: ProfileSource + ?Sized>(
    request: &WaitRequest,
    profiles: &S,
    predictor: &DurationPredictor,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> Result<WaitEstimate> {
    config.validate()?;
    request.validate()?;

    let simulator = WaitSimulator::new(predictor, profiles, config);
    let outcome = simulator.simulate(
        request.branch_capacity as usize,
        &request.active_sessions,
        &request.waiting_groups,
        request.target_participant_id.as_deref(),
        now,
    );

    info!(
        estimated_minutes = outcome.estimated_minutes,
        queue_length = outcome.queue_length,
        in_queue = outcome.in_queue,
        method = %predictor.method(),
        "wait estimated"
    );

    Ok(WaitEstimate {
        estimated_minutes: outcome.estimated_minutes,
        queue_length: outcome.queue_length,
        active_machines: request.branch_capacity,
        method: predictor.method(),
        in_queue: outcome.in_queue,
    })
}
