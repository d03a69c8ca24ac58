use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};

/// Play style labels used by the arcade's user profiles
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PlayStyle {
    #[default]
    Casual,
    ChihoGrinder,
    Spammer14k,
    LoneWolf,
    SoloBoring,
}

impl PlayStyle {
    pub const ALL: [PlayStyle; 5] = [
        PlayStyle::Casual,
        PlayStyle::ChihoGrinder,
        PlayStyle::Spammer14k,
        PlayStyle::LoneWolf,
        PlayStyle::SoloBoring,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            PlayStyle::Casual => "Casual",
            PlayStyle::ChihoGrinder => "Chiho Grinder",
            PlayStyle::Spammer14k => "14k Spammer",
            PlayStyle::LoneWolf => "Lone Wolf",
            PlayStyle::SoloBoring => "Solo Boring",
        }
    }

    /// Parse a stored label; unrecognized labels yield `None`
    pub fn from_label(label: &str) -> Option<PlayStyle> {
        Self::ALL.iter().copied().find(|style| style.label() == label)
    }
}

// Profiles written by older clients may carry labels outside the vocabulary.
impl From<String> for PlayStyle {
    fn from(label: String) -> Self {
        PlayStyle::from_label(&label).unwrap_or_default()
    }
}

impl From<PlayStyle> for String {
    fn from(style: PlayStyle) -> Self {
        style.label().to_string()
    }
}

impl fmt::Display for PlayStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Category label for the guest slot of a solo group
pub const NO_GUEST_STYLE: &str = "None";

/// Read-only snapshot of a user profile, as held by the profile store
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantProfile {
    #[serde(default)]
    pub rank: Option<u32>,
    #[serde(default)]
    pub play_style: Option<PlayStyle>,
    #[serde(default)]
    pub username: Option<String>,
}

impl ParticipantProfile {
    pub fn new(rank: u32, play_style: PlayStyle) -> Self {
        Self {
            rank: Some(rank),
            play_style: Some(play_style),
            username: None,
        }
    }
}

/// Fixed feature record for one group (host first, guest second)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupFeatures {
    /// Always 1 or 2
    pub participant_count: u8,
    /// `None` when the host has no resolvable rank
    pub p1_rank: Option<u32>,
    pub p1_style: PlayStyle,
    /// `Some(0)` for solo groups
    pub p2_rank: Option<u32>,
    /// `None` for solo groups; encoded as its own "None" category
    pub p2_style: Option<PlayStyle>,
}

impl GroupFeatures {
    pub fn solo(rank: u32, style: PlayStyle) -> Self {
        Self {
            participant_count: 1,
            p1_rank: Some(rank),
            p1_style: style,
            p2_rank: Some(0),
            p2_style: None,
        }
    }

    pub fn duo(host: (u32, PlayStyle), guest: (u32, PlayStyle)) -> Self {
        Self {
            participant_count: 2,
            p1_rank: Some(host.0),
            p1_style: host.1,
            p2_rank: Some(guest.0),
            p2_style: Some(guest.1),
        }
    }

    pub fn p1_style_label(&self) -> &'static str {
        self.p1_style.label()
    }

    pub fn p2_style_label(&self) -> &'static str {
        self.p2_style.map(|s| s.label()).unwrap_or(NO_GUEST_STYLE)
    }
}

/// Session lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Queued,
    Playing,
    Completed,
    Abandoned,
}

/// One occupancy of a cabinet by a group of 1-2 participants
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default)]
    pub id: Option<String>,
    /// Host first, guest second
    pub participants: Vec<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
}

impl Session {
    pub fn queued(participants: &[&str]) -> Self {
        Self {
            id: None,
            participants: participants.iter().map(|p| p.to_string()).collect(),
            started_at: None,
            created_at: None,
            status: SessionStatus::Queued,
        }
    }

    pub fn playing(participants: &[&str], started_at: DateTime<Utc>) -> Self {
        Self {
            started_at: Some(started_at),
            status: SessionStatus::Playing,
            ..Self::queued(participants)
        }
    }

    pub fn includes(&self, participant_id: &str) -> bool {
        self.participants.iter().any(|p| p == participant_id)
    }

    /// Minutes since the session started; zero when unknown or in the future
    pub fn elapsed_minutes(&self, now: DateTime<Utc>) -> f64 {
        match self.started_at {
            Some(started) => {
                let elapsed = (now - started).num_milliseconds() as f64 / 60_000.0;
                elapsed.max(0.0)
            }
            None => 0.0,
        }
    }
}

/// Completed session used for predictor training
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalSession {
    pub participants: Vec<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

impl HistoricalSession {
    /// Played minutes, if both timestamps are known
    pub fn duration_minutes(&self) -> Option<f64> {
        let started = self.started_at?;
        let ended = self.ended_at?;
        Some((ended - started).num_milliseconds() as f64 / 60_000.0)
    }
}

/// Branch record as stored; a missing cabinet count means one cabinet
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchInfo {
    #[serde(default)]
    pub cabinet_count: Option<u32>,
}

impl BranchInfo {
    pub fn capacity(&self) -> u32 {
        self.cabinet_count.unwrap_or(1)
    }
}

/// Branch sessions split into what occupies cabinets and what waits for them
#[derive(Clone, Debug, Default)]
pub struct QueueSnapshot {
    pub active: Vec<Session>,
    pub waiting: Vec<Session>,
}

impl QueueSnapshot {
    /// Split a branch-filtered session list. Waiting groups are ordered by
    /// arrival; sessions without a creation time keep their input position
    /// relative to each other and sort after timestamped ones.
    pub fn from_sessions(sessions: impl IntoIterator<Item = Session>) -> Self {
        let mut snapshot = QueueSnapshot::default();
        for session in sessions {
            match session.status {
                SessionStatus::Playing => snapshot.active.push(session),
                SessionStatus::Queued => snapshot.waiting.push(session),
                SessionStatus::Completed | SessionStatus::Abandoned => {}
            }
        }
        snapshot
            .waiting
            .sort_by_key(|s| (s.created_at.is_none(), s.created_at));
        snapshot
    }
}

/// Candidate for partner suggestions
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: String,
    #[serde(default)]
    pub rank: u32,
    #[serde(default)]
    pub play_style: PlayStyle,
    #[serde(default)]
    pub username: Option<String>,
}

impl Candidate {
    pub fn new(id: &str, rank: u32, play_style: PlayStyle) -> Self {
        Self {
            id: id.to_string(),
            rank,
            play_style,
            username: None,
        }
    }
}

/// One ranked partner suggestion
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedCandidate {
    #[serde(rename = "uid")]
    pub id: String,
    /// Euclidean distance in standardized feature space; lower is a better match
    #[serde(rename = "compatibility_score")]
    pub distance: f64,
    pub rank: u32,
    pub play_style: PlayStyle,
    pub username: Option<String>,
}

/// Fixed intensity weight per play style
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StyleWeights(HashMap<PlayStyle, u32>);

impl StyleWeights {
    pub fn new(weights: impl IntoIterator<Item = (PlayStyle, u32)>) -> Self {
        Self(weights.into_iter().collect())
    }

    /// Styles missing from the table weigh the same as Casual play
    pub fn intensity(&self, style: PlayStyle) -> u32 {
        self.0
            .get(&style)
            .or_else(|| self.0.get(&PlayStyle::Casual))
            .copied()
            .unwrap_or(1)
    }
}

impl Default for StyleWeights {
    fn default() -> Self {
        Self::new([
            (PlayStyle::Casual, 1),
            (PlayStyle::LoneWolf, 2),
            (PlayStyle::SoloBoring, 2),
            (PlayStyle::ChihoGrinder, 3),
            (PlayStyle::Spammer14k, 4),
        ])
    }
}

/// Largest neighbour count a config may allow
pub const MAX_NEIGHBOURS_LIMIT: usize = 6;

/// Engine configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minutes per song in the heuristic duration
    pub minutes_per_song: f64,
    /// Fixed setup minutes added to every heuristic duration
    pub setup_minutes: f64,
    /// Songs in a credit for solo and duo groups
    pub solo_songs: u32,
    pub duo_songs: u32,
    /// Bounds applied to every predicted duration (minutes)
    pub min_duration: f64,
    pub max_duration: f64,
    /// Usable historical sessions needed before regression is attempted
    pub min_training_sessions: usize,
    /// Exclusive duration band for training samples (minutes)
    pub training_min_minutes: f64,
    pub training_max_minutes: f64,
    /// L2 penalty on non-intercept coefficients
    pub ridge_penalty: f64,
    /// Floor for the remaining minutes of an overrunning active session
    pub active_floor_minutes: f64,
    /// Upper bound on partner suggestions per request
    pub max_neighbours: usize,
    pub style_weights: StyleWeights,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            minutes_per_song: 3.5,
            setup_minutes: 1.5,
            solo_songs: 3,
            duo_songs: 4,
            min_duration: 5.0,
            max_duration: 30.0,
            min_training_sessions: 11,
            training_min_minutes: 5.0,
            training_max_minutes: 40.0,
            ridge_penalty: 1e-6,
            active_floor_minutes: 1.0,
            max_neighbours: 6,
            style_weights: StyleWeights::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON config; omitted fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| -> Result<()> { Err(Error::InvalidConfig { reason }) };

        if !self.min_duration.is_finite() || !self.max_duration.is_finite() {
            return invalid("duration bounds must be finite".to_string());
        }
        if self.min_duration < 0.0 || self.min_duration > self.max_duration {
            return invalid(format!(
                "duration bounds {}..{} are not an ordered non-negative range",
                self.min_duration, self.max_duration
            ));
        }
        if !(self.training_min_minutes < self.training_max_minutes) {
            return invalid(format!(
                "training band {}..{} is empty",
                self.training_min_minutes, self.training_max_minutes
            ));
        }
        if !(self.minutes_per_song.is_finite() && self.setup_minutes.is_finite()) {
            return invalid("heuristic minutes must be finite".to_string());
        }
        if !(self.ridge_penalty.is_finite() && self.ridge_penalty >= 0.0) {
            return invalid(format!("ridge penalty {} must be non-negative", self.ridge_penalty));
        }
        if !(self.active_floor_minutes.is_finite() && self.active_floor_minutes >= 0.0) {
            return invalid(format!(
                "active floor {} must be non-negative",
                self.active_floor_minutes
            ));
        }
        if self.max_neighbours == 0 || self.max_neighbours > MAX_NEIGHBOURS_LIMIT {
            return invalid(format!(
                "max_neighbours {} is outside 1..={}",
                self.max_neighbours, MAX_NEIGHBOURS_LIMIT
            ));
        }
        Ok(())
    }

    pub fn in_training_band(&self, minutes: f64) -> bool {
        minutes > self.training_min_minutes && minutes < self.training_max_minutes
    }

    pub fn validate_neighbours(&self, k: usize) -> Result<()> {
        if k == 0 || k > self.max_neighbours {
            return Err(Error::InvalidNeighbourCount {
                k,
                max: self.max_neighbours,
            });
        }
        Ok(())
    }
}
