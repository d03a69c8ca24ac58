use crate::types::*;
use std::collections::HashMap;
use tracing::debug;

/// Read-only access to participant profiles (the external profile store)
pub trait ProfileSource {
    fn profile(&self, participant_id: &str) -> Option<&ParticipantProfile>;
}

impl ProfileSource for HashMap<String, ParticipantProfile> {
    fn profile(&self, participant_id: &str) -> Option<&ParticipantProfile> {
        self.get(participant_id)
    }
}

/// Turns groups of participant ids into feature records
pub struct FeatureExtractor<'a, S: ProfileSource + ?Sized> {
    profiles: &'a S,
}

impl<'a, S: ProfileSource + ?Sized> FeatureExtractor<'a, S> {
    pub fn new(profiles: &'a S) -> Self {
        Self { profiles }
    }

    /// Build the feature record for a group.
    ///
    /// Ids without a profile are skipped, so a stale reference never fails
    /// extraction. If nothing resolves the group still counts as one
    /// participant, with an unknown host rank and Casual style. A missing
    /// play style reads as Casual. Only the first two resolved participants
    /// are used; the first is always the host.
    pub fn extract<I: AsRef<str>>(&self, participant_ids: &[I]) -> GroupFeatures {
        let resolved: Vec<&ParticipantProfile> = participant_ids
            .iter()
            .filter_map(|id| self.profiles.profile(id.as_ref()))
            .collect();

        if resolved.len() < participant_ids.len() {
            debug!(
                requested = participant_ids.len(),
                resolved = resolved.len(),
                "skipping participants without a profile"
            );
        }

        let host = resolved.first();
        let guest = resolved.get(1);

        GroupFeatures {
            participant_count: resolved.len().clamp(1, 2) as u8,
            p1_rank: host.and_then(|p| p.rank),
            p1_style: host.and_then(|p| p.play_style).unwrap_or_default(),
            p2_rank: match guest {
                Some(p) => p.rank,
                None => Some(0),
            },
            p2_style: guest.map(|p| p.play_style.unwrap_or_default()),
        }
    }
}
