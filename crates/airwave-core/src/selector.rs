use crate::track::Track;
use rand::Rng;
use std::collections::VecDeque;

/// How many recently played track ids are remembered for repeat avoidance.
const RECENT_CAPACITY: usize = 5;

/// Below this pool size the recent-id filter is skipped entirely; tiny
/// pools would otherwise starve.
const MIN_POOL_FOR_AVOIDANCE: usize = 4;

/// Bounded re-draws when the random pick lands on the most recent track.
const REDRAW_ATTEMPTS: usize = 10;

/// Picks a track from a station's candidate list while avoiding short-term
/// repeats. Avoidance is a heuristic, never a block: an exhausted pool
/// falls back to the unfiltered candidates.
#[derive(Debug, Default)]
pub struct TrackSelector {
    recent: VecDeque<String>,
}

impl TrackSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of recently selected tracks, most recent last.
    pub fn recent_ids(&self) -> impl Iterator<Item = &str> {
        self.recent.iter().map(|s| s.as_str())
    }

    pub fn clear(&mut self) {
        self.recent.clear();
    }

    pub fn select(&mut self, candidates: &[Track]) -> Option<Track> {
        self.select_with(&mut rand::thread_rng(), candidates)
    }

    /// Deterministic entry point for tests: same logic, caller-supplied RNG.
    pub fn select_with<R: Rng>(&mut self, rng: &mut R, candidates: &[Track]) -> Option<Track> {
        let playable: Vec<&Track> = candidates.iter().filter(|t| t.is_playable()).collect();
        if playable.is_empty() {
            return None;
        }

        let filtered: Vec<&Track> = if playable.len() >= MIN_POOL_FOR_AVOIDANCE {
            let kept: Vec<&Track> = playable
                .iter()
                .copied()
                .filter(|t| {
                    t.id.as_deref()
                        .map(|id| !self.recent.iter().any(|r| r == id))
                        .unwrap_or(true)
                })
                .collect();
            if kept.is_empty() {
                playable.clone()
            } else {
                kept
            }
        } else {
            playable.clone()
        };

        let mut pick = filtered[rng.gen_range(0..filtered.len())];
        // Re-draw a bounded number of times if we landed on the track that
        // just played. Pure avoidance, not a guarantee.
        let last_played = self.recent.back().cloned();
        if let Some(last) = last_played {
            for _ in 0..REDRAW_ATTEMPTS {
                if pick.id.as_deref() != Some(last.as_str()) {
                    break;
                }
                pick = filtered[rng.gen_range(0..filtered.len())];
            }
        }

        if let Some(id) = &pick.id {
            self.remember(id.clone());
        }
        Some(pick.clone())
    }

    fn remember(&mut self, id: String) {
        self.recent.push_back(id);
        while self.recent.len() > RECENT_CAPACITY {
            self.recent.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn track(id: &str) -> Track {
        Track {
            id: Some(id.to_string()),
            uri: Some(format!("spotify:track:{id}")),
            name: id.to_string(),
            artists: vec![],
            duration_ms: 200_000,
            album: None,
        }
    }

    fn unplayable(id: &str) -> Track {
        Track {
            id: Some(id.to_string()),
            uri: None,
            name: id.to_string(),
            artists: vec![],
            duration_ms: 200_000,
            album: None,
        }
    }

    #[test]
    fn test_empty_and_unplayable_pools_yield_none() {
        let mut sel = TrackSelector::new();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(sel.select_with(&mut rng, &[]).is_none());
        assert!(sel
            .select_with(&mut rng, &[unplayable("a"), unplayable("b")])
            .is_none());
    }

    #[test]
    fn test_unplayable_tracks_never_selected() {
        let mut sel = TrackSelector::new();
        let mut rng = StdRng::seed_from_u64(2);
        let pool = vec![unplayable("a"), track("b"), unplayable("c")];
        for _ in 0..20 {
            let picked = sel.select_with(&mut rng, &pool).unwrap();
            assert_eq!(picked.id.as_deref(), Some("b"));
        }
    }

    // With pool size > recent history the selected id is never in the
    // recent set.
    #[test]
    fn test_recent_avoidance_property() {
        let mut sel = TrackSelector::new();
        let mut rng = StdRng::seed_from_u64(3);
        let pool: Vec<Track> = (0..8).map(|i| track(&format!("t{i}"))).collect();

        for _ in 0..100 {
            let before: Vec<String> = sel.recent_ids().map(String::from).collect();
            let picked = sel.select_with(&mut rng, &pool).unwrap();
            let id = picked.id.unwrap();
            assert!(
                !before.contains(&id),
                "picked {id} which is in recent history {before:?}"
            );
        }
    }

    #[test]
    fn test_small_pool_skips_avoidance() {
        let mut sel = TrackSelector::new();
        let mut rng = StdRng::seed_from_u64(4);
        let pool = vec![track("a"), track("b"), track("c")];
        // 3 < 4: repeats allowed, selection must still always succeed.
        for _ in 0..30 {
            assert!(sel.select_with(&mut rng, &pool).is_some());
        }
    }

    #[test]
    fn test_exhausted_filter_falls_back_to_full_pool() {
        let mut sel = TrackSelector::new();
        let mut rng = StdRng::seed_from_u64(5);
        let pool = vec![track("a"), track("b"), track("c"), track("d")];
        // Fill history with the entire pool.
        for id in ["a", "b", "c", "d"] {
            sel.remember(id.to_string());
        }
        assert!(sel.select_with(&mut rng, &pool).is_some());
    }

    #[test]
    fn test_recent_capped_at_five() {
        let mut sel = TrackSelector::new();
        for i in 0..9 {
            sel.remember(format!("t{i}"));
        }
        let recent: Vec<&str> = sel.recent_ids().collect();
        assert_eq!(recent, vec!["t4", "t5", "t6", "t7", "t8"]);
    }
}
