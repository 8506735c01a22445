//! Fade-in bookkeeping for tiles becoming visible.
//!
//! The tracker is owned by the renderer and keyed by tile id, so fade state
//! needs no storage on the shared tiles themselves and survives exactly as
//! long as the tile identity does: a tile evicted and re-created at the same
//! coordinate gets a fresh id and fades in again.

use crate::prelude::HashMap;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Fade {
    Started(f64),
    Done,
}

/// Tracks per-tile fade-in alpha over a frame clock in milliseconds
#[derive(Debug)]
pub struct TransitionTracker {
    duration: f64,
    fades: HashMap<u64, Fade>,
}

impl TransitionTracker {
    /// `duration` in milliseconds; zero disables fading entirely
    pub fn new(duration: f64) -> Self {
        Self {
            duration: duration.max(0.0),
            fades: HashMap::default(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.duration > 0.0
    }

    pub fn len(&self) -> usize {
        self.fades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fades.is_empty()
    }

    /// Current alpha for a tile: `clamp((time - start) / duration, 0, 1)`.
    ///
    /// The first call for a tile id starts its fade at `time`. Without
    /// fading, or once a fade was ended, the alpha is 1.
    pub fn alpha(&mut self, tile_id: u64, time: f64) -> f64 {
        if !self.enabled() {
            return 1.0;
        }
        match self.fades.entry(tile_id).or_insert(Fade::Started(time)) {
            Fade::Done => 1.0,
            Fade::Started(start) => ((time - *start) / self.duration).clamp(0.0, 1.0),
        }
    }

    /// Whether the tile still has a fade ahead of or around it.
    ///
    /// A tile whose fade never started counts as in transition; only an
    /// explicit [`TransitionTracker::end`] settles it.
    pub fn in_transition(&self, tile_id: u64) -> bool {
        self.enabled() && !matches!(self.fades.get(&tile_id), Some(Fade::Done))
    }

    /// Settle a tile's fade so it stays fully opaque from now on
    pub fn end(&mut self, tile_id: u64) {
        if self.enabled() {
            self.fades.insert(tile_id, Fade::Done);
        }
    }

    /// Drops settled entries for tiles outside `keep`; in-flight fades are
    /// retained so an ongoing fade never restarts
    pub fn prune(&mut self, keep: &crate::prelude::HashSet<u64>) {
        self.fades
            .retain(|id, fade| keep.contains(id) || matches!(fade, Fade::Started(_)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alpha_is_monotonic_and_reaches_one() {
        let mut fades = TransitionTracker::new(250.0);
        let mut last = fades.alpha(1, 1000.0);
        assert_eq!(last, 0.0);
        for step in 1..=10 {
            let alpha = fades.alpha(1, 1000.0 + step as f64 * 50.0);
            assert!(alpha >= last);
            last = alpha;
        }
        assert_eq!(fades.alpha(1, 1250.0), 1.0);
        assert_eq!(fades.alpha(1, 9999.0), 1.0);
    }

    #[test]
    fn test_alpha_midpoint() {
        let mut fades = TransitionTracker::new(200.0);
        fades.alpha(7, 0.0);
        assert!((fades.alpha(7, 100.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_disabled_tracker_is_always_opaque() {
        let mut fades = TransitionTracker::new(0.0);
        assert_eq!(fades.alpha(1, 123.0), 1.0);
        assert!(!fades.in_transition(1));
        assert!(fades.is_empty());
    }

    #[test]
    fn test_end_settles_fade() {
        let mut fades = TransitionTracker::new(250.0);
        fades.alpha(3, 0.0);
        assert!(fades.in_transition(3));
        fades.end(3);
        assert!(!fades.in_transition(3));
        assert_eq!(fades.alpha(3, 1.0), 1.0);
    }

    #[test]
    fn test_unseen_tile_counts_as_in_transition() {
        let fades = TransitionTracker::new(250.0);
        assert!(fades.in_transition(42));
    }

    #[test]
    fn test_prune_keeps_live_and_inflight_entries() {
        let mut fades = TransitionTracker::new(250.0);
        fades.alpha(1, 0.0);
        fades.end(1);
        fades.alpha(2, 0.0);
        fades.end(2);
        fades.alpha(3, 0.0); // still fading

        let mut keep = crate::prelude::HashSet::default();
        keep.insert(1);
        fades.prune(&keep);

        assert!(!fades.in_transition(1));
        assert!(fades.in_transition(2)); // entry dropped, will fade again
        assert_eq!(fades.len(), 2);
    }
}
