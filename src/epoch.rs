//! Event-locked epoching.
//!
//! Turns an [`EventTable`] into `[onset, offset)` sample ranges.  Under the
//! next-onset rule the epochs tile `[first_onset, total_length)` exactly;
//! samples before the first onset belong to no epoch.
//!
//! Repeated or mis-ordered onsets produce degenerate epochs
//! (`onset >= offset`).  They are returned as-is; the aggregator skips them.
use serde::Serialize;

use crate::config::{BoundaryRule, PipelineConfig};
use crate::events::EventTable;

/// Sample range of one labeled epoch, offset exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EpochBounds {
    pub label: String,
    pub onset: usize,
    pub offset: usize,
}

impl EpochBounds {
    /// Number of samples covered; zero for a degenerate epoch.
    pub fn len(&self) -> usize {
        self.offset.saturating_sub(self.onset)
    }

    pub fn is_degenerate(&self) -> bool {
        self.onset >= self.offset
    }
}

/// Split `total_length` samples at each event onset (next-onset rule, no
/// exclusions).
///
/// ```
/// use physio_epochs::{epoch::segment, EventTable};
///
/// let labels = vec!["A".to_string(), "B".to_string()];
/// let events = EventTable::build(&[0.0, 2.0], &labels, 10).unwrap();
/// let epochs = segment(&events, 50);
/// assert_eq!((epochs[0].onset, epochs[0].offset), (0, 20));
/// assert_eq!((epochs[1].onset, epochs[1].offset), (20, 50));
/// ```
pub fn segment(events: &EventTable, total_length: usize) -> Vec<EpochBounds> {
    let ev = events.events();
    ev.iter()
        .enumerate()
        .map(|(i, e)| EpochBounds {
            label: e.label.clone(),
            onset: e.onset,
            offset: ev.get(i + 1).map_or(total_length, |next| next.onset),
        })
        .collect()
}

// ── Label exclusion ─────────────────────────────────────────────────────────

/// Case-insensitive substring predicate over event labels.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LabelFilter {
    needles: Vec<String>,
}

impl LabelFilter {
    pub fn new<S: AsRef<str>>(needles: &[S]) -> Self {
        Self {
            needles: needles
                .iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Filter that excludes nothing.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn excludes(&self, label: &str) -> bool {
        let lower = label.to_lowercase();
        self.needles.iter().any(|n| lower.contains(n.as_str()))
    }
}

// ── Configurable segmenter ──────────────────────────────────────────────────

/// Epochs kept for analysis plus those removed by the label filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segmentation {
    pub epochs: Vec<EpochBounds>,
    pub excluded: Vec<EpochBounds>,
}

/// Segmenter with a configurable boundary rule and exclusion filter.
#[derive(Debug, Clone)]
pub struct Segmenter {
    pub boundary: BoundaryRule,
    pub exclude: LabelFilter,
    pub sampling_rate: u32,
}

impl Segmenter {
    pub fn new(boundary: BoundaryRule, exclude: LabelFilter, sampling_rate: u32) -> Self {
        Self { boundary, exclude, sampling_rate }
    }

    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self::new(
            cfg.boundary.clone(),
            LabelFilter::new(&cfg.excluded_labels),
            cfg.sampling_rate,
        )
    }

    /// Compute bounds for every event, then drop the excluded ones.
    ///
    /// Exclusion happens after the bounds are derived, so under the
    /// next-onset rule the epoch before an excluded event still ends at that
    /// event's onset.
    pub fn segment(&self, events: &EventTable, total_length: usize) -> Segmentation {
        let all = match &self.boundary {
            BoundaryRule::NextOnset => segment(events, total_length),
            BoundaryRule::FixedDuration { .. } => self.fixed_bounds(events, total_length),
        };
        let (excluded, epochs): (Vec<_>, Vec<_>) =
            all.into_iter().partition(|e| self.exclude.excludes(&e.label));
        for e in &excluded {
            log::debug!("excluding epoch {} [{}, {})", e.label, e.onset, e.offset);
        }
        Segmentation { epochs, excluded }
    }

    fn fixed_bounds(&self, events: &EventTable, total_length: usize) -> Vec<EpochBounds> {
        let sr = self.sampling_rate as f64;
        events
            .events()
            .iter()
            .map(|e| {
                let secs = self.boundary.duration_for(&e.label).unwrap_or(0.0);
                let span = (secs * sr).floor() as usize;
                EpochBounds {
                    label: e.label.clone(),
                    onset: e.onset,
                    offset: e.onset.saturating_add(span).min(total_length),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(onsets: &[f64], labels: &[&str], sr: u32) -> EventTable {
        let labels: Vec<String> = labels.iter().map(|s| s.to_string()).collect();
        EventTable::build(onsets, &labels, sr).unwrap()
    }

    #[test]
    fn last_epoch_runs_to_end() {
        let ev = table(&[1.0, 3.0], &["a", "b"], 10);
        let ep = segment(&ev, 100);
        assert_eq!(ep[1].offset, 100);
        assert_eq!(ep[0].offset, ep[1].onset);
    }

    #[test]
    fn equal_onsets_give_degenerate_epoch() {
        let ev = table(&[1.0, 1.0, 3.0], &["a", "b", "c"], 100);
        let ep = segment(&ev, 1000);
        assert!(ep[0].is_degenerate());
        assert_eq!(ep[0].len(), 0);
        assert!(!ep[1].is_degenerate());
    }

    #[test]
    fn misordered_onsets_give_negative_span() {
        let ev = table(&[5.0, 1.0], &["a", "b"], 10);
        let ep = segment(&ev, 100);
        assert_eq!((ep[0].onset, ep[0].offset), (50, 10));
        assert!(ep[0].is_degenerate());
    }

    #[test]
    fn filter_is_case_insensitive_substring() {
        let f = LabelFilter::new(&["pci"]);
        assert!(f.excludes("PCI_3"));
        assert!(f.excludes("post-Pci_4"));
        assert!(!f.excludes("Absorptive_1"));
        assert!(!LabelFilter::none().excludes("PCI_3"));
    }

    #[test]
    fn exclusion_keeps_neighbour_bounds() {
        let ev = table(&[0.0, 10.0, 20.0], &["Absorptive", "PCI", "Silence"], 1);
        let seg = Segmenter::new(BoundaryRule::NextOnset, LabelFilter::new(&["pci"]), 1)
            .segment(&ev, 30);
        assert_eq!(seg.epochs.len(), 2);
        assert_eq!(seg.epochs[0].offset, 10);
        assert_eq!(seg.excluded[0].label, "PCI_2");
    }

    #[test]
    fn fixed_duration_clamps_to_length() {
        let ev = table(&[0.0, 420.0], &["Absorptive", "Silence"], 2);
        let rule = BoundaryRule::fixed(420.0).with_override("silence", 180.0);
        let seg = Segmenter::new(rule, LabelFilter::none(), 2).segment(&ev, 1000);
        assert_eq!((seg.epochs[0].onset, seg.epochs[0].offset), (0, 840));
        assert_eq!((seg.epochs[1].onset, seg.epochs[1].offset), (840, 1000));
    }
}
