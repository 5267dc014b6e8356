//! Event table: the experimental timeline of a recording.
//!
//! Onsets arrive in seconds and are converted to sample indices with
//! `floor(onset_s × sampling_rate)`.  Every label gets a 1-based positional
//! suffix (`"Silence"` → `"Silence_2"`), whether or not it collides with
//! another label; downstream reports match on the suffixed form.
use serde::Serialize;

use crate::config::Timeline;
use crate::error::{PipelineError, Result};

/// One labeled condition onset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    /// Sample index at which the condition begins.
    pub onset: usize,
    /// Suffixed, unique label.
    pub label: String,
}

/// Ordered sequence of [`Event`]s, immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventTable {
    events: Vec<Event>,
}

impl EventTable {
    /// Build the table from onsets in seconds and raw labels.
    ///
    /// Onset order is kept as given; out-of-order or repeated onsets are the
    /// segmenter's concern, not a construction error.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Configuration`] when the two sequences differ in
    /// length, an onset is negative or not finite, a label is empty, or the
    /// sampling rate is zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use physio_epochs::EventTable;
    ///
    /// let labels = vec!["Absorptive".to_string(), "Silence".to_string()];
    /// let table = EventTable::build(&[56.2, 356.2], &labels, 2000).unwrap();
    /// assert_eq!(table.onsets(), vec![112_400, 712_400]);
    /// assert_eq!(table.labels(), vec!["Absorptive_1", "Silence_2"]);
    /// ```
    pub fn build(onset_seconds: &[f64], labels: &[String], sampling_rate: u32) -> Result<Self> {
        if onset_seconds.len() != labels.len() {
            return Err(PipelineError::Configuration(format!(
                "{} onsets but {} labels",
                onset_seconds.len(),
                labels.len()
            )));
        }
        if sampling_rate == 0 {
            return Err(PipelineError::Configuration(
                "sampling rate must be a positive integer".into(),
            ));
        }

        let sr = sampling_rate as f64;
        let mut events = Vec::with_capacity(labels.len());
        for (i, (&secs, label)) in onset_seconds.iter().zip(labels).enumerate() {
            if !secs.is_finite() || secs < 0.0 {
                return Err(PipelineError::Configuration(format!(
                    "onset {i} ({secs} s) must be a non-negative number of seconds"
                )));
            }
            if label.trim().is_empty() {
                return Err(PipelineError::Configuration(format!("label {i} is empty")));
            }
            events.push(Event {
                onset: (secs * sr).floor() as usize,
                label: format!("{}_{}", label, i + 1),
            });
        }
        Ok(Self { events })
    }

    pub fn from_timeline(timeline: &Timeline, sampling_rate: u32) -> Result<Self> {
        Self::build(&timeline.onsets_s, &timeline.labels, sampling_rate)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn onsets(&self) -> Vec<usize> {
        self.events.iter().map(|e| e.onset).collect()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.events.iter().map(|e| e.label.as_str()).collect()
    }
}
