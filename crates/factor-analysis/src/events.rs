use analysis_core::{AlignedReturnPair, AnalysisError, EventWindow};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::rolling::{fit_window, OlsFit, WindowEstimate};

/// Single regression over the aligned observations inside a labelled range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFit {
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub observations: usize,
    pub fit: WindowEstimate<OlsFit>,
}

/// Fit `asset ~ 1 + benchmark` separately for each event, in input order.
pub fn fit_event_windows(
    pair: &AlignedReturnPair,
    events: &[EventWindow],
) -> Result<Vec<EventFit>, AnalysisError> {
    if let Some(bad) = events.iter().find(|e| e.start > e.end) {
        return Err(AnalysisError::InvalidData(format!(
            "event '{}' starts ({}) after it ends ({})",
            bad.label, bad.start, bad.end
        )));
    }

    events
        .iter()
        .map(|event| -> Result<EventFit, AnalysisError> {
            let slice = pair.filter_by_time(|ts| event.contains(ts));
            let fit = fit_window(slice.asset(), slice.benchmark())?;
            tracing::debug!("event '{}': {} observations", event.label, slice.len());
            Ok(EventFit {
                label: event.label.clone(),
                start: event.start,
                end: event.end,
                observations: slice.len(),
                fit,
            })
        })
        .collect()
}
