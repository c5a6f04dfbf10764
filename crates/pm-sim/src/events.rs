//! Event bookkeeping for threshold-terminated simulation.

use crate::error::{SimError, SimResult};
use crate::model::EventFlags;
use pm_core::Fields;
use std::collections::BTreeMap;

/// Clamp an event-state value to [0, 1]. NaN passes through.
pub fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() { v } else { v.clamp(0.0, 1.0) }
}

/// Tracks the first time each event's threshold was met.
#[derive(Clone, Debug)]
pub(crate) struct EventTracker {
    selected: Vec<String>,
    first_met: BTreeMap<String, f64>,
}

impl EventTracker {
    /// `selected` empty means every model event.
    pub(crate) fn new(events: &Fields, selected: &[String]) -> SimResult<Self> {
        if let Some(unknown) = selected.iter().find(|name| !events.contains(name)) {
            return Err(SimError::InvalidOption {
                what: format!(
                    "event '{unknown}' is not one of the model events [{}]",
                    events.names().join(", ")
                ),
            });
        }
        Ok(Self {
            selected: selected.to_vec(),
            first_met: BTreeMap::new(),
        })
    }

    /// Record newly met events at `t`. Returns true once the stop condition holds.
    pub(crate) fn observe(&mut self, t: f64, flags: &EventFlags) -> bool {
        for name in flags.met_events() {
            self.first_met.entry(name).or_insert(t);
        }
        flags.all_columns_met(&self.selected)
    }

    /// Selected events already met, in model order.
    pub(crate) fn met_selected(&self, flags: &EventFlags) -> Vec<String> {
        flags
            .met_events()
            .into_iter()
            .filter(|name| self.selected.is_empty() || self.selected.contains(name))
            .collect()
    }

    pub(crate) fn into_times(self) -> BTreeMap<String, f64> {
        self.first_met
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pm_core::FieldSet;

    #[test]
    fn clamp_unit_range() {
        assert_eq!(clamp_unit(-0.5), 0.0);
        assert_eq!(clamp_unit(0.5), 0.5);
        assert_eq!(clamp_unit(1.5), 1.0);
        assert!(clamp_unit(f64::NAN).is_nan());
    }

    #[test]
    fn unknown_event_rejected() {
        let events = FieldSet::shared(["impact"]).unwrap();
        assert!(EventTracker::new(&events, &["falling".to_string()]).is_err());
    }

    #[test]
    fn first_met_time_is_kept() {
        let events = FieldSet::shared(["falling", "impact"]).unwrap();
        let mut tracker = EventTracker::new(&events, &["impact".to_string()]).unwrap();

        let falling = EventFlags::from_flags(&events, &[true, false]).unwrap();
        assert!(!tracker.observe(4.0, &falling));
        let both = EventFlags::from_flags(&events, &[true, true]).unwrap();
        assert!(tracker.observe(8.0, &both));
        assert_eq!(tracker.met_selected(&both), vec!["impact".to_string()]);

        let times = tracker.into_times();
        assert_eq!(times["falling"], 4.0);
        assert_eq!(times["impact"], 8.0);
    }
}
