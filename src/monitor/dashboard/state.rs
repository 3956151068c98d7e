//! Dashboard state

use std::collections::{HashMap, VecDeque};

use crate::monitor::{ScannerSnapshot, Snapshot};

/// Points kept per metric for the history chart
const MAX_HISTORY: usize = 120;

#[derive(Debug, Default)]
pub struct DashboardState {
    /// Most recent snapshot
    pub latest: Option<Snapshot>,

    /// Recent numeric values per `(scanner, metric)`
    history: HashMap<(String, String), VecDeque<f64>>,

    /// Selected scanner row
    pub selected: usize,

    /// Paused state (stops applying new snapshots)
    pub paused: bool,
}

impl DashboardState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, snapshot: Snapshot) {
        if self.paused {
            return;
        }

        for scanner in &snapshot.scanners {
            for entry in &scanner.entries {
                let Some(value) = entry.value.as_f64() else {
                    continue;
                };

                let points = self
                    .history
                    .entry((scanner.scanner.clone(), entry.metric_id.clone()))
                    .or_default();
                points.push_back(value);
                if points.len() > MAX_HISTORY {
                    points.pop_front();
                }
            }
        }

        let count = snapshot.scanners.len();
        if count > 0 && self.selected >= count {
            self.selected = count - 1;
        }
        self.latest = Some(snapshot);
    }

    fn scanner_count(&self) -> usize {
        self.latest.as_ref().map_or(0, |s| s.scanners.len())
    }

    pub fn select_next(&mut self) {
        let count = self.scanner_count();
        if count > 0 {
            self.selected = (self.selected + 1) % count;
        }
    }

    pub fn select_previous(&mut self) {
        let count = self.scanner_count();
        if count > 0 {
            self.selected = (self.selected + count - 1) % count;
        }
    }

    pub fn selected_scanner(&self) -> Option<&ScannerSnapshot> {
        self.latest.as_ref()?.scanners.get(self.selected)
    }

    pub fn history(&self, scanner: &str, metric_id: &str) -> Option<&VecDeque<f64>> {
        self.history
            .get(&(scanner.to_string(), metric_id.to_string()))
    }

    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }
}
