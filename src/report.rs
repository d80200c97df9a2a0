use std::collections::BTreeMap;
use std::fmt;

use crate::config::SchedulingModel;

/// One callback invocation as seen by the probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Firing {
    pub name: &'static str,
    pub due: i64,
    pub lateness: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventStats {
    pub count: usize,
    pub first_due: i64,
    pub last_due: i64,
    pub max_lateness: i64,
}

impl EventStats {
    fn new(firing: &Firing) -> Self {
        Self {
            count: 1,
            first_due: firing.due,
            last_due: firing.due,
            max_lateness: firing.lateness,
        }
    }

    fn record(&mut self, firing: &Firing) {
        self.count += 1;
        self.first_due = self.first_due.min(firing.due);
        self.last_due = self.last_due.max(firing.due);
        self.max_lateness = self.max_lateness.max(firing.lateness);
    }
}

#[derive(Debug, Clone)]
pub struct Report {
    pub model: SchedulingModel,
    /// Virtual time at the end of the run.
    pub elapsed_ns: i64,
    pub firings: Vec<Firing>,
    pub stats: BTreeMap<&'static str, EventStats>,
}

impl Report {
    pub fn new(model: SchedulingModel, elapsed_ns: i64, firings: Vec<Firing>) -> Self {
        let mut stats: BTreeMap<&'static str, EventStats> = BTreeMap::new();
        for firing in &firings {
            stats
                .entry(firing.name)
                .and_modify(|s| s.record(firing))
                .or_insert_with(|| EventStats::new(firing));
        }
        Self {
            model,
            elapsed_ns,
            firings,
            stats,
        }
    }

    pub fn count(&self, name: &str) -> usize {
        self.stats.get(name).map_or(0, |s| s.count)
    }

    pub fn total(&self) -> usize {
        self.firings.len()
    }
}

fn ms(ns: i64) -> f64 {
    ns as f64 / 1_000_000.0
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let model = match self.model {
            SchedulingModel::SingleCore => "single-core",
            SchedulingModel::Multicore => "multicore",
        };
        writeln!(
            f,
            "{model}: {} firings over {:.3} ms",
            self.total(),
            ms(self.elapsed_ns)
        )?;
        writeln!(
            f,
            "{:<10} {:>6} {:>12} {:>12} {:>12}",
            "event", "count", "first ms", "last ms", "max late us"
        )?;
        for (name, s) in &self.stats {
            writeln!(
                f,
                "{:<10} {:>6} {:>12.3} {:>12.3} {:>12.1}",
                name,
                s.count,
                ms(s.first_due),
                ms(s.last_due),
                s.max_lateness as f64 / 1_000.0
            )?;
        }
        Ok(())
    }
}
