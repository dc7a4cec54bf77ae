//! Snapshot generation and the window reset policy applied on each rotation.
use std::sync::Arc;

use chrono::{DateTime, Datelike, Local, TimeDelta};

use crate::key::GroupKey;
use crate::stats::{CounterBlock, StatsRegistry, Window, WindowCounts};

/// Format of the timestamp at the start of each report line.
pub const DISPLAY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Which windows a rotation resets.
///
/// Hourly is always reset. Daily and monthly are reset when the calendar day
/// (resp. month) of the rotation differs from the one of the previous rotation.
/// The first rotation has no previous rotation and never resets them.
///
/// Only the day-of-month and month-of-year fields are compared; the year is
/// not, so two rotations exactly one year apart look like the same period.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResetPlan {
    /// Reset the daily window.
    pub daily: bool,
    /// Reset the monthly window.
    pub monthly: bool,
}

impl ResetPlan {
    /// Decides the resets for a rotation at `now` given the previous rotation.
    pub fn new(now: DateTime<Local>, last_rotation: Option<DateTime<Local>>) -> Self {
        match last_rotation {
            None => ResetPlan {
                daily: false,
                monthly: false,
            },
            Some(last) => ResetPlan {
                daily: now.day() != last.day(),
                monthly: now.month() != last.month(),
            },
        }
    }

    fn resets(&self, window: Window) -> bool {
        match window {
            Window::Hourly => true,
            Window::Daily => self.daily,
            Window::Monthly => self.monthly,
        }
    }
}

/// One group's observed values within a [`Snapshot`].
#[derive(Debug)]
pub struct SnapshotRow {
    key: GroupKey,
    block: Arc<CounterBlock>,
    observed: [WindowCounts; 3],
}

impl SnapshotRow {
    /// The group this row belongs to.
    pub fn key(&self) -> &GroupKey {
        &self.key
    }

    /// The value reported for `window`.
    ///
    /// Hourly reports everything counted since the previous committed rotation.
    /// A daily or monthly window that this rotation resets reports the
    /// post-reset value, which is zero relative to the snapshot.
    pub fn reported(&self, window: Window, plan: &ResetPlan) -> WindowCounts {
        match window {
            Window::Hourly => self.observed[0],
            Window::Daily if plan.daily => WindowCounts::default(),
            Window::Daily => self.observed[1],
            Window::Monthly if plan.monthly => WindowCounts::default(),
            Window::Monthly => self.observed[2],
        }
    }
}

/// The result of reading every registry entry for one rotation.
///
/// Building a snapshot does not modify any counter. The planned resets are
/// applied by [`Snapshot::commit`], which the caller invokes once the lines
/// have been persisted. Dropping a snapshot without committing it leaves the
/// counters untouched, so nothing is lost if the sink fails.
#[derive(Debug)]
#[must_use = "a snapshot does nothing unless its lines are written and it is committed"]
pub struct Snapshot {
    timestamp: DateTime<Local>,
    plan: ResetPlan,
    rows: Vec<SnapshotRow>,
}

impl Snapshot {
    /// The rotation instant this snapshot was taken for.
    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    /// The resets that [`Snapshot::commit`] applies.
    pub fn plan(&self) -> ResetPlan {
        self.plan
    }

    /// The rows, one per group.
    pub fn rows(&self) -> &[SnapshotRow] {
        &self.rows
    }

    /// Returns `true` if the registry held no groups.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Renders one report line per group.
    pub fn lines(&self) -> Vec<String> {
        let display = (self.timestamp - TimeDelta::seconds(1)).format(DISPLAY_TIMESTAMP_FORMAT);
        self.rows
            .iter()
            .map(|row| {
                let h = row.reported(Window::Hourly, &self.plan);
                let d = row.reported(Window::Daily, &self.plan);
                let m = row.reported(Window::Monthly, &self.plan);
                format!(
                    "[{}] env:{}, service:{} | Hourly(Total:{}, HTTP:{}, SQL:{}) | Daily(Total:{}, HTTP:{}, SQL:{}) | Monthly(Total:{}, HTTP:{}, SQL:{})",
                    display,
                    row.key.environment(),
                    row.key.service(),
                    h.total,
                    h.http,
                    h.sql,
                    d.total,
                    d.http,
                    d.sql,
                    m.total,
                    m.http,
                    m.sql,
                )
            })
            .collect()
    }

    /// Applies the planned resets by subtracting the observed values.
    ///
    /// Spans counted after the snapshot was taken stay in the live counters.
    pub fn commit(self) {
        for row in &self.rows {
            for (i, window) in Window::ALL.into_iter().enumerate() {
                if self.plan.resets(window) {
                    row.block.subtract(window, row.observed[i]);
                }
            }
        }
    }
}

/// Reads the registry and produces rotation snapshots.
#[derive(Debug)]
pub struct ReportGenerator {
    registry: Arc<StatsRegistry>,
}

impl ReportGenerator {
    /// Creates a generator over `registry`.
    pub fn new(registry: Arc<StatsRegistry>) -> Self {
        ReportGenerator { registry }
    }

    /// Takes a snapshot of every group for a rotation at `now`.
    pub fn snapshot(&self, now: DateTime<Local>, last_rotation: Option<DateTime<Local>>) -> Snapshot {
        let plan = ResetPlan::new(now, last_rotation);
        let rows = self
            .registry
            .entries()
            .into_iter()
            .map(|(key, block)| {
                let observed = Window::ALL.map(|window| block.window(window));
                SnapshotRow {
                    key,
                    block,
                    observed,
                }
            })
            .collect();
        Snapshot {
            timestamp: now,
            plan,
            rows,
        }
    }
}
