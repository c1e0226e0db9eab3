use crate::config::{ReplayConfig, TimeAnchor};

/// Decides, once per applied update, whether a checkpoint is due.
pub trait CheckpointScheduler {
    /// Clears counters and the time anchor ahead of a new partition.
    fn reset(&mut self);

    /// Records one applied update at `ts_local_us` and reports whether a checkpoint fires on it.
    fn on_update(&mut self, ts_local_us: i64) -> bool;
}

/// Count and time cadences combined with OR semantics.
///
/// The count cadence fires on every `every_updates`-th applied update, counting from the first
/// update of the partition; its counter is never reset by emissions. The time cadence fires when
/// at least `every_us` has elapsed since `last_checkpoint_ts`, which is anchored on the first
/// update (that update itself never fires on time) and advances on every emission, whichever
/// cadence triggered it.
#[derive(Debug, Clone)]
pub struct CadenceScheduler {
    every_us: Option<i64>,
    every_updates: Option<u64>,
    anchor: TimeAnchor,
    applied: u64,
    last_checkpoint_ts: Option<i64>,
}

impl CadenceScheduler {
    pub fn new(every_us: Option<i64>, every_updates: Option<u64>, anchor: TimeAnchor) -> Self {
        Self {
            every_us: every_us.filter(|value| *value > 0),
            every_updates: every_updates.filter(|value| *value > 0),
            anchor,
            applied: 0,
            last_checkpoint_ts: None,
        }
    }

    pub fn from_config(config: &ReplayConfig) -> Self {
        Self::new(
            config.checkpoint_every_us,
            config.checkpoint_every_updates,
            config.time_anchor,
        )
    }

    pub fn applied(&self) -> u64 {
        self.applied
    }

    pub fn last_checkpoint_ts(&self) -> Option<i64> {
        self.last_checkpoint_ts
    }

    fn align(&self, ts_local_us: i64) -> i64 {
        match (self.anchor, self.every_us) {
            (TimeAnchor::Grid, Some(every_us)) => {
                ts_local_us.saturating_sub(ts_local_us.rem_euclid(every_us))
            }
            _ => ts_local_us,
        }
    }
}

impl CheckpointScheduler for CadenceScheduler {
    fn reset(&mut self) {
        self.applied = 0;
        self.last_checkpoint_ts = None;
    }

    fn on_update(&mut self, ts_local_us: i64) -> bool {
        self.applied = self.applied.saturating_add(1);

        let count_due = matches!(self.every_updates, Some(every) if self.applied % every == 0);
        let time_due = match (self.every_us, self.last_checkpoint_ts) {
            (Some(every_us), Some(last_ts)) => ts_local_us.saturating_sub(last_ts) >= every_us,
            _ => false,
        };

        let emit = count_due || time_due;
        if emit || self.last_checkpoint_ts.is_none() {
            self.last_checkpoint_ts = Some(self.align(ts_local_us));
        }
        emit
    }
}
