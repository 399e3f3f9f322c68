// Copyright 2026 Boundless Foundation, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Poll tiers, the trigger predicate and the once-per-epoch debounce.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::epoch::{EpochSnapshot, BPS_PER_EPOCH};

/// Polling urgency, ordered from least to most urgent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum PollTier {
    Idle,
    Approaching,
    Near,
    Critical,
}

impl fmt::Display for PollTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PollTier::Idle => "idle",
            PollTier::Approaching => "approaching",
            PollTier::Near => "near",
            PollTier::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// Tier thresholds and the poll interval of each tier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    /// Progress (basis points) at which polling speeds up to the approaching interval.
    pub approaching_bps: u64,
    pub near_bps: u64,
    pub critical_bps: u64,
    /// Remaining seconds at or below which the tier is critical regardless of progress.
    pub critical_remaining_secs: u64,
    pub idle_interval_ms: u64,
    pub approaching_interval_ms: u64,
    pub near_interval_ms: u64,
    pub critical_interval_ms: u64,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            approaching_bps: 9_000,
            near_bps: 9_500,
            critical_bps: 9_700,
            critical_remaining_secs: 25,
            idle_interval_ms: 15_000,
            approaching_interval_ms: 4_000,
            near_interval_ms: 1_000,
            critical_interval_ms: 200,
        }
    }
}

impl TierConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.approaching_bps <= self.near_bps
            && self.near_bps <= self.critical_bps
            && self.critical_bps <= BPS_PER_EPOCH)
        {
            return Err(format!(
                "tier thresholds must be ordered and at most {BPS_PER_EPOCH}: approaching {} near {} critical {}",
                self.approaching_bps, self.near_bps, self.critical_bps
            ));
        }
        if self.critical_interval_ms == 0 {
            return Err("critical_interval_ms must be greater than zero".into());
        }
        if !(self.critical_interval_ms <= self.near_interval_ms
            && self.near_interval_ms <= self.approaching_interval_ms
            && self.approaching_interval_ms <= self.idle_interval_ms)
        {
            return Err("tier intervals must not grow as urgency increases".into());
        }
        Ok(())
    }

    pub fn tier(&self, snapshot: &EpochSnapshot) -> PollTier {
        let progress = snapshot.progress_bps();
        if progress >= self.critical_bps || snapshot.remaining <= self.critical_remaining_secs {
            PollTier::Critical
        } else if progress >= self.near_bps {
            PollTier::Near
        } else if progress >= self.approaching_bps {
            PollTier::Approaching
        } else {
            PollTier::Idle
        }
    }

    pub fn interval(&self, tier: PollTier) -> Duration {
        let ms = match tier {
            PollTier::Idle => self.idle_interval_ms,
            PollTier::Approaching => self.approaching_interval_ms,
            PollTier::Near => self.near_interval_ms,
            PollTier::Critical => self.critical_interval_ms,
        };
        Duration::from_millis(ms)
    }
}

/// When, relative to the epoch boundary, the flush is fired.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerPolicy {
    /// Fire in the last `fire_before_secs` of an epoch, aiming for the first
    /// block of the next one.
    PreBoundary { fire_before_secs: u64 },
    /// Fire in the first `fire_within_secs` of an epoch, once the boundary has
    /// been observed.
    PostBoundary { fire_within_secs: u64 },
}

impl Default for TriggerPolicy {
    fn default() -> Self {
        TriggerPolicy::PreBoundary { fire_before_secs: 5 }
    }
}

impl fmt::Display for TriggerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerPolicy::PreBoundary { fire_before_secs } => {
                write!(f, "{fire_before_secs}s before epoch end")
            }
            TriggerPolicy::PostBoundary { fire_within_secs } => {
                write!(f, "within {fire_within_secs}s after epoch start")
            }
        }
    }
}

impl TriggerPolicy {
    pub fn in_window(&self, snapshot: &EpochSnapshot) -> bool {
        match *self {
            TriggerPolicy::PreBoundary { fire_before_secs } => snapshot.remaining <= fire_before_secs,
            TriggerPolicy::PostBoundary { fire_within_secs } => {
                snapshot.time_into < fire_within_secs
            }
        }
    }

    /// Seconds until the next fire window opens, zero when inside one.
    pub fn secs_until_window(&self, snapshot: &EpochSnapshot) -> u64 {
        if self.in_window(snapshot) {
            return 0;
        }
        match *self {
            TriggerPolicy::PreBoundary { fire_before_secs } => {
                snapshot.remaining - fire_before_secs
            }
            TriggerPolicy::PostBoundary { .. } => snapshot.remaining,
        }
    }
}

/// Maps each snapshot to a poll interval and decides whether the window is open.
#[derive(Clone, Debug, Default)]
pub struct Scheduler {
    pub tiers: TierConfig,
    pub policy: TriggerPolicy,
}

impl Scheduler {
    pub fn new(tiers: TierConfig, policy: TriggerPolicy) -> Self {
        Self { tiers, policy }
    }

    pub fn tier(&self, snapshot: &EpochSnapshot) -> PollTier {
        self.tiers.tier(snapshot)
    }

    pub fn should_fire(&self, snapshot: &EpochSnapshot) -> bool {
        self.policy.in_window(snapshot)
    }

    /// Sleep before the next tick: the tier interval, shortened so the loop
    /// wakes up by the time the fire window opens.
    pub fn next_sleep(&self, snapshot: &EpochSnapshot) -> Duration {
        let floor = self.tiers.interval(PollTier::Critical);
        let interval = self.tiers.interval(self.tier(snapshot));
        let until_window = Duration::from_secs(self.policy.secs_until_window(snapshot));
        interval.min(until_window).max(floor)
    }
}

/// Debounce state shared by every path that may fire the action.
#[derive(Debug, Default)]
pub struct TriggerState {
    last_acted_epoch: Mutex<Option<u64>>,
    processing: AtomicBool,
}

impl TriggerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_acted_epoch(&self) -> Option<u64> {
        self.last_acted_epoch.lock().map(|guard| *guard).unwrap_or_else(|err| *err.into_inner())
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Claims the right to act on `epoch`.
    ///
    /// Returns `None` when the epoch was already acted on or another attempt is
    /// in flight. The processing flag is set here, synchronously, so callers
    /// must call this before their first await.
    pub fn try_begin(&self, epoch: u64) -> Option<ProcessingGuard<'_>> {
        if self.last_acted_epoch() == Some(epoch) {
            return None;
        }
        if self
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        // Another path may have finished this epoch between the first check and the swap.
        if self.last_acted_epoch() == Some(epoch) {
            self.processing.store(false, Ordering::Release);
            return None;
        }
        Some(ProcessingGuard { state: self, epoch })
    }

    fn mark_acted(&self, epoch: u64) {
        match self.last_acted_epoch.lock() {
            Ok(mut last) => *last = Some(epoch),
            Err(err) => *err.into_inner() = Some(epoch),
        }
    }
}

/// Held while an action is in flight. Dropping it clears the processing flag.
#[derive(Debug)]
pub struct ProcessingGuard<'a> {
    state: &'a TriggerState,
    epoch: u64,
}

impl ProcessingGuard<'_> {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Records that no further attempt should be made for this epoch.
    pub fn mark_acted(&self) {
        self.state.mark_acted(self.epoch);
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.state.processing.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epoch::{compute_epoch, EpochClockConfig, GenesisSource};

    const GENESIS: u64 = 1_700_000_000;
    const DURATION: u64 = 2304;

    fn snapshot(epoch: u64, remaining: u64) -> EpochSnapshot {
        let config = EpochClockConfig::new(GENESIS, DURATION, GenesisSource::Contract).unwrap();
        compute_epoch(GENESIS + (epoch + 1) * DURATION - remaining, &config).unwrap()
    }

    #[test]
    fn tiers_follow_progress() {
        let tiers = TierConfig::default();
        // 90% of 2304 is 2073.6 seconds in.
        assert_eq!(tiers.tier(&snapshot(3, DURATION)), PollTier::Idle);
        assert_eq!(tiers.tier(&snapshot(3, DURATION - 2073)), PollTier::Idle);
        assert_eq!(tiers.tier(&snapshot(3, DURATION - 2074)), PollTier::Approaching);
        assert_eq!(tiers.tier(&snapshot(3, DURATION - 2189)), PollTier::Near);
        assert_eq!(tiers.tier(&snapshot(3, DURATION - 2235)), PollTier::Critical);
        assert_eq!(tiers.tier(&snapshot(3, 1)), PollTier::Critical);
    }

    #[test]
    fn absolute_critical_threshold() {
        let tiers = TierConfig { critical_bps: 10_000, ..Default::default() };
        assert_eq!(tiers.tier(&snapshot(0, 26)), PollTier::Near);
        assert_eq!(tiers.tier(&snapshot(0, 25)), PollTier::Critical);
    }

    #[test]
    fn tier_config_validation() {
        assert!(TierConfig::default().validate().is_ok());
        let unordered = TierConfig { near_bps: 9_800, ..Default::default() };
        assert!(unordered.validate().is_err());
        let slow_critical = TierConfig { critical_interval_ms: 5_000, ..Default::default() };
        assert!(slow_critical.validate().is_err());
    }

    #[test]
    fn pre_boundary_window() {
        let scheduler =
            Scheduler::new(TierConfig::default(), TriggerPolicy::PreBoundary { fire_before_secs: 25 });
        assert!(!scheduler.should_fire(&snapshot(7, 26)));
        assert!(scheduler.should_fire(&snapshot(7, 25)));
        assert!(scheduler.should_fire(&snapshot(7, 24)));
    }

    #[test]
    fn post_boundary_window() {
        let scheduler = Scheduler::new(
            TierConfig::default(),
            TriggerPolicy::PostBoundary { fire_within_secs: 30 },
        );
        assert!(scheduler.should_fire(&snapshot(7, DURATION)));
        assert!(scheduler.should_fire(&snapshot(7, DURATION - 29)));
        assert!(!scheduler.should_fire(&snapshot(7, DURATION - 30)));
        assert!(!scheduler.should_fire(&snapshot(7, 1)));
    }

    #[test]
    fn sleep_is_capped_by_window() {
        let scheduler =
            Scheduler::new(TierConfig::default(), TriggerPolicy::PreBoundary { fire_before_secs: 5 });
        // Idle, far from the window: full idle interval.
        assert_eq!(scheduler.next_sleep(&snapshot(0, 2000)), Duration::from_secs(15));
        // Inside the window: fastest interval.
        assert_eq!(scheduler.next_sleep(&snapshot(0, 3)), Duration::from_millis(200));

        // Wide pre-boundary windows open before the critical tier. The sleep
        // stops at the window instead of running the full tier interval.
        let tiers = TierConfig { near_interval_ms: 10_000, ..Default::default() };
        let scheduler = Scheduler::new(tiers, TriggerPolicy::PreBoundary { fire_before_secs: 97 });
        let near = snapshot(0, 100);
        assert_eq!(scheduler.tier(&near), PollTier::Near);
        assert!(!scheduler.should_fire(&near));
        assert_eq!(scheduler.next_sleep(&near), Duration::from_secs(3));

        let scheduler = Scheduler::new(
            TierConfig::default(),
            TriggerPolicy::PreBoundary { fire_before_secs: 198 },
        );
        let approaching = snapshot(0, 200);
        assert_eq!(scheduler.tier(&approaching), PollTier::Approaching);
        assert_eq!(scheduler.next_sleep(&approaching), Duration::from_secs(2));
    }

    #[test]
    fn post_boundary_sleep_wakes_at_boundary() {
        let tiers = TierConfig {
            idle_interval_ms: 60_000,
            approaching_interval_ms: 60_000,
            near_interval_ms: 60_000,
            critical_interval_ms: 200,
            critical_bps: 10_000,
            critical_remaining_secs: 0,
            ..Default::default()
        };
        let scheduler = Scheduler::new(tiers, TriggerPolicy::PostBoundary { fire_within_secs: 10 });
        assert_eq!(scheduler.next_sleep(&snapshot(0, 40)), Duration::from_secs(40));
    }

    #[test]
    fn fires_once_per_epoch() {
        let scheduler =
            Scheduler::new(TierConfig::default(), TriggerPolicy::PreBoundary { fire_before_secs: 25 });
        let state = TriggerState::new();
        let mut fired = 0;

        for remaining in [26, 24, 24, 10] {
            let snap = snapshot(5, remaining);
            if !scheduler.should_fire(&snap) {
                continue;
            }
            if let Some(guard) = state.try_begin(snap.epoch) {
                fired += 1;
                guard.mark_acted();
            }
        }
        assert_eq!(fired, 1);
        assert_eq!(state.last_acted_epoch(), Some(5));

        // The next epoch is eligible again without any reset.
        let guard = state.try_begin(6).expect("new epoch must be eligible");
        assert_eq!(guard.epoch(), 6);
    }

    #[test]
    fn concurrent_attempt_is_excluded() {
        let state = TriggerState::new();
        let first = state.try_begin(9).expect("first attempt proceeds");
        assert!(state.is_processing());
        assert!(state.try_begin(9).is_none());
        drop(first);
        assert!(!state.is_processing());
        // Unmarked epochs remain eligible.
        assert!(state.try_begin(9).is_some());
    }

    #[test]
    fn guard_releases_on_panic() {
        let state = TriggerState::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = state.try_begin(1).unwrap();
            panic!("executor blew up");
        }));
        assert!(result.is_err());
        assert!(!state.is_processing());
        assert_eq!(state.last_acted_epoch(), None);
    }

    #[test]
    fn policy_deserializes_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            policy: TriggerPolicy,
        }
        let pre: Wrapper = toml::from_str("policy = { pre_boundary = { fire_before_secs = 12 } }")
            .unwrap();
        assert_eq!(pre.policy, TriggerPolicy::PreBoundary { fire_before_secs: 12 });
        let post: Wrapper =
            toml::from_str("[policy.post_boundary]\nfire_within_secs = 3").unwrap();
        assert_eq!(post.policy, TriggerPolicy::PostBoundary { fire_within_secs: 3 });
    }
}
