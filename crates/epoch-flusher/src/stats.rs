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

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Mutex,
};

use alloy::primitives::U256;

/// Monotonic counters for the lifetime of the process.
#[derive(Debug, Default)]
pub struct Stats {
    success: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    claimed: Mutex<U256>,
    gas_spent: Mutex<U256>,
}

/// Point-in-time copy of [Stats].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub success: u64,
    pub failed: u64,
    pub skipped: u64,
    pub claimed: U256,
    pub gas_spent: U256,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, gas_cost: U256) {
        self.success.fetch_add(1, Ordering::Relaxed);
        add(&self.gas_spent, gas_cost);
    }

    /// A failed attempt. Mined reverts still paid for gas.
    pub fn record_failure(&self, gas_cost: U256) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        add(&self.gas_spent, gas_cost);
    }

    pub fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_claim(&self, amount: U256, gas_cost: U256) {
        add(&self.claimed, amount);
        add(&self.gas_spent, gas_cost);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            success: self.success.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            claimed: read(&self.claimed),
            gas_spent: read(&self.gas_spent),
        }
    }
}

fn add(total: &Mutex<U256>, amount: U256) {
    let mut guard = total.lock().unwrap_or_else(|err| err.into_inner());
    *guard = guard.saturating_add(amount);
}

fn read(total: &Mutex<U256>) -> U256 {
    *total.lock().unwrap_or_else(|err| err.into_inner())
}
