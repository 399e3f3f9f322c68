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

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use anyhow::{Error as AnyhowErr, Result as AnyhowRes};
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum SupervisorErr {
    /// Restart / replace the task after failure
    #[error("Recoverable error: {0}")]
    Recover(AnyhowErr),
    /// Hard failure and exit the task set
    #[error("Hard failure: {0}")]
    Fault(AnyhowErr),
}

pub type RetryRes = Pin<Box<dyn Future<Output = Result<(), SupervisorErr>> + Send + 'static>>;

pub trait RetryTask {
    /// Spawns one run of the task. The run must return once `cancel` fires.
    fn spawn(&self, cancel: CancellationToken) -> RetryRes;
}

/// Restart delays for a supervised task
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
    /// Consecutive failures before giving up, `None` for unlimited
    pub max_retries: Option<usize>,
    /// A run lasting at least this long resets the retry counter
    pub reset_after: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(500),
            backoff_multiplier: 1.5,
            max_delay: Duration::from_secs(60),
            max_retries: None,
            reset_after: Some(Duration::from_secs(60 * 5)),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, retry_count: usize) -> Duration {
        if retry_count == 0 {
            return self.delay;
        }
        let backoff =
            self.delay.as_millis() as f64 * self.backoff_multiplier.powi(retry_count as i32);
        Duration::from_millis(backoff.min(self.max_delay.as_millis() as f64) as u64)
    }
}

/// Restarts a task after recoverable failures until it exits cleanly, faults
/// or is cancelled.
pub struct Supervisor<T: RetryTask> {
    task: Arc<T>,
    retry_policy: RetryPolicy,
    cancel: CancellationToken,
}

impl<T> Supervisor<T>
where
    T: RetryTask + Send + Sync + 'static,
{
    pub fn new(task: Arc<T>, cancel: CancellationToken) -> Self {
        Self { task, retry_policy: RetryPolicy::default(), cancel }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub async fn spawn(self) -> AnyhowRes<()> {
        let mut tasks = JoinSet::new();
        let mut retry_count = 0;
        let mut last_spawn_time = tokio::time::Instant::now();

        tracing::debug!("Spawning task");
        tasks.spawn(self.task.spawn(self.cancel.child_token()));

        while let Some(res) = tasks.join_next().await {
            match res {
                Ok(Ok(())) => {
                    tracing::debug!("Task exited cleanly");
                }
                Ok(Err(SupervisorErr::Recover(err))) => {
                    if self.cancel.is_cancelled() {
                        tracing::debug!("Task failed during shutdown: {err:?}");
                        break;
                    }
                    if let Some(reset_duration) = self.retry_policy.reset_after {
                        if last_spawn_time.elapsed() >= reset_duration && retry_count > 0 {
                            tracing::info!(
                                "Task ran for at least {reset_duration:?}, resetting retry counter from {retry_count}"
                            );
                            retry_count = 0;
                        }
                    }
                    if let Some(max) = self.retry_policy.max_retries {
                        if retry_count >= max {
                            tracing::error!("Exceeded maximum retries ({max}) for task");
                            anyhow::bail!("Exceeded maximum retries for task");
                        }
                    }

                    let delay = self.retry_policy.delay_for(retry_count);
                    tracing::warn!(
                        "Recoverable failure detected: {err:?}, restarting in {delay:?} (retry {})",
                        retry_count + 1
                    );

                    let run = self.task.spawn(self.cancel.child_token());
                    let cancel = self.cancel.clone();
                    tasks.spawn(async move {
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => run.await,
                            _ = cancel.cancelled() => Ok(()),
                        }
                    });

                    retry_count += 1;
                    last_spawn_time = tokio::time::Instant::now() + delay;
                }
                Ok(Err(SupervisorErr::Fault(err))) => {
                    tracing::error!("FAULT: Hard failure detected: {err:?}");
                    anyhow::bail!("Hard failure in supervisor task");
                }
                Err(err) if err.is_cancelled() => {
                    tracing::warn!("Task was canceled, treating it like a clean exit");
                }
                Err(err) => {
                    tracing::error!("ABORT: supervisor join failed");
                    anyhow::bail!(err);
                }
            }
        }

        Ok(())
    }
}
