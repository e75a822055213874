//! Thread-safe workflow metrics
//!
//! A [`WorkflowMetrics`] instance is created at startup and shared (`Arc`) between the
//! workflow service and the front door. Counters are atomics; run durations and the
//! per-stage call table sit behind mutexes.

use crate::protocol::AgentType;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Recent run durations kept for percentile calculation
const MAX_DURATION_SAMPLES: usize = 1000;

/// Collector for workflow run statistics
#[derive(Debug)]
pub struct WorkflowMetrics {
    runs_started: AtomicU64,
    runs_in_flight: AtomicU64,
    runs_completed: AtomicU64,
    runs_failed: AtomicU64,
    function_agents_skipped: AtomicU64,
    started_at: u64,
    run_durations: Mutex<Vec<u64>>,
    stage_calls: Mutex<BTreeMap<AgentType, StageCalls>>,
}

#[derive(Debug, Default, Clone, Copy)]
struct StageCalls {
    succeeded: u64,
    failed: u64,
}

impl WorkflowMetrics {
    pub fn new() -> Self {
        Self {
            runs_started: AtomicU64::new(0),
            runs_in_flight: AtomicU64::new(0),
            runs_completed: AtomicU64::new(0),
            runs_failed: AtomicU64::new(0),
            function_agents_skipped: AtomicU64::new(0),
            started_at: current_timestamp(),
            run_durations: Mutex::new(Vec::new()),
            stage_calls: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn run_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
        self.runs_in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn run_completed(&self, duration: Duration) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
        self.runs_in_flight.fetch_sub(1, Ordering::Relaxed);
        self.record_duration(duration);
    }

    pub fn run_failed(&self, duration: Duration) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
        self.runs_in_flight.fetch_sub(1, Ordering::Relaxed);
        self.record_duration(duration);
    }

    /// Record the outcome of one agent call (after retries)
    pub fn agent_called(&self, stage: AgentType, success: bool) {
        let mut calls = self
            .stage_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let entry = calls.entry(stage).or_default();
        if success {
            entry.succeeded += 1;
        } else {
            entry.failed += 1;
        }
    }

    /// A target named by MISSION that is not a registered FUNCTION agent
    pub fn function_agent_skipped(&self) {
        self.function_agents_skipped.fetch_add(1, Ordering::Relaxed);
    }

    fn record_duration(&self, duration: Duration) {
        let mut durations = self
            .run_durations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        durations.push(duration.as_millis() as u64);
        if durations.len() > MAX_DURATION_SAMPLES {
            durations.remove(0);
        }
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut durations = self
            .run_durations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        durations.sort_unstable();

        let avg_run_time_ms = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<u64>() as f64 / durations.len() as f64
        };

        let stages = self
            .stage_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(stage, calls)| {
                (
                    stage.as_str().to_string(),
                    StageCallSnapshot {
                        succeeded: calls.succeeded,
                        failed: calls.failed,
                    },
                )
            })
            .collect();

        let now = current_timestamp();
        MetricsSnapshot {
            runs: RunMetrics {
                started: self.runs_started.load(Ordering::Relaxed),
                in_flight: self.runs_in_flight.load(Ordering::Relaxed),
                completed: self.runs_completed.load(Ordering::Relaxed),
                failed: self.runs_failed.load(Ordering::Relaxed),
                avg_run_time_ms,
                run_time_p50_ms: percentile(&durations, 50.0),
                run_time_p95_ms: percentile(&durations, 95.0),
            },
            stages,
            function_agents_skipped: self.function_agents_skipped.load(Ordering::Relaxed),
            uptime_seconds: now.saturating_sub(self.started_at),
            timestamp: now,
        }
    }
}

impl Default for WorkflowMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    pub runs: RunMetrics,
    /// Keyed by stage name (SESSION, MISSION, FUNCTION, CHECKER)
    pub stages: BTreeMap<String, StageCallSnapshot>,
    pub function_agents_skipped: u64,
    pub uptime_seconds: u64,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunMetrics {
    pub started: u64,
    pub in_flight: u64,
    pub completed: u64,
    pub failed: u64,
    pub avg_run_time_ms: f64,
    pub run_time_p50_ms: f64,
    pub run_time_p95_ms: f64,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct StageCallSnapshot {
    pub succeeded: u64,
    pub failed: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn percentile(sorted_data: &[u64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let index = (percentile / 100.0) * (sorted_data.len() - 1) as f64;
    let lower = sorted_data[index.floor() as usize] as f64;
    let upper = sorted_data[index.ceil() as usize] as f64;
    lower + (upper - lower) * index.fract()
}
