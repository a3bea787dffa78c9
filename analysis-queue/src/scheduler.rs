//! Priority scoring, duration and wait estimates, and the queue ordering.
//!
//! Everything here is pure; the store applies the same ordering in its queries.

use std::cmp::Ordering;

use common::storage::types::{
    analysis_job::{AnalysisJob, MAX_PRIORITY, MIN_PRIORITY},
    analysis_request::{AnalysisRequest, Complexity},
};

pub const BASE_PRIORITY: i32 = 50;
const REALTIME_BOOST: i32 = 30;
const SMALL_BATCH_BOOST: i32 = 10;
const SMALL_BATCH_FILE_LIMIT: usize = 5;
const PREMIUM_BOOST: i32 = 20;
const DETAILED_PENALTY: i32 = 10;

const BASE_PROCESSING_SECS: f64 = 30.0;
const PER_FILE_PROCESSING_SECS: f64 = 5.0;

pub fn compute_priority(request: &AnalysisRequest) -> i32 {
    let mut priority = BASE_PRIORITY;

    if request.realtime {
        priority += REALTIME_BOOST;
    }
    if request.file_count() < SMALL_BATCH_FILE_LIMIT {
        priority += SMALL_BATCH_BOOST;
    }
    if request.is_premium() {
        priority += PREMIUM_BOOST;
    }
    if request.complexity() == Complexity::Detailed {
        priority -= DETAILED_PENALTY;
    }

    priority.clamp(MIN_PRIORITY, MAX_PRIORITY)
}

/// Expected execution time in whole seconds.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn estimate_processing_time(request: &AnalysisRequest) -> u64 {
    let base = BASE_PROCESSING_SECS + PER_FILE_PROCESSING_SECS * request.file_count() as f64;
    (base * request.complexity().duration_factor()).round().max(0.0) as u64
}

/// Seconds until a job behind `queue_depth` others is likely to start.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn estimate_wait_time(queue_depth: u64, avg_processing_secs: f64, max_concurrency: usize) -> u64 {
    let lanes = max_concurrency.max(1) as f64;
    let wait = (queue_depth as f64 / lanes) * avg_processing_secs;
    wait.round().max(0.0) as u64
}

/// Dispatch order: higher priority first, then strictly FIFO by `created_at`.
pub fn rank(a: &AnalysisJob, b: &AnalysisJob) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.created_at.cmp(&b.created_at))
}
