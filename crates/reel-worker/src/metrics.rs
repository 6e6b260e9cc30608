//! Worker metrics.
//!
//! Recorded through the `metrics` facade; the exporter is installed by the
//! binary hosting the worker (the API exposes `/metrics`).

use metrics::{counter, gauge, histogram};

pub fn record_job_started() {
    counter!("reel_jobs_started_total").increment(1);
    gauge!("reel_jobs_in_flight").increment(1.0);
}

pub fn record_job_ready(generation_secs: f64) {
    gauge!("reel_jobs_in_flight").decrement(1.0);
    counter!("reel_jobs_completed_total").increment(1);
    histogram!("reel_generation_duration_seconds").record(generation_secs);
}

pub fn record_job_failed(reason: &'static str) {
    gauge!("reel_jobs_in_flight").decrement(1.0);
    counter!("reel_jobs_failed_total", "reason" => reason).increment(1);
    if reason == "timeout" {
        counter!("reel_jobs_timed_out_total").increment(1);
    }
}

pub fn record_delivery(secs: f64) {
    histogram!("reel_upload_duration_seconds").record(secs);
}

pub fn record_duplicate_delivery() {
    counter!("reel_duplicate_deliveries_total").increment(1);
}
