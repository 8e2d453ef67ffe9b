//! Prometheus metrics for the generation pipeline
//!
//! Metrics live in the default registry; the bot exposes them through the
//! admin `/metrics` command via [`render`].

#![allow(clippy::expect_used)]

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Encoder, Histogram, IntCounter, IntCounterVec,
    TextEncoder,
};

/// Pipeline cycles by outcome: accepted, wrong_duration, failed, missing_artifact
pub static PIPELINE_ATTEMPTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "reel_pipeline_attempts_total",
        "Video pipeline cycles by outcome",
        &["outcome"]
    )
    .expect("metric definition is static")
});

/// Wall-clock time of one full `generate_video` cycle
pub static PIPELINE_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "reel_pipeline_duration_seconds",
        "Time spent in one video generation cycle",
        vec![60.0, 300.0, 600.0, 1200.0, 1800.0, 3600.0, 7200.0]
    )
    .expect("metric definition is static")
});

/// Retriable upload failures that triggered a backoff
pub static UPLOAD_RETRIES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("reel_upload_retries_total", "Retried YouTube upload chunks")
        .expect("metric definition is static")
});

/// Images produced by the diffusion backend, by endpoint (txt2img/img2img)
pub static IMAGES_GENERATED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "reel_images_generated_total",
        "Images decoded from diffusion responses",
        &["endpoint"]
    )
    .expect("metric definition is static")
});

/// Forces registration so `/metrics` lists every series from startup.
pub fn init_metrics() {
    Lazy::force(&PIPELINE_ATTEMPTS_TOTAL);
    Lazy::force(&PIPELINE_DURATION_SECONDS);
    Lazy::force(&UPLOAD_RETRIES_TOTAL);
    Lazy::force(&IMAGES_GENERATED_TOTAL);
}

/// Renders the default registry in the text exposition format.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        log::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
