use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::{Mutex, OnceLock};

// Global registry
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

// Metrics
pub static CODES_ISSUED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static PERMISSION_CHECKS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static TOKEN_ISSUANCE_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static NOTIFICATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

static INIT_LOCK: Mutex<()> = Mutex::new(());

fn counter(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<IntCounterVec, prometheus::Error> {
    let metric = IntCounterVec::new(Opts::new(name, help), labels).map_err(|e| {
        tracing::error!("Failed to create {} metric: {}", name, e);
        e
    })?;
    registry.register(Box::new(metric.clone())).map_err(|e| {
        tracing::error!("Failed to register {} collector: {}", name, e);
        e
    })?;
    Ok(metric)
}

/// Install the registry and counters. Later calls are no-ops.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let _guard = INIT_LOCK
        .lock()
        .map_err(|_| prometheus::Error::Msg("metrics init lock poisoned".to_string()))?;
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let codes = counter(
        &registry,
        "verification_codes_issued_total",
        "Verification codes issued, by code policy",
        &["policy"],
    )?;
    let checks = counter(
        &registry,
        "permission_checks_total",
        "Permission checks, by decision",
        &["decision"],
    )?;
    let tokens = counter(
        &registry,
        "token_issuance_total",
        "Token issuance attempts, by outcome",
        &["outcome"],
    )?;
    let notifications = counter(
        &registry,
        "notifications_total",
        "Notification deliveries, by channel and outcome",
        &["channel", "outcome"],
    )?;

    // Initialize globals
    let _ = REGISTRY.set(registry);
    let _ = CODES_ISSUED_TOTAL.set(codes);
    let _ = PERMISSION_CHECKS_TOTAL.set(checks);
    let _ = TOKEN_ISSUANCE_TOTAL.set(tokens);
    let _ = NOTIFICATIONS_TOTAL.set(notifications);
    Ok(())
}

fn inc(metric: &OnceLock<IntCounterVec>, labels: &[&str]) {
    if let Some(counter) = metric.get() {
        counter.with_label_values(labels).inc();
    }
}

pub fn record_code_issued(policy: &str) {
    inc(&CODES_ISSUED_TOTAL, &[policy]);
}

pub fn record_permission_decision(decision: &str) {
    inc(&PERMISSION_CHECKS_TOTAL, &[decision]);
}

pub fn record_token_issuance(outcome: &str) {
    inc(&TOKEN_ISSUANCE_TOTAL, &[outcome]);
}

pub fn record_notification(channel: &str, outcome: &str) {
    inc(&NOTIFICATIONS_TOTAL, &[channel, outcome]);
}

/// Text exposition of every registered metric.
pub fn gather_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();

    let registry = match REGISTRY.get() {
        Some(r) => r,
        None => {
            tracing::error!("Metrics registry not initialized");
            return "# Metrics registry not initialized\n".to_string();
        }
    };

    let metric_families = registry.gather();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return format!("# Failed to encode metrics: {}\n", e);
    }

    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to convert metrics to UTF-8: {}", e);
            format!("# Failed to convert metrics to UTF-8: {}\n", e)
        }
    }
}
