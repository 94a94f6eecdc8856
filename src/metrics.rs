// Prometheus metrics definitions for the zone engine.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Gauges ───────────────────────────────────────────────────────

    /// Zone instances currently running.
    pub static ref ACTIVE_ZONES: IntGauge =
        IntGauge::new("zone_active_instances", "Zone instances currently running").unwrap();

    /// Entities alive across all zones.
    pub static ref ENTITIES: IntGauge =
        IntGauge::new("zone_entities", "Entities alive across all zones").unwrap();

    // ── Counters ─────────────────────────────────────────────────────

    /// Total creatures spawned, by template id.
    pub static ref CREATURES_SPAWNED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("zone_creatures_spawned_total", "Total creatures spawned"),
        &["template"],
    )
    .unwrap();

    /// Total creatures killed, by template id.
    pub static ref CREATURES_KILLED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("zone_creatures_killed_total", "Total creatures killed"),
        &["template"],
    )
    .unwrap();

    /// Total spell casts, by outcome (ok / error).
    pub static ref SPELL_CASTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("zone_spell_casts_total", "Total spell cast attempts"),
        &["outcome"],
    )
    .unwrap();

    /// Broadcast events discarded for lack of subscribers.
    pub static ref EVENTS_DROPPED_TOTAL: IntCounter = IntCounter::new(
        "zone_events_dropped_total",
        "Broadcast events discarded for lack of subscribers",
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// Per-tick processing time in milliseconds.
    pub static ref ZONE_TICK_DURATION_MS: Histogram = Histogram::with_opts(
        HistogramOpts::new("zone_tick_duration_ms", "Per-tick processing time in ms")
            .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0]),
    )
    .unwrap();
}

/// Register all metrics with the custom registry. Call once at startup.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(ACTIVE_ZONES.clone()),
        Box::new(ENTITIES.clone()),
        Box::new(CREATURES_SPAWNED_TOTAL.clone()),
        Box::new(CREATURES_KILLED_TOTAL.clone()),
        Box::new(SPELL_CASTS_TOTAL.clone()),
        Box::new(EVENTS_DROPPED_TOTAL.clone()),
        Box::new(ZONE_TICK_DURATION_MS.clone()),
    ];

    for c in collectors {
        REGISTRY.register(c).expect("failed to register metric");
    }
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
