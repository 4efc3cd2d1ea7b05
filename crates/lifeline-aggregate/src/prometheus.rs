//! Prometheus text exposition format.
//!
//! Renders the latest daily snapshot as gauges for scraping.

use lifeline_state::DailyMetric;

/// Render the latest daily metric into Prometheus text format.
///
/// With no snapshot yet, only the HELP/TYPE declarations are emitted.
pub fn render_prometheus(latest: Option<&DailyMetric>) -> String {
    let gauges: [(&str, &str, fn(&DailyMetric) -> u64); 5] = [
        (
            "lifeline_instances",
            "Instances created in the last daily window.",
            |m| m.instances_nb,
        ),
        (
            "lifeline_active_instances",
            "Instances with at least one utterance in the active window.",
            |m| m.active_instances_nb,
        ),
        (
            "lifeline_utterances",
            "Utterances recorded in the last daily window.",
            |m| m.utterances_nb,
        ),
        (
            "lifeline_setups",
            "SETUP events recorded in the last daily window.",
            |m| m.setups_nb,
        ),
        (
            "lifeline_online_instances",
            "Instances that sent a heartbeat in the last daily window.",
            |m| m.online_instances_nb,
        ),
    ];

    let mut out = String::new();
    for (name, help, value) in gauges {
        out.push_str(&format!("# HELP {name} {help}\n"));
        out.push_str(&format!("# TYPE {name} gauge\n"));
        if let Some(m) = latest {
            out.push_str(&format!("{name} {}\n", value(m)));
        }
    }

    if let Some(m) = latest {
        out.push_str("# HELP lifeline_snapshot_timestamp_ms Time the snapshot was computed.\n");
        out.push_str("# TYPE lifeline_snapshot_timestamp_ms gauge\n");
        out.push_str(&format!("lifeline_snapshot_timestamp_ms {}\n", m.created_at));
    }

    out
}
