use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "campd_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "campd_query_duration_seconds";

/// Counter: reservation requests decided. Labels: outcome (accepted, rejected).
pub const ADMISSIONS_TOTAL: &str = "campd_admissions_total";

/// Counter: requests that gave up waiting for a campground lock.
pub const ADMISSION_TIMEOUTS_TOTAL: &str = "campd_admission_timeouts_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "campd_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "campd_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "campd_connections_rejected_total";

/// Histogram: time spent waiting for a campground write lock, in seconds.
pub const LOCK_WAIT_SECONDS: &str = "campd_lock_wait_seconds";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "campd_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "campd_wal_flush_batch_size";

// ── Background work ─────────────────────────────────────────────

/// Counter: reservations moved to Expired by the sweep.
pub const RESERVATIONS_EXPIRED_TOTAL: &str = "campd_reservations_expired_total";

/// Counter: sweep items skipped after an error.
pub const SWEEP_FAILURES_TOTAL: &str = "campd_sweep_failures_total";

/// Counter: purge items skipped after an error.
pub const PURGE_FAILURES_TOTAL: &str = "campd_purge_failures_total";

/// Histogram: duration of one expiry sweep in seconds.
pub const SWEEP_DURATION_SECONDS: &str = "campd_sweep_duration_seconds";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics"),
        Err(e) => tracing::error!("failed to install Prometheus exporter on {addr}: {e}"),
    }
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertCampground { .. } => "insert_campground",
        Command::UpdateCampground { .. } => "update_campground",
        Command::DeleteCampground { .. } => "delete_campground",
        Command::InsertTag { .. } => "insert_tag",
        Command::DeleteTag { .. } => "delete_tag",
        Command::AttachTag { .. } => "attach_tag",
        Command::DetachTag { .. } => "detach_tag",
        Command::InsertReservation { .. } => "insert_reservation",
        Command::SetReservationStatus { .. } => "set_reservation_status",
        Command::CancelReservation { .. } => "cancel_reservation",
        Command::SelectCampgrounds { .. } => "select_campgrounds",
        Command::SelectTags => "select_tags",
        Command::SelectReservations { .. } => "select_reservations",
        Command::SelectOccupancy { .. } => "select_occupancy",
        Command::SelectAvailability { .. } => "select_availability",
        Command::SelectSimilar { .. } => "select_similar",
    }
}
