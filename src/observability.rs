use std::net::SocketAddr;

use crate::sql::{Command, ConflictQuery};

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "timetable_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "timetable_query_duration_seconds";

// ── Conflict engine ─────────────────────────────────────────────

/// Counter: proposals run through the detector.
pub const CONFLICT_CHECKS_TOTAL: &str = "timetable_conflict_checks_total";

/// Counter: conflicts reported. Labels: kind.
pub const CONFLICTS_FOUND_TOTAL: &str = "timetable_conflicts_found_total";

/// Counter: candidates evaluated by the alternative searches. Labels: search.
pub const SEARCH_CANDIDATES_TOTAL: &str = "timetable_search_candidates_total";

/// Counter: auto-resolve runs. Labels: outcome.
pub const AUTO_RESOLVE_TOTAL: &str = "timetable_auto_resolve_total";

// ── USE metrics (resource utilization) ──────────────────────────

pub const CONNECTIONS_ACTIVE: &str = "timetable_connections_active";

pub const CONNECTIONS_TOTAL: &str = "timetable_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "timetable_connections_rejected_total";

/// Gauge: open semesters (loaded engines).
pub const SEMESTERS_ACTIVE: &str = "timetable_semesters_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "timetable_wal_flush_duration_seconds";

/// Histogram: events per WAL flush.
pub const WAL_FLUSH_BATCH_SIZE: &str = "timetable_wal_flush_batch_size";

/// Install the Prometheus exporter when a port is configured.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short metrics label for a command.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertRoom { .. } => "insert_room",
        Command::InsertName { .. } => "insert_name",
        Command::InsertSchedule { .. } => "insert_schedule",
        Command::UpdateSchedule { .. } => "update_schedule",
        Command::DeleteSchedule { .. } => "delete_schedule",
        Command::DeleteRoom { .. } => "delete_room",
        Command::SelectSchedules { .. } => "select_schedules",
        Command::SelectRooms => "select_rooms",
        Command::SelectConflictQuery { query, .. } => match query {
            ConflictQuery::Conflicts => "select_conflicts",
            ConflictQuery::AlternativeTimes => "select_alternative_times",
            ConflictQuery::AlternativeRooms => "select_alternative_rooms",
            ConflictQuery::AutoResolve => "select_auto_resolve",
        },
    }
}
