use std::net::SocketAddr;

use crate::wire::Request;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total operations handled. Labels: op, status.
pub const OPERATIONS_TOTAL: &str = "seatbook_operations_total";

/// Histogram: operation latency in seconds. Labels: op.
pub const OPERATION_DURATION_SECONDS: &str = "seatbook_operation_duration_seconds";

// ── Domain metrics ──────────────────────────────────────────────

/// Counter: reservations persisted.
pub const RESERVATIONS_CREATED_TOTAL: &str = "seatbook_reservations_created_total";

/// Counter: create/modify requests that found no free table combination.
pub const ASSIGNMENT_CONFLICTS_TOTAL: &str = "seatbook_assignment_conflicts_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "seatbook_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "seatbook_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "seatbook_connections_rejected_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "seatbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (commits per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "seatbook_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics"),
        Err(e) => tracing::error!("failed to install Prometheus metrics exporter: {e}"),
    }
}

/// Map a request to a short label for metrics.
pub fn op_label(req: &Request) -> &'static str {
    match req {
        Request::ListRestaurants => "list_restaurants",
        Request::GetRestaurant { .. } => "get_restaurant",
        Request::CheckAvailability { .. } => "check_availability",
        Request::CreateReservation { .. } => "create_reservation",
        Request::ModifyReservation { .. } => "modify_reservation",
        Request::CancelReservation { .. } => "cancel_reservation",
        Request::GetReservation { .. } => "get_reservation",
        Request::ListReservations { .. } => "list_reservations",
        Request::ChangeStatus { .. } => "change_status",
        Request::AdminListReservations { .. } => "admin_list_reservations",
        Request::AdminListCustomers { .. } => "admin_list_customers",
        Request::CreateRestaurant { .. } => "create_restaurant",
        Request::GetMyRestaurant { .. } => "get_my_restaurant",
        Request::UpdateRestaurant { .. } => "update_restaurant",
        Request::AddTable { .. } => "add_table",
        Request::UpdateTable { .. } => "update_table",
        Request::RemoveTable { .. } => "remove_table",
        Request::ListTables { .. } => "list_tables",
    }
}
