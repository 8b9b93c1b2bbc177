//! Line-delimited JSON protocol.
//!
//! Each request is one JSON object on its own line, tagged by `"op"` and
//! carrying the caller's identity (`customer_id` or `admin_id`), which the
//! fronting service has already authenticated. Each response is one line:
//! `{"ok":true,"data":...}` or `{"ok":false,"kind":...,"error":...}`.

use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::debug;
use ulid::Ulid;

use crate::engine::{Engine, EngineError, ErrorKind};
use crate::limits::*;
use crate::model::*;
use crate::observability::{self, op_label};
use crate::slot;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    ListRestaurants,
    GetRestaurant {
        restaurant_id: Ulid,
    },
    CheckAvailability {
        restaurant_id: Ulid,
        date: String,
        time: ClockTime,
        guests: u32,
    },
    CreateReservation {
        customer_id: Ulid,
        restaurant_id: Ulid,
        date: String,
        start_time: ClockTime,
        guest_count: u32,
        #[serde(default)]
        note: Option<String>,
    },
    ModifyReservation {
        customer_id: Ulid,
        reservation_id: Ulid,
        #[serde(default)]
        date: Option<String>,
        #[serde(default)]
        start_time: Option<ClockTime>,
        #[serde(default)]
        guest_count: Option<u32>,
        #[serde(default)]
        note: Option<String>,
    },
    CancelReservation {
        customer_id: Ulid,
        reservation_id: Ulid,
    },
    GetReservation {
        customer_id: Ulid,
        reservation_id: Ulid,
    },
    ListReservations {
        customer_id: Ulid,
        #[serde(default)]
        status: Option<ReservationStatus>,
        #[serde(default)]
        page: Option<u32>,
        #[serde(default)]
        limit: Option<u32>,
    },
    ChangeStatus {
        admin_id: Ulid,
        reservation_id: Ulid,
        status: ReservationStatus,
    },
    AdminListReservations {
        admin_id: Ulid,
        #[serde(default)]
        status: Option<ReservationStatus>,
        #[serde(default)]
        date: Option<String>,
        #[serde(default)]
        page: Option<u32>,
        #[serde(default)]
        limit: Option<u32>,
    },
    AdminListCustomers {
        admin_id: Ulid,
    },
    CreateRestaurant {
        admin_id: Ulid,
        name: String,
        grid_rows: u32,
        grid_cols: u32,
    },
    GetMyRestaurant {
        admin_id: Ulid,
    },
    UpdateRestaurant {
        admin_id: Ulid,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        grid_rows: Option<u32>,
        #[serde(default)]
        grid_cols: Option<u32>,
    },
    AddTable {
        admin_id: Ulid,
        label: String,
        capacity: u32,
        grid_row: u32,
        grid_col: u32,
    },
    UpdateTable {
        admin_id: Ulid,
        table_id: Ulid,
        #[serde(default)]
        label: Option<String>,
        #[serde(default)]
        capacity: Option<u32>,
        #[serde(default)]
        active: Option<bool>,
    },
    RemoveTable {
        admin_id: Ulid,
        table_id: Ulid,
    },
    ListTables {
        admin_id: Ulid,
    },
}

fn data<T: Serialize>(value: T) -> Result<Value, EngineError> {
    serde_json::to_value(value).map_err(|e| EngineError::Internal(e.to_string()))
}

fn filter(
    status: Option<ReservationStatus>,
    date: Option<String>,
    page: Option<u32>,
    limit: Option<u32>,
) -> Result<ReservationFilter, EngineError> {
    Ok(ReservationFilter {
        status,
        date: date.as_deref().map(slot::parse_date).transpose()?,
        page: page.unwrap_or(1),
        limit: limit.unwrap_or(DEFAULT_PAGE_LIMIT),
    })
}

pub async fn execute(engine: &Engine, req: Request) -> Result<Value, EngineError> {
    match req {
        Request::ListRestaurants => data(engine.list_restaurants().await?),
        Request::GetRestaurant { restaurant_id } => data(engine.get_restaurant(restaurant_id).await?),
        Request::CheckAvailability { restaurant_id, date, time, guests } => {
            let date = slot::parse_date(&date)?;
            data(engine.check_availability(restaurant_id, date, time, guests).await?)
        }
        Request::CreateReservation {
            customer_id,
            restaurant_id,
            date,
            start_time,
            guest_count,
            note,
        } => {
            let input = NewReservation {
                restaurant_id,
                date: slot::parse_date(&date)?,
                start_time,
                guest_count,
                note,
            };
            data(engine.create_reservation(customer_id, input).await?)
        }
        Request::ModifyReservation {
            customer_id,
            reservation_id,
            date,
            start_time,
            guest_count,
            note,
        } => {
            let patch = ReservationPatch {
                date: date.as_deref().map(slot::parse_date).transpose()?,
                start_time,
                guest_count,
                note,
            };
            data(engine.modify_reservation(customer_id, reservation_id, patch).await?)
        }
        Request::CancelReservation { customer_id, reservation_id } => {
            data(engine.cancel_reservation(customer_id, reservation_id).await?)
        }
        Request::GetReservation { customer_id, reservation_id } => {
            data(engine.get_reservation(customer_id, reservation_id).await?)
        }
        Request::ListReservations { customer_id, status, page, limit } => {
            let filter = filter(status, None, page, limit)?;
            data(engine.list_my_reservations(customer_id, filter).await?)
        }
        Request::ChangeStatus { admin_id, reservation_id, status } => {
            data(engine.change_status(admin_id, reservation_id, status).await?)
        }
        Request::AdminListReservations { admin_id, status, date, page, limit } => {
            let filter = filter(status, date, page, limit)?;
            data(engine.admin_list_reservations(admin_id, filter).await?)
        }
        Request::AdminListCustomers { admin_id } => data(engine.admin_list_customers(admin_id).await?),
        Request::CreateRestaurant { admin_id, name, grid_rows, grid_cols } => {
            data(engine.create_restaurant(admin_id, &name, grid_rows, grid_cols).await?)
        }
        Request::GetMyRestaurant { admin_id } => data(engine.get_my_restaurant(admin_id).await?),
        Request::UpdateRestaurant { admin_id, name, grid_rows, grid_cols } => {
            let patch = RestaurantPatch { name, grid_rows, grid_cols };
            data(engine.update_restaurant(admin_id, patch).await?)
        }
        Request::AddTable { admin_id, label, capacity, grid_row, grid_col } => {
            let input = NewTable { label, capacity, grid_row, grid_col };
            data(engine.add_table(admin_id, input).await?)
        }
        Request::UpdateTable { admin_id, table_id, label, capacity, active } => {
            let patch = TablePatch { label, capacity, active };
            data(engine.update_table(admin_id, table_id, patch).await?)
        }
        Request::RemoveTable { admin_id, table_id } => {
            engine.remove_table(admin_id, table_id).await?;
            Ok(json!({ "removed": table_id.to_string() }))
        }
        Request::ListTables { admin_id } => data(engine.list_tables(admin_id).await?),
    }
}

fn error_response(kind: ErrorKind, message: &str) -> Value {
    json!({ "ok": false, "kind": kind.as_str(), "error": message })
}

/// Parse, run and encode one request line.
pub async fn handle_line(engine: &Engine, line: &str) -> Value {
    let req: Request = match serde_json::from_str(line) {
        Ok(req) => req,
        Err(e) => {
            metrics::counter!(observability::OPERATIONS_TOTAL, "op" => "invalid", "status" => "validation")
                .increment(1);
            return error_response(ErrorKind::Validation, &format!("malformed request: {e}"));
        }
    };

    let op = op_label(&req);
    let start = Instant::now();
    let result = execute(engine, req).await;
    metrics::histogram!(observability::OPERATION_DURATION_SECONDS, "op" => op)
        .record(start.elapsed().as_secs_f64());

    match result {
        Ok(data) => {
            metrics::counter!(observability::OPERATIONS_TOTAL, "op" => op, "status" => "ok").increment(1);
            json!({ "ok": true, "data": data })
        }
        Err(e) => {
            let kind = e.kind();
            metrics::counter!(observability::OPERATIONS_TOTAL, "op" => op, "status" => kind.as_str())
                .increment(1);
            if kind == ErrorKind::Internal {
                tracing::error!("{op} failed: {e}");
            } else {
                debug!("{op} rejected: {e}");
            }
            error_response(kind, &e.to_string())
        }
    }
}

/// Serve one client until it disconnects. Malformed or oversized lines get
/// an error response; the connection stays open.
pub async fn process_connection(socket: TcpStream, engine: Arc<Engine>) -> Result<(), LinesCodecError> {
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LEN));
    while let Some(line) = framed.next().await {
        let response = match line {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => handle_line(&engine, &line).await,
            Err(LinesCodecError::MaxLineLengthExceeded) => error_response(
                ErrorKind::Validation,
                &format!("request exceeds {MAX_LINE_LEN} bytes"),
            ),
            Err(e) => return Err(e),
        };
        framed.send(response.to_string()).await?;
    }
    Ok(())
}
