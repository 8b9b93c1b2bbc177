use chrono::NaiveDate;
use serde::Serialize;
use ulid::Ulid;

use crate::limits::*;
use crate::model::{ClockTime, ReservationStatus};
use crate::slot::TimeError;
use crate::store::StoreError;

/// Coarse classification used by callers to map errors to client messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    ForbiddenTransition,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::ForbiddenTransition => "forbidden_transition",
            ErrorKind::Internal => "internal",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Time(#[from] TimeError),
    #[error("guest count must be between {min} and {max}, got {0}", min = MIN_GUESTS, max = MAX_GUESTS)]
    GuestCount(u32),
    #[error("note exceeds {max} characters", max = MAX_NOTE_LEN)]
    NoteTooLong,
    #[error("table label must be 1 to {max} characters", max = MAX_LABEL_LEN)]
    InvalidLabel,
    #[error("capacity must be 2, 4, or 6, got {0}")]
    InvalidCapacity(u32),
    #[error("grid position ({row}, {col}) is outside the {rows}x{cols} floor plan")]
    GridOutOfBounds { row: u32, col: u32, rows: u32, cols: u32 },
    #[error("restaurant name must be 1 to {max} characters", max = MAX_NAME_LEN)]
    InvalidName,
    #[error("grid dimensions must be between 1 and {max}, got {rows}x{cols}", max = MAX_GRID_DIM)]
    InvalidGrid { rows: u32, cols: u32 },
    #[error("a restaurant holds at most {max} tables", max = MAX_TABLES_PER_RESTAURANT)]
    TooManyTables,
    #[error("page must be >= 1 and limit between 1 and {max}", max = MAX_PAGE_LIMIT)]
    InvalidPage,

    #[error("restaurant not found")]
    RestaurantNotFound,
    #[error("table not found: {0}")]
    TableNotFound(Ulid),
    #[error("reservation not found: {0}")]
    ReservationNotFound(Ulid),

    #[error("no tables available for {guests} guest(s) on {date} at {start}")]
    NoAvailability { guests: u32, date: NaiveDate, start: ClockTime },
    #[error("table {table_id} is already taken for an overlapping reservation")]
    AssignmentConflict { table_id: Ulid },
    #[error("a table with label {0:?} already exists")]
    DuplicateLabel(String),
    #[error("grid cell ({0}, {1}) is already occupied")]
    GridCellOccupied(u32, u32),
    #[error("admin already owns a restaurant")]
    RestaurantExists,
    #[error("table {0} is assigned to active reservations; cancel or complete them first")]
    TableInUse(Ulid),
    #[error("table {0} seats guests of an active reservation; resize it after they are moved")]
    CapacityInUse(Ulid),
    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("cannot change a {status} reservation", status = .0.as_str().to_lowercase())]
    Terminal(ReservationStatus),
    #[error("cannot transition from {from} to {to}")]
    InvalidTransition { from: ReservationStatus, to: ReservationStatus },
    #[error("only PENDING reservations can be modified (status is {0})")]
    NotModifiable(ReservationStatus),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Time(_)
            | EngineError::GuestCount(_)
            | EngineError::NoteTooLong
            | EngineError::InvalidLabel
            | EngineError::InvalidCapacity(_)
            | EngineError::GridOutOfBounds { .. }
            | EngineError::InvalidName
            | EngineError::InvalidGrid { .. }
            | EngineError::TooManyTables
            | EngineError::InvalidPage => ErrorKind::Validation,
            EngineError::RestaurantNotFound
            | EngineError::TableNotFound(_)
            | EngineError::ReservationNotFound(_) => ErrorKind::NotFound,
            EngineError::NoAvailability { .. }
            | EngineError::AssignmentConflict { .. }
            | EngineError::DuplicateLabel(_)
            | EngineError::GridCellOccupied(..)
            | EngineError::RestaurantExists
            | EngineError::TableInUse(_)
            | EngineError::CapacityInUse(_)
            | EngineError::Constraint(_) => ErrorKind::Conflict,
            EngineError::Terminal(_)
            | EngineError::InvalidTransition { .. }
            | EngineError::NotModifiable(_) => ErrorKind::ForbiddenTransition,
            EngineError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NoSuchRestaurant(_) => EngineError::RestaurantNotFound,
            StoreError::Exclusion { table_id, .. } => EngineError::AssignmentConflict { table_id },
            StoreError::Unique(what) => EngineError::Constraint(what),
            StoreError::Missing(_) | StoreError::Wal(_) => {
                tracing::error!("storage failure: {e}");
                EngineError::Internal(e.to_string())
            }
        }
    }
}
