use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::slot::{self, TimeError};

/// Time of day with minute precision, always before midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime(u16);

impl ClockTime {
    pub fn from_minutes(minutes: u16) -> Option<Self> {
        (minutes < crate::limits::MINUTES_PER_DAY).then_some(Self(minutes))
    }

    /// Minutes since midnight.
    pub fn minutes(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl FromStr for ClockTime {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        slot::parse_time_of_day(s)
    }
}

impl TryFrom<String> for ClockTime {
    type Error = TimeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        slot::parse_time_of_day(&s)
    }
}

impl From<ClockTime> for String {
    fn from(t: ClockTime) -> Self {
        t.to_string()
    }
}

/// Half-open window `[start, end)` within one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: ClockTime,
    pub end: ClockTime,
}

impl TimeWindow {
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        slot::windows_overlap(self.start, self.end, other.start, other.end)
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl ReservationStatus {
    /// Active reservations hold their tables.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Cancelled => "CANCELLED",
            Self::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restaurant {
    pub id: Ulid,
    pub admin_id: Ulid,
    pub name: String,
    pub grid_rows: u32,
    pub grid_cols: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub id: Ulid,
    pub restaurant_id: Ulid,
    pub label: String,
    pub capacity: u32,
    pub grid_row: u32,
    pub grid_col: u32,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub customer_id: Ulid,
    pub restaurant_id: Ulid,
    pub date: NaiveDate,
    pub start_time: ClockTime,
    /// Always `start_time` plus one slot.
    pub end_time: ClockTime,
    pub guest_count: u32,
    pub status: ReservationStatus,
    pub note: Option<String>,
}

impl Reservation {
    pub fn window(&self) -> TimeWindow {
        TimeWindow {
            start: self.start_time,
            end: self.end_time,
        }
    }
}

/// The event types — one per storage mutation. Grouped into WAL commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RestaurantCreated(Restaurant),
    /// Name or floor plan dimensions changed.
    RestaurantUpdated(Restaurant),
    TableAdded(Table),
    TableUpdated(Table),
    TableRemoved {
        id: Ulid,
        restaurant_id: Ulid,
    },
    ReservationCreated {
        reservation: Reservation,
        table_ids: Vec<Ulid>,
    },
    /// Core fields overwritten and the assignment set replaced wholesale.
    ReservationReplaced {
        reservation: Reservation,
        table_ids: Vec<Ulid>,
    },
    StatusChanged {
        id: Ulid,
        restaurant_id: Ulid,
        status: ReservationStatus,
    },
}

impl Event {
    pub fn restaurant_id(&self) -> Ulid {
        match self {
            Event::RestaurantCreated(r) | Event::RestaurantUpdated(r) => r.id,
            Event::TableAdded(t) | Event::TableUpdated(t) => t.restaurant_id,
            Event::TableRemoved { restaurant_id, .. }
            | Event::StatusChanged { restaurant_id, .. } => *restaurant_id,
            Event::ReservationCreated { reservation, .. }
            | Event::ReservationReplaced { reservation, .. } => reservation.restaurant_id,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

/// A reservation together with the tables currently assigned to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignedReservation {
    #[serde(flatten)]
    pub reservation: Reservation,
    pub tables: Vec<Table>,
}

impl AssignedReservation {
    pub fn seated_capacity(&self) -> u32 {
        self.tables.iter().map(|t| t.capacity).sum()
    }
}

/// Restaurant as listed to customers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestaurantSummary {
    #[serde(flatten)]
    pub restaurant: Restaurant,
    pub active_tables: usize,
}

/// Restaurant with its tables. Customers see active tables ordered by
/// label; the owning admin sees every table in grid order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestaurantDetail {
    #[serde(flatten)]
    pub restaurant: Restaurant,
    pub tables: Vec<Table>,
}

/// A customer who has booked at the admin's restaurant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerSummary {
    pub customer_id: Ulid,
    pub reservations: usize,
    /// PENDING or CONFIRMED ones among them.
    pub active: usize,
    pub last_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Availability {
    pub available: bool,
    /// 0 when unavailable, otherwise 1 or 2.
    pub tables_needed: u8,
    pub assigned_capacity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: usize,
    pub page: u32,
    pub limit: u32,
    pub pages: u32,
}

// ── Command inputs ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub restaurant_id: Ulid,
    pub date: NaiveDate,
    pub start_time: ClockTime,
    pub guest_count: u32,
    pub note: Option<String>,
}

/// Fields left as `None` keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationPatch {
    pub date: Option<NaiveDate>,
    pub start_time: Option<ClockTime>,
    pub guest_count: Option<u32>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestaurantPatch {
    pub name: Option<String>,
    pub grid_rows: Option<u32>,
    pub grid_cols: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTable {
    pub label: String,
    pub capacity: u32,
    pub grid_row: u32,
    pub grid_col: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TablePatch {
    pub label: Option<String>,
    pub capacity: Option<u32>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationFilter {
    pub status: Option<ReservationStatus>,
    /// Ignored for customer listings.
    pub date: Option<NaiveDate>,
    pub page: u32,
    pub limit: u32,
}

impl Default for ReservationFilter {
    fn default() -> Self {
        Self {
            status: None,
            date: None,
            page: 1,
            limit: crate::limits::DEFAULT_PAGE_LIMIT,
        }
    }
}
