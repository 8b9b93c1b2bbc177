//! Business and resource limits enforced by the engine and the command surface.

/// Fixed length of every reservation.
pub const SLOT_MINUTES: u16 = 120;

/// First bookable start time (09:00), in minutes since midnight.
pub const FIRST_BOOKING_MINUTE: u16 = 9 * 60;

/// Last bookable start time (22:00), in minutes since midnight.
pub const LAST_BOOKING_MINUTE: u16 = 22 * 60;

pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// How many days ahead of today a reservation may be placed.
pub const BOOKING_HORIZON_DAYS: i64 = 30;

pub const MIN_GUESTS: u32 = 1;
pub const MAX_GUESTS: u32 = 12;

pub const MAX_NOTE_LEN: usize = 500;

pub const MAX_LABEL_LEN: usize = 50;
pub const MAX_NAME_LEN: usize = 200;

pub const VALID_CAPACITIES: [u32; 3] = [2, 4, 6];

pub const MAX_TABLES_PER_RESTAURANT: usize = 500;

/// Upper bound for either grid dimension of a floor plan.
pub const MAX_GRID_DIM: u32 = 100;

pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 50;

/// Longest accepted request line on the command surface.
pub const MAX_LINE_LEN: usize = 64 * 1024;
