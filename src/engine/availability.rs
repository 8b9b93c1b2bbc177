use chrono::NaiveDate;
use tracing::debug;
use ulid::Ulid;

use crate::model::*;
use crate::slot;
use crate::store::StoreRead;

use super::selector::{free_tables, select_tables, Selection};
use super::{validate_guest_count, Engine, EngineError};

/// Conflict set for the window, then best-fit over what is left.
///
/// `exclude` drops one reservation's own assignments from the conflict set,
/// so a reservation being modified can keep its current tables.
pub(super) async fn assign_tables<V: StoreRead + ?Sized>(
    view: &V,
    date: NaiveDate,
    window: TimeWindow,
    guests: u32,
    exclude: Option<Ulid>,
) -> Result<Option<Selection>, EngineError> {
    let booked = view.booked_table_ids(date, window, exclude).await?;
    let free = free_tables(view.active_tables().await?, &booked);
    let selection = select_tables(&free, guests);
    debug!(
        %date,
        window = %window,
        guests,
        booked = booked.len(),
        free = free.len(),
        chosen = ?selection.as_ref().map(Selection::table_ids),
        "table selection"
    );
    Ok(selection)
}

impl Engine {
    /// Dry run of the assignment for a prospective booking. Nothing is held.
    pub async fn check_availability(
        &self,
        restaurant_id: Ulid,
        date: NaiveDate,
        start_time: ClockTime,
        guests: u32,
    ) -> Result<Availability, EngineError> {
        validate_guest_count(guests)?;
        let window = slot::booking_window(start_time)?;
        let date = slot::validate_booking_date(date, slot::today())?;

        let view = self.store.snapshot(restaurant_id).await?;
        let selection = assign_tables(&*view, date, window, guests, None).await?;
        Ok(match selection {
            Some(sel) => Availability {
                available: true,
                tables_needed: sel.table_count(),
                assigned_capacity: sel.capacity(),
            },
            None => Availability {
                available: false,
                tables_needed: 0,
                assigned_capacity: 0,
            },
        })
    }
}
