mod availability;
mod error;
mod floor;
mod mutations;
mod queries;
pub mod selector;
pub mod status;

pub use error::{EngineError, ErrorKind};
pub use selector::{select_tables, Selection};

use std::sync::Arc;

use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::store::{Store, StoreRead, Transaction};

/// Reservation engine. Stateless on its own; every decision is made against
/// the store, under the lock of the restaurant involved.
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn Store>,
}

impl Engine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Restaurant owned by an admin, or `RestaurantNotFound`.
    pub(super) async fn admin_restaurant(&self, admin_id: Ulid) -> Result<Restaurant, EngineError> {
        self.store
            .restaurant_by_admin(admin_id)
            .await?
            .ok_or(EngineError::RestaurantNotFound)
    }

    /// Resolve a reservation to its restaurant and open a transaction there.
    pub(super) async fn begin_for_reservation(
        &self,
        reservation_id: Ulid,
    ) -> Result<Box<dyn Transaction>, EngineError> {
        let restaurant_id = self
            .store
            .restaurant_of_reservation(reservation_id)
            .await?
            .ok_or(EngineError::ReservationNotFound(reservation_id))?;
        Ok(self.store.begin(restaurant_id).await?)
    }
}

/// Load a reservation with its tables.
pub(super) async fn with_tables<V: StoreRead + ?Sized>(
    view: &V,
    reservation: Reservation,
) -> Result<AssignedReservation, EngineError> {
    let tables = view.assigned_tables(reservation.id).await?;
    Ok(AssignedReservation { reservation, tables })
}

pub(super) fn validate_guest_count(guests: u32) -> Result<(), EngineError> {
    if !(MIN_GUESTS..=MAX_GUESTS).contains(&guests) {
        return Err(EngineError::GuestCount(guests));
    }
    Ok(())
}

pub(super) fn validate_note(note: Option<&str>) -> Result<(), EngineError> {
    if note.is_some_and(|n| n.chars().count() > MAX_NOTE_LEN) {
        return Err(EngineError::NoteTooLong);
    }
    Ok(())
}
