//! Storage collaborator of the engine.
//!
//! The engine only talks to these traits. Reads that feed an assignment
//! decision happen inside a [`Transaction`], which holds the restaurant's
//! exclusive lock until it is committed or dropped; dropping an uncommitted
//! transaction discards everything it staged.

mod state;
mod wal_store;

pub use state::RestaurantState;
pub use wal_store::WalStore;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("restaurant not found: {0}")]
    NoSuchRestaurant(Ulid),
    #[error("referenced row not found: {0}")]
    Missing(Ulid),
    /// Storage-level exclusion constraint: a table may hold at most one
    /// active reservation per overlapping window.
    #[error("table {table_id} already assigned to overlapping reservation {reservation_id}")]
    Exclusion { table_id: Ulid, reservation_id: Ulid },
    #[error("unique constraint violated: {0}")]
    Unique(String),
    #[error("WAL error: {0}")]
    Wal(String),
}

/// Read access to one restaurant's tables, reservations and assignments.
#[async_trait]
pub trait StoreRead: Send + Sync {
    fn restaurant(&self) -> &Restaurant;

    /// All tables, ordered by grid position.
    async fn tables(&self) -> Result<Vec<Table>, StoreError>;

    async fn table(&self, id: Ulid) -> Result<Option<Table>, StoreError>;

    /// Active tables, smallest capacity first (ties by id).
    async fn active_tables(&self) -> Result<Vec<Table>, StoreError>;

    /// Tables linked to an active reservation on `date` whose window overlaps
    /// `window`, ignoring `exclude`.
    async fn booked_table_ids(
        &self,
        date: NaiveDate,
        window: TimeWindow,
        exclude: Option<Ulid>,
    ) -> Result<HashSet<Ulid>, StoreError>;

    async fn reservation(&self, id: Ulid) -> Result<Option<Reservation>, StoreError>;

    async fn reservations(&self) -> Result<Vec<Reservation>, StoreError>;

    /// Tables currently assigned to a reservation.
    async fn assigned_tables(&self, reservation_id: Ulid) -> Result<Vec<Table>, StoreError>;

    /// PENDING or CONFIRMED reservations assigned to `table_id`, on any date,
    /// each with its full table set.
    async fn active_holders(&self, table_id: Ulid) -> Result<Vec<AssignedReservation>, StoreError>;
}

/// A unit of work scoped to one restaurant. Writes are staged and become
/// visible to others only on [`Transaction::commit`].
#[async_trait]
pub trait Transaction: StoreRead {
    /// Create a reservation with its assignment rows.
    async fn insert_reservation(
        &mut self,
        reservation: Reservation,
        table_ids: &[Ulid],
    ) -> Result<(), StoreError>;

    /// Overwrite a reservation's fields and replace its entire assignment set.
    async fn replace_reservation(
        &mut self,
        reservation: Reservation,
        table_ids: &[Ulid],
    ) -> Result<(), StoreError>;

    async fn set_status(&mut self, id: Ulid, status: ReservationStatus) -> Result<(), StoreError>;

    /// Overwrite name and grid size. Id and owner never change.
    async fn update_restaurant(&mut self, restaurant: Restaurant) -> Result<(), StoreError>;

    async fn insert_table(&mut self, table: Table) -> Result<(), StoreError>;

    async fn update_table(&mut self, table: Table) -> Result<(), StoreError>;

    async fn remove_table(&mut self, id: Ulid) -> Result<(), StoreError>;

    /// Durably apply all staged writes, or none of them.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Fails with [`StoreError::Unique`] if the admin already owns a restaurant.
    async fn create_restaurant(&self, restaurant: Restaurant) -> Result<(), StoreError>;

    async fn restaurant(&self, id: Ulid) -> Result<Option<Restaurant>, StoreError>;

    async fn restaurant_ids(&self) -> Result<Vec<Ulid>, StoreError>;

    async fn restaurant_by_admin(&self, admin_id: Ulid) -> Result<Option<Restaurant>, StoreError>;

    async fn restaurant_of_reservation(&self, reservation_id: Ulid)
        -> Result<Option<Ulid>, StoreError>;

    /// Every reservation a customer holds, across restaurants, with tables.
    async fn customer_reservations(
        &self,
        customer_id: Ulid,
    ) -> Result<Vec<AssignedReservation>, StoreError>;

    /// Shared read view of a restaurant.
    async fn snapshot(&self, restaurant_id: Ulid) -> Result<Box<dyn StoreRead>, StoreError>;

    /// Exclusive unit of work on a restaurant.
    async fn begin(&self, restaurant_id: Ulid) -> Result<Box<dyn Transaction>, StoreError>;
}
