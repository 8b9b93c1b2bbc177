use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::StoreError;

/// Everything stored for one restaurant. Reservations are never removed.
///
/// Assignments are kept per reservation, and reservations are indexed by
/// date, by table and by customer, so conflict queries only touch the day
/// being booked.
#[derive(Debug, Clone)]
pub struct RestaurantState {
    pub restaurant: Restaurant,
    pub tables: BTreeMap<Ulid, Table>,
    pub reservations: HashMap<Ulid, Reservation>,
    /// Reservation → assigned table ids.
    assignments: HashMap<Ulid, Vec<Ulid>>,
    by_date: BTreeMap<NaiveDate, Vec<Ulid>>,
    /// Table → every reservation ever assigned to it.
    by_table: HashMap<Ulid, HashSet<Ulid>>,
    by_customer: BTreeMap<Ulid, Vec<Ulid>>,
}

/// What an applied event overwrote, so a transaction can be rolled back.
#[derive(Debug)]
pub enum Undo {
    Restaurant(Restaurant),
    Table(Ulid, Option<Table>),
    Reservation(Ulid, Option<(Reservation, Vec<Ulid>)>),
}

impl RestaurantState {
    pub fn new(restaurant: Restaurant) -> Self {
        Self {
            restaurant,
            tables: BTreeMap::new(),
            reservations: HashMap::new(),
            assignments: HashMap::new(),
            by_date: BTreeMap::new(),
            by_table: HashMap::new(),
            by_customer: BTreeMap::new(),
        }
    }

    /// Apply an event (no validation — caller has checked constraints).
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::RestaurantUpdated(restaurant) => {
                self.restaurant = restaurant.clone();
            }
            Event::TableAdded(table) | Event::TableUpdated(table) => {
                self.tables.insert(table.id, table.clone());
            }
            Event::TableRemoved { id, .. } => {
                self.tables.remove(id);
            }
            Event::ReservationCreated { reservation, table_ids }
            | Event::ReservationReplaced { reservation, table_ids } => {
                self.put_reservation(reservation.clone(), table_ids.clone());
            }
            Event::StatusChanged { id, status, .. } => {
                if let Some(r) = self.reservations.get_mut(id) {
                    r.status = *status;
                }
            }
            // Restaurants are created at the store level, not here
            Event::RestaurantCreated(_) => {}
        }
    }

    /// Apply an event and return what it replaced. `None` for events that
    /// change nothing here.
    pub fn apply_undoable(&mut self, event: &Event) -> Option<Undo> {
        let undo = match event {
            Event::RestaurantCreated(_) => return None,
            Event::RestaurantUpdated(_) => Undo::Restaurant(self.restaurant.clone()),
            Event::TableAdded(table) | Event::TableUpdated(table) => {
                Undo::Table(table.id, self.tables.get(&table.id).cloned())
            }
            Event::TableRemoved { id, .. } => Undo::Table(*id, self.tables.get(id).cloned()),
            Event::ReservationCreated { reservation, .. }
            | Event::ReservationReplaced { reservation, .. } => {
                Undo::Reservation(reservation.id, self.stored_reservation(reservation.id))
            }
            Event::StatusChanged { id, .. } => Undo::Reservation(*id, self.stored_reservation(*id)),
        };
        self.apply(event);
        Some(undo)
    }

    pub fn undo(&mut self, undo: Undo) {
        match undo {
            Undo::Restaurant(restaurant) => self.restaurant = restaurant,
            Undo::Table(id, Some(table)) => {
                self.tables.insert(id, table);
            }
            Undo::Table(id, None) => {
                self.tables.remove(&id);
            }
            Undo::Reservation(_, Some((reservation, table_ids))) => {
                self.put_reservation(reservation, table_ids);
            }
            Undo::Reservation(id, None) => {
                self.drop_reservation(id);
            }
        }
    }

    fn stored_reservation(&self, id: Ulid) -> Option<(Reservation, Vec<Ulid>)> {
        let reservation = self.reservations.get(&id)?.clone();
        Some((reservation, self.assigned_table_ids(id).to_vec()))
    }

    /// Insert or overwrite a reservation and its whole assignment set.
    fn put_reservation(&mut self, reservation: Reservation, table_ids: Vec<Ulid>) {
        let id = reservation.id;
        self.drop_reservation(id);
        self.by_date.entry(reservation.date).or_default().push(id);
        self.by_customer.entry(reservation.customer_id).or_default().push(id);
        for table_id in &table_ids {
            self.by_table.entry(*table_id).or_default().insert(id);
        }
        self.assignments.insert(id, table_ids);
        self.reservations.insert(id, reservation);
    }

    fn drop_reservation(&mut self, id: Ulid) {
        let Some(reservation) = self.reservations.remove(&id) else {
            return;
        };
        remove_from(&mut self.by_date, reservation.date, id);
        remove_from(&mut self.by_customer, reservation.customer_id, id);
        for table_id in self.assignments.remove(&id).unwrap_or_default() {
            let emptied = self.by_table.get_mut(&table_id).is_some_and(|held| {
                held.remove(&id);
                held.is_empty()
            });
            if emptied {
                self.by_table.remove(&table_id);
            }
        }
    }

    // ── Reads ────────────────────────────────────────────────

    pub fn tables_by_position(&self) -> Vec<Table> {
        let mut tables: Vec<Table> = self.tables.values().cloned().collect();
        tables.sort_by_key(|t| (t.grid_row, t.grid_col));
        tables
    }

    /// Active tables, smallest capacity first. BTreeMap iteration is
    /// id-ordered and the sort is stable, so ids ascend within a capacity.
    pub fn active_tables(&self) -> Vec<Table> {
        let mut tables: Vec<Table> = self.tables.values().filter(|t| t.active).cloned().collect();
        tables.sort_by_key(|t| t.capacity);
        tables
    }

    fn on_date(&self, date: NaiveDate) -> impl Iterator<Item = &Reservation> {
        self.by_date
            .get(&date)
            .into_iter()
            .flatten()
            .filter_map(|id| self.reservations.get(id))
    }

    pub fn booked_table_ids(
        &self,
        date: NaiveDate,
        window: &TimeWindow,
        exclude: Option<Ulid>,
    ) -> HashSet<Ulid> {
        self.on_date(date)
            .filter(|r| Some(r.id) != exclude)
            .filter(|r| r.status.is_active() && r.window().overlaps(window))
            .flat_map(|r| self.assigned_table_ids(r.id).iter().copied())
            .collect()
    }

    pub fn assigned_table_ids(&self, reservation_id: Ulid) -> &[Ulid] {
        self.assignments
            .get(&reservation_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Assigned tables that still exist. Removed tables drop out.
    pub fn assigned_tables(&self, reservation_id: Ulid) -> Vec<Table> {
        self.assigned_table_ids(reservation_id)
            .iter()
            .filter_map(|id| self.tables.get(id).cloned())
            .collect()
    }

    /// Active reservations holding `table_id`, whatever their date.
    pub fn active_holders(&self, table_id: Ulid) -> Vec<&Reservation> {
        self.by_table
            .get(&table_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.reservations.get(id))
            .filter(|r| r.status.is_active())
            .collect()
    }

    pub fn customer_reservations(&self, customer_id: Ulid) -> Vec<&Reservation> {
        self.by_customer
            .get(&customer_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.reservations.get(id))
            .collect()
    }

    // ── Constraints ──────────────────────────────────────────

    /// Reject assigning `table_ids` to `reservation` if any of them is already
    /// held by another active reservation with an overlapping window.
    pub fn check_exclusion(
        &self,
        reservation: &Reservation,
        table_ids: &[Ulid],
    ) -> Result<(), StoreError> {
        for id in table_ids {
            if !self.tables.contains_key(id) {
                return Err(StoreError::Missing(*id));
            }
        }
        if !reservation.status.is_active() {
            return Ok(());
        }
        let window = reservation.window();
        for other in self.on_date(reservation.date) {
            if other.id == reservation.id
                || !other.status.is_active()
                || !other.window().overlaps(&window)
            {
                continue;
            }
            if let Some(&table_id) = self
                .assigned_table_ids(other.id)
                .iter()
                .find(|t| table_ids.contains(t))
            {
                return Err(StoreError::Exclusion {
                    table_id,
                    reservation_id: other.id,
                });
            }
        }
        Ok(())
    }

    /// Labels and grid cells are unique per restaurant.
    pub fn check_table_unique(&self, table: &Table) -> Result<(), StoreError> {
        for other in self.tables.values().filter(|t| t.id != table.id) {
            if other.label == table.label {
                return Err(StoreError::Unique(format!("table label {:?}", table.label)));
            }
            if (other.grid_row, other.grid_col) == (table.grid_row, table.grid_col) {
                return Err(StoreError::Unique(format!(
                    "grid cell ({}, {})",
                    table.grid_row, table.grid_col
                )));
            }
        }
        Ok(())
    }
}

fn remove_from<K: Ord>(index: &mut BTreeMap<K, Vec<Ulid>>, key: K, id: Ulid) {
    let emptied = index.get_mut(&key).is_some_and(|ids| {
        ids.retain(|r| *r != id);
        ids.is_empty()
    });
    if emptied {
        index.remove(&key);
    }
}
