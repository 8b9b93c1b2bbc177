use std::collections::{HashMap, HashSet};
use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::wal::{Commit, Wal};

use super::state::{RestaurantState, Undo};
use super::{Store, StoreError, StoreRead, Transaction};

pub type SharedRestaurantState = Arc<RwLock<RestaurantState>>;

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        commit: Commit,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        snapshot: Commit,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// Blocks for the first Append, drains whatever else is queued, then issues a
/// single fsync for the batch before answering every sender.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { commit, response } => {
                let mut batch = vec![(commit, response)];
                let mut deferred = None;
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { commit, response }) => batch.push((commit, response)),
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                    .record(batch.len() as f64);
                let flush_start = std::time::Instant::now();
                let result = flush_batch(&mut wal, &batch);
                metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                    .record(flush_start.elapsed().as_secs_f64());
                for (_, tx) in batch {
                    let r = match &result {
                        Ok(()) => Ok(()),
                        Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
                    };
                    let _ = tx.send(r);
                }

                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Commit, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err = None;
    for (commit, _) in batch {
        if let Err(e) = wal.append_buffered(commit) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush so partially buffered bytes don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { snapshot, response } => {
            let result = Wal::write_compact_file(wal.path(), &snapshot)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the caller"),
    }
}

struct Shared {
    restaurants: DashMap<Ulid, SharedRestaurantState>,
    /// Admin → the one restaurant they own.
    by_admin: DashMap<Ulid, Ulid>,
    /// Reverse lookup: reservation → restaurant.
    reservation_to_restaurant: DashMap<Ulid, Ulid>,
    /// Customer → restaurants they have booked at.
    customer_restaurants: DashMap<Ulid, HashSet<Ulid>>,
    /// Serializes restaurant creation so the one-per-admin check can't race.
    catalog: Mutex<()>,
    wal_tx: mpsc::Sender<WalCommand>,
}

impl Shared {
    async fn wal_append(&self, commit: Commit) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append { commit, response: tx })
            .await
            .map_err(|_| StoreError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Wal(e.to_string()))
    }

    fn index_reservation(&self, reservation: &Reservation) {
        self.reservation_to_restaurant
            .insert(reservation.id, reservation.restaurant_id);
        self.customer_restaurants
            .entry(reservation.customer_id)
            .or_default()
            .insert(reservation.restaurant_id);
    }

    fn get(&self, id: &Ulid) -> Result<SharedRestaurantState, StoreError> {
        self.restaurants
            .get(id)
            .map(|e| e.value().clone())
            .ok_or(StoreError::NoSuchRestaurant(*id))
    }
}

/// In-memory store made durable by a write-ahead log.
///
/// Each restaurant's state sits behind its own `RwLock`; a [`Transaction`]
/// holds the write half from `begin` to `commit`, which serializes every
/// assignment decision for that restaurant.
#[derive(Clone)]
pub struct WalStore {
    shared: Arc<Shared>,
}

impl WalStore {
    /// Replay the WAL at `path` and start the background writer.
    /// Must be called from within a tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let commits = Wal::replay(path)?;
        let wal = Wal::open(path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let mut states: HashMap<Ulid, RestaurantState> = HashMap::new();
        let by_admin = DashMap::new();
        let mut reservations = Vec::new();
        let mut events = 0usize;

        for commit in &commits {
            for event in &commit.events {
                events += 1;
                match event {
                    Event::RestaurantCreated(r) => {
                        by_admin.insert(r.admin_id, r.id);
                        states.insert(r.id, RestaurantState::new(r.clone()));
                    }
                    other => {
                        if let Event::ReservationCreated { reservation, .. } = other {
                            reservations.push(reservation);
                        }
                        match states.get_mut(&other.restaurant_id()) {
                            Some(state) => state.apply(other),
                            None => tracing::warn!("WAL replay: event for unknown restaurant {}", other.restaurant_id()),
                        }
                    }
                }
            }
        }
        tracing::info!(
            "replayed {} commits ({events} events) from {}",
            commits.len(),
            path.display()
        );

        let restaurants = DashMap::new();
        for (id, state) in states {
            restaurants.insert(id, Arc::new(RwLock::new(state)));
        }

        let shared = Shared {
            restaurants,
            by_admin,
            reservation_to_restaurant: DashMap::new(),
            customer_restaurants: DashMap::new(),
            catalog: Mutex::new(()),
            wal_tx,
        };
        for reservation in reservations {
            shared.index_reservation(reservation);
        }
        Ok(Self { shared: Arc::new(shared) })
    }

    /// Rewrite the WAL as a single snapshot commit of the current state.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let _catalog = self.shared.catalog.lock().await;
        let mut ids: Vec<Ulid> = self.shared.restaurants.iter().map(|e| *e.key()).collect();
        ids.sort();

        // Hold every read lock until the swap so no commit slips between
        // snapshot and rename.
        let mut guards = Vec::with_capacity(ids.len());
        for id in &ids {
            guards.push(self.shared.get(id)?.read_owned().await);
        }

        let mut events = Vec::new();
        for guard in &guards {
            events.push(Event::RestaurantCreated(guard.restaurant.clone()));
            for table in guard.tables.values() {
                events.push(Event::TableAdded(table.clone()));
            }
            let mut reservations: Vec<&Reservation> = guard.reservations.values().collect();
            reservations.sort_by_key(|r| r.id);
            for r in reservations {
                events.push(Event::ReservationCreated {
                    reservation: r.clone(),
                    table_ids: guard.assigned_table_ids(r.id).to_vec(),
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.shared
            .wal_tx
            .send(WalCommand::Compact {
                snapshot: Commit { events },
                response: tx,
            })
            .await
            .map_err(|_| StoreError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Wal(e.to_string()))
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .shared
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl Store for WalStore {
    async fn create_restaurant(&self, restaurant: Restaurant) -> Result<(), StoreError> {
        let _catalog = self.shared.catalog.lock().await;
        if self.shared.by_admin.contains_key(&restaurant.admin_id) {
            return Err(StoreError::Unique(format!(
                "restaurant for admin {}",
                restaurant.admin_id
            )));
        }
        if self.shared.restaurants.contains_key(&restaurant.id) {
            return Err(StoreError::Unique(format!("restaurant id {}", restaurant.id)));
        }

        self.shared
            .wal_append(Commit {
                events: vec![Event::RestaurantCreated(restaurant.clone())],
            })
            .await?;
        self.shared.by_admin.insert(restaurant.admin_id, restaurant.id);
        self.shared.restaurants.insert(
            restaurant.id,
            Arc::new(RwLock::new(RestaurantState::new(restaurant))),
        );
        Ok(())
    }

    async fn restaurant(&self, id: Ulid) -> Result<Option<Restaurant>, StoreError> {
        let Ok(rs) = self.shared.get(&id) else {
            return Ok(None);
        };
        let guard = rs.read().await;
        Ok(Some(guard.restaurant.clone()))
    }

    async fn restaurant_ids(&self) -> Result<Vec<Ulid>, StoreError> {
        Ok(self.shared.restaurants.iter().map(|e| *e.key()).collect())
    }

    async fn restaurant_by_admin(&self, admin_id: Ulid) -> Result<Option<Restaurant>, StoreError> {
        let Some(id) = self.shared.by_admin.get(&admin_id).map(|e| *e.value()) else {
            return Ok(None);
        };
        self.restaurant(id).await
    }

    async fn restaurant_of_reservation(
        &self,
        reservation_id: Ulid,
    ) -> Result<Option<Ulid>, StoreError> {
        Ok(self
            .shared
            .reservation_to_restaurant
            .get(&reservation_id)
            .map(|e| *e.value()))
    }

    async fn customer_reservations(
        &self,
        customer_id: Ulid,
    ) -> Result<Vec<AssignedReservation>, StoreError> {
        let restaurant_ids: Vec<Ulid> = self
            .shared
            .customer_restaurants
            .get(&customer_id)
            .map(|e| e.value().iter().copied().collect())
            .unwrap_or_default();
        let mut out = Vec::new();
        for id in restaurant_ids {
            let rs = self.shared.get(&id)?;
            let guard = rs.read().await;
            for r in guard.customer_reservations(customer_id) {
                out.push(AssignedReservation {
                    reservation: r.clone(),
                    tables: guard.assigned_tables(r.id),
                });
            }
        }
        Ok(out)
    }

    async fn snapshot(&self, restaurant_id: Ulid) -> Result<Box<dyn StoreRead>, StoreError> {
        let guard = self.shared.get(&restaurant_id)?.read_owned().await;
        Ok(Box::new(Snapshot { guard }))
    }

    async fn begin(&self, restaurant_id: Ulid) -> Result<Box<dyn Transaction>, StoreError> {
        let guard = self.shared.get(&restaurant_id)?.write_owned().await;
        Ok(Box::new(WalTransaction {
            shared: self.shared.clone(),
            guard,
            pending: Vec::new(),
            undo: Vec::new(),
        }))
    }
}

// ── Read views ───────────────────────────────────────────

trait StateView {
    fn view(&self) -> &RestaurantState;
}

struct Snapshot {
    guard: OwnedRwLockReadGuard<RestaurantState>,
}

impl StateView for Snapshot {
    fn view(&self) -> &RestaurantState {
        &self.guard
    }
}

#[async_trait]
impl<T: StateView + Send + Sync> StoreRead for T {
    fn restaurant(&self) -> &Restaurant {
        &self.view().restaurant
    }

    async fn tables(&self) -> Result<Vec<Table>, StoreError> {
        Ok(self.view().tables_by_position())
    }

    async fn table(&self, id: Ulid) -> Result<Option<Table>, StoreError> {
        Ok(self.view().tables.get(&id).cloned())
    }

    async fn active_tables(&self) -> Result<Vec<Table>, StoreError> {
        Ok(self.view().active_tables())
    }

    async fn booked_table_ids(
        &self,
        date: NaiveDate,
        window: TimeWindow,
        exclude: Option<Ulid>,
    ) -> Result<HashSet<Ulid>, StoreError> {
        Ok(self.view().booked_table_ids(date, &window, exclude))
    }

    async fn reservation(&self, id: Ulid) -> Result<Option<Reservation>, StoreError> {
        Ok(self.view().reservations.get(&id).cloned())
    }

    async fn reservations(&self) -> Result<Vec<Reservation>, StoreError> {
        Ok(self.view().reservations.values().cloned().collect())
    }

    async fn assigned_tables(&self, reservation_id: Ulid) -> Result<Vec<Table>, StoreError> {
        Ok(self.view().assigned_tables(reservation_id))
    }

    async fn active_holders(&self, table_id: Ulid) -> Result<Vec<AssignedReservation>, StoreError> {
        let state = self.view();
        Ok(state
            .active_holders(table_id)
            .into_iter()
            .map(|r| AssignedReservation {
                reservation: r.clone(),
                tables: state.assigned_tables(r.id),
            })
            .collect())
    }
}

// ── Transactions ─────────────────────────────────────────

/// Holds the restaurant's write lock. Staged writes are applied in place,
/// which nobody else can observe while the lock is held, and each one
/// records what it overwrote. Dropping the transaction without a successful
/// commit replays that log backwards.
struct WalTransaction {
    shared: Arc<Shared>,
    guard: OwnedRwLockWriteGuard<RestaurantState>,
    pending: Vec<Event>,
    undo: Vec<Undo>,
}

impl StateView for WalTransaction {
    fn view(&self) -> &RestaurantState {
        &self.guard
    }
}

impl WalTransaction {
    fn stage(&mut self, event: Event) {
        if let Some(undo) = self.guard.apply_undoable(&event) {
            self.undo.push(undo);
        }
        self.pending.push(event);
    }
}

impl Drop for WalTransaction {
    fn drop(&mut self) {
        while let Some(undo) = self.undo.pop() {
            self.guard.undo(undo);
        }
    }
}

#[async_trait]
impl Transaction for WalTransaction {
    async fn insert_reservation(
        &mut self,
        reservation: Reservation,
        table_ids: &[Ulid],
    ) -> Result<(), StoreError> {
        if self.view().reservations.contains_key(&reservation.id) {
            return Err(StoreError::Unique(format!("reservation id {}", reservation.id)));
        }
        self.view().check_exclusion(&reservation, table_ids)?;
        self.stage(Event::ReservationCreated {
            reservation,
            table_ids: table_ids.to_vec(),
        });
        Ok(())
    }

    async fn replace_reservation(
        &mut self,
        reservation: Reservation,
        table_ids: &[Ulid],
    ) -> Result<(), StoreError> {
        if !self.view().reservations.contains_key(&reservation.id) {
            return Err(StoreError::Missing(reservation.id));
        }
        self.view().check_exclusion(&reservation, table_ids)?;
        self.stage(Event::ReservationReplaced {
            reservation,
            table_ids: table_ids.to_vec(),
        });
        Ok(())
    }

    async fn set_status(&mut self, id: Ulid, status: ReservationStatus) -> Result<(), StoreError> {
        if !self.view().reservations.contains_key(&id) {
            return Err(StoreError::Missing(id));
        }
        let restaurant_id = self.view().restaurant.id;
        self.stage(Event::StatusChanged { id, restaurant_id, status });
        Ok(())
    }

    async fn update_restaurant(&mut self, restaurant: Restaurant) -> Result<(), StoreError> {
        let current = &self.view().restaurant;
        if restaurant.id != current.id || restaurant.admin_id != current.admin_id {
            return Err(StoreError::Missing(restaurant.id));
        }
        self.stage(Event::RestaurantUpdated(restaurant));
        Ok(())
    }

    async fn insert_table(&mut self, table: Table) -> Result<(), StoreError> {
        if self.view().tables.contains_key(&table.id) {
            return Err(StoreError::Unique(format!("table id {}", table.id)));
        }
        self.view().check_table_unique(&table)?;
        self.stage(Event::TableAdded(table));
        Ok(())
    }

    async fn update_table(&mut self, table: Table) -> Result<(), StoreError> {
        if !self.view().tables.contains_key(&table.id) {
            return Err(StoreError::Missing(table.id));
        }
        self.view().check_table_unique(&table)?;
        self.stage(Event::TableUpdated(table));
        Ok(())
    }

    async fn remove_table(&mut self, id: Ulid) -> Result<(), StoreError> {
        if !self.view().tables.contains_key(&id) {
            return Err(StoreError::Missing(id));
        }
        let restaurant_id = self.view().restaurant.id;
        self.stage(Event::TableRemoved { id, restaurant_id });
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let events = std::mem::take(&mut self.pending);
        // On failure `self` drops here and the staged writes are undone.
        self.shared.wal_append(Commit { events: events.clone() }).await?;
        self.undo.clear();
        for event in &events {
            if let Event::ReservationCreated { reservation, .. } = event {
                self.shared.index_reservation(reservation);
            }
        }
        Ok(())
    }
}
