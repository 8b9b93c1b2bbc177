use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::store::{StoreError, StoreRead as _};

use super::{Engine, EngineError};

fn validate_label(label: &str) -> Result<String, EngineError> {
    let label = label.trim();
    if label.is_empty() || label.chars().count() > MAX_LABEL_LEN {
        return Err(EngineError::InvalidLabel);
    }
    Ok(label.to_string())
}

fn validate_name(name: &str) -> Result<String, EngineError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(EngineError::InvalidName);
    }
    Ok(name.to_string())
}

fn validate_grid(rows: u32, cols: u32) -> Result<(), EngineError> {
    let range = 1..=MAX_GRID_DIM;
    if !range.contains(&rows) || !range.contains(&cols) {
        return Err(EngineError::InvalidGrid { rows, cols });
    }
    Ok(())
}

fn validate_capacity(capacity: u32) -> Result<(), EngineError> {
    if !VALID_CAPACITIES.contains(&capacity) {
        return Err(EngineError::InvalidCapacity(capacity));
    }
    Ok(())
}

/// Label and grid cell must not be used by another table.
fn check_unique(existing: &[Table], table: &Table) -> Result<(), EngineError> {
    for other in existing.iter().filter(|t| t.id != table.id) {
        if other.label == table.label {
            return Err(EngineError::DuplicateLabel(table.label.clone()));
        }
        if (other.grid_row, other.grid_col) == (table.grid_row, table.grid_col) {
            return Err(EngineError::GridCellOccupied(table.grid_row, table.grid_col));
        }
    }
    Ok(())
}

impl Engine {
    pub async fn create_restaurant(
        &self,
        admin_id: Ulid,
        name: &str,
        grid_rows: u32,
        grid_cols: u32,
    ) -> Result<Restaurant, EngineError> {
        let name = validate_name(name)?;
        validate_grid(grid_rows, grid_cols)?;

        let restaurant = Restaurant {
            id: Ulid::new(),
            admin_id,
            name,
            grid_rows,
            grid_cols,
        };
        match self.store.create_restaurant(restaurant.clone()).await {
            Ok(()) => {}
            Err(StoreError::Unique(_)) => return Err(EngineError::RestaurantExists),
            Err(e) => return Err(e.into()),
        }
        info!(restaurant = %restaurant.id, admin = %admin_id, "restaurant created");
        Ok(restaurant)
    }

    /// The admin's restaurant with every table, in grid order.
    pub async fn get_my_restaurant(&self, admin_id: Ulid) -> Result<RestaurantDetail, EngineError> {
        let restaurant = self.admin_restaurant(admin_id).await?;
        let view = self.store.snapshot(restaurant.id).await?;
        Ok(RestaurantDetail {
            restaurant: view.restaurant().clone(),
            tables: view.tables().await?,
        })
    }

    /// Rename or resize the floor plan. Shrinking is refused while a table
    /// sits outside the new bounds.
    pub async fn update_restaurant(
        &self,
        admin_id: Ulid,
        patch: RestaurantPatch,
    ) -> Result<Restaurant, EngineError> {
        let restaurant = self.admin_restaurant(admin_id).await?;
        let name = patch.name.as_deref().map(validate_name).transpose()?;

        let mut txn = self.store.begin(restaurant.id).await?;
        let mut updated = txn.restaurant().clone();
        if let Some(name) = name {
            updated.name = name;
        }
        updated.grid_rows = patch.grid_rows.unwrap_or(updated.grid_rows);
        updated.grid_cols = patch.grid_cols.unwrap_or(updated.grid_cols);
        validate_grid(updated.grid_rows, updated.grid_cols)?;

        let (rows, cols) = (updated.grid_rows, updated.grid_cols);
        if let Some(t) = txn
            .tables()
            .await?
            .into_iter()
            .find(|t| t.grid_row >= rows || t.grid_col >= cols)
        {
            return Err(EngineError::GridOutOfBounds { row: t.grid_row, col: t.grid_col, rows, cols });
        }

        txn.update_restaurant(updated.clone()).await?;
        txn.commit().await?;
        info!(restaurant = %updated.id, name = %updated.name, rows, cols, "restaurant updated");
        Ok(updated)
    }

    pub async fn add_table(&self, admin_id: Ulid, input: NewTable) -> Result<Table, EngineError> {
        let restaurant = self.admin_restaurant(admin_id).await?;
        let label = validate_label(&input.label)?;
        validate_capacity(input.capacity)?;
        if input.grid_row >= restaurant.grid_rows || input.grid_col >= restaurant.grid_cols {
            return Err(EngineError::GridOutOfBounds {
                row: input.grid_row,
                col: input.grid_col,
                rows: restaurant.grid_rows,
                cols: restaurant.grid_cols,
            });
        }

        let mut txn = self.store.begin(restaurant.id).await?;
        let existing = txn.tables().await?;
        if existing.len() >= MAX_TABLES_PER_RESTAURANT {
            return Err(EngineError::TooManyTables);
        }
        let table = Table {
            id: Ulid::new(),
            restaurant_id: restaurant.id,
            label,
            capacity: input.capacity,
            grid_row: input.grid_row,
            grid_col: input.grid_col,
            active: true,
        };
        check_unique(&existing, &table)?;
        txn.insert_table(table.clone()).await?;
        txn.commit().await?;

        info!(table = %table.id, label = %table.label, capacity = table.capacity, "table added");
        Ok(table)
    }

    /// Relabel, resize or (de)activate a table. Existing assignments are
    /// kept; deactivation only stops the table from being picked again.
    /// Shrinking is refused if an active reservation would no longer fit
    /// on its assigned tables.
    pub async fn update_table(
        &self,
        admin_id: Ulid,
        table_id: Ulid,
        patch: TablePatch,
    ) -> Result<Table, EngineError> {
        let restaurant = self.admin_restaurant(admin_id).await?;
        let label = patch.label.as_deref().map(validate_label).transpose()?;
        if let Some(capacity) = patch.capacity {
            validate_capacity(capacity)?;
        }

        let mut txn = self.store.begin(restaurant.id).await?;
        let mut table = txn
            .table(table_id)
            .await?
            .ok_or(EngineError::TableNotFound(table_id))?;
        if let Some(label) = label {
            table.label = label;
        }
        if let Some(capacity) = patch.capacity.filter(|&c| c < table.capacity) {
            for held in txn.active_holders(table_id).await? {
                if held.seated_capacity() + capacity < held.reservation.guest_count + table.capacity {
                    return Err(EngineError::CapacityInUse(table_id));
                }
            }
        }
        if let Some(capacity) = patch.capacity {
            table.capacity = capacity;
        }
        if let Some(active) = patch.active {
            table.active = active;
        }
        check_unique(&txn.tables().await?, &table)?;
        txn.update_table(table.clone()).await?;
        txn.commit().await?;

        info!(table = %table_id, active = table.active, "table updated");
        Ok(table)
    }

    /// Refused while any PENDING or CONFIRMED reservation still uses the
    /// table, past dates included, so no active booking loses its seats.
    pub async fn remove_table(&self, admin_id: Ulid, table_id: Ulid) -> Result<(), EngineError> {
        let restaurant = self.admin_restaurant(admin_id).await?;
        let mut txn = self.store.begin(restaurant.id).await?;
        if txn.table(table_id).await?.is_none() {
            return Err(EngineError::TableNotFound(table_id));
        }
        if !txn.active_holders(table_id).await?.is_empty() {
            return Err(EngineError::TableInUse(table_id));
        }

        txn.remove_table(table_id).await?;
        txn.commit().await?;
        info!(table = %table_id, "table removed");
        Ok(())
    }

    /// Floor plan, ordered by grid position.
    pub async fn list_tables(&self, admin_id: Ulid) -> Result<Vec<Table>, EngineError> {
        let restaurant = self.admin_restaurant(admin_id).await?;
        let view = self.store.snapshot(restaurant.id).await?;
        Ok(view.tables().await?)
    }
}
