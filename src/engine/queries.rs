use std::cmp::Reverse;
use std::collections::BTreeMap;

use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::store::StoreRead as _;

use super::{with_tables, Engine, EngineError};

fn check_page(filter: &ReservationFilter) -> Result<(), EngineError> {
    if filter.page == 0 || filter.limit == 0 || filter.limit > MAX_PAGE_LIMIT {
        return Err(EngineError::InvalidPage);
    }
    Ok(())
}

/// Slice an already-sorted result set. Pages past the end are empty.
fn paginate<T>(items: Vec<T>, page: u32, limit: u32) -> Page<T> {
    let total = items.len();
    let pages = total.div_ceil(limit as usize) as u32;
    let skip = (page as usize - 1).saturating_mul(limit as usize);
    let data = items.into_iter().skip(skip).take(limit as usize).collect();
    Page { data, total, page, limit, pages }
}

/// Fold a restaurant's reservations into one row per customer, most
/// reservations first, ties by customer id.
fn customer_summaries(reservations: &[Reservation]) -> Vec<CustomerSummary> {
    let mut by_customer: BTreeMap<Ulid, CustomerSummary> = BTreeMap::new();
    for r in reservations {
        let row = by_customer.entry(r.customer_id).or_insert(CustomerSummary {
            customer_id: r.customer_id,
            reservations: 0,
            active: 0,
            last_date: r.date,
        });
        row.reservations += 1;
        if r.status.is_active() {
            row.active += 1;
        }
        row.last_date = row.last_date.max(r.date);
    }
    let mut rows: Vec<CustomerSummary> = by_customer.into_values().collect();
    rows.sort_by_key(|c| (Reverse(c.reservations), c.customer_id));
    rows
}

impl Engine {
    /// Every restaurant, by name, with its count of bookable tables.
    pub async fn list_restaurants(&self) -> Result<Vec<RestaurantSummary>, EngineError> {
        let mut out = Vec::new();
        for id in self.store.restaurant_ids().await? {
            let view = self.store.snapshot(id).await?;
            out.push(RestaurantSummary {
                restaurant: view.restaurant().clone(),
                active_tables: view.active_tables().await?.len(),
            });
        }
        out.sort_by(|a, b| {
            (&a.restaurant.name, a.restaurant.id).cmp(&(&b.restaurant.name, b.restaurant.id))
        });
        Ok(out)
    }

    /// Customer view of one restaurant: active tables only, by label.
    pub async fn get_restaurant(&self, restaurant_id: Ulid) -> Result<RestaurantDetail, EngineError> {
        let view = self.store.snapshot(restaurant_id).await?;
        let mut tables = view.active_tables().await?;
        tables.sort_by(|a, b| a.label.cmp(&b.label));
        Ok(RestaurantDetail {
            restaurant: view.restaurant().clone(),
            tables,
        })
    }

    /// A customer's own reservation. Someone else's is reported as not found.
    pub async fn get_reservation(
        &self,
        customer_id: Ulid,
        reservation_id: Ulid,
    ) -> Result<AssignedReservation, EngineError> {
        let not_found = EngineError::ReservationNotFound(reservation_id);
        let Some(restaurant_id) = self.store.restaurant_of_reservation(reservation_id).await? else {
            return Err(not_found);
        };
        let view = self.store.snapshot(restaurant_id).await?;
        let reservation = view
            .reservation(reservation_id)
            .await?
            .filter(|r| r.customer_id == customer_id)
            .ok_or(not_found)?;
        with_tables(&*view, reservation).await
    }

    /// Newest first: date descending, then start time descending.
    pub async fn list_my_reservations(
        &self,
        customer_id: Ulid,
        filter: ReservationFilter,
    ) -> Result<Page<AssignedReservation>, EngineError> {
        check_page(&filter)?;
        let mut items: Vec<AssignedReservation> = self
            .store
            .customer_reservations(customer_id)
            .await?
            .into_iter()
            .filter(|a| filter.status.is_none_or(|s| a.reservation.status == s))
            .collect();
        items.sort_by_key(|a| {
            let r = &a.reservation;
            (Reverse(r.date), Reverse(r.start_time), r.id)
        });
        Ok(paginate(items, filter.page, filter.limit))
    }

    /// Admin view of the restaurant's book: date descending, then start
    /// time ascending within a day.
    pub async fn admin_list_reservations(
        &self,
        admin_id: Ulid,
        filter: ReservationFilter,
    ) -> Result<Page<AssignedReservation>, EngineError> {
        check_page(&filter)?;
        let restaurant = self.admin_restaurant(admin_id).await?;
        let view = self.store.snapshot(restaurant.id).await?;

        let mut reservations: Vec<Reservation> = view
            .reservations()
            .await?
            .into_iter()
            .filter(|r| filter.status.is_none_or(|s| r.status == s))
            .filter(|r| filter.date.is_none_or(|d| r.date == d))
            .collect();
        reservations.sort_by_key(|r| (Reverse(r.date), r.start_time, r.id));

        let page = paginate(reservations, filter.page, filter.limit);
        let mut data = Vec::with_capacity(page.data.len());
        for r in page.data {
            data.push(with_tables(&*view, r).await?);
        }
        Ok(Page {
            data,
            total: page.total,
            page: page.page,
            limit: page.limit,
            pages: page.pages,
        })
    }

    /// Customers who have booked at the admin's restaurant, with counts.
    pub async fn admin_list_customers(&self, admin_id: Ulid) -> Result<Vec<CustomerSummary>, EngineError> {
        let restaurant = self.admin_restaurant(admin_id).await?;
        let view = self.store.snapshot(restaurant.id).await?;
        Ok(customer_summaries(&view.reservations().await?))
    }
}
