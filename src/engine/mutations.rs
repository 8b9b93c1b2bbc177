use tracing::{info, warn};
use ulid::Ulid;

use crate::model::*;
use crate::observability;
use crate::slot;
use crate::store::StoreRead as _;

use super::availability::assign_tables;
use super::status::check_transition;
use super::{validate_guest_count, validate_note, with_tables, Engine, EngineError};

fn no_availability(guests: u32, date: chrono::NaiveDate, start: ClockTime) -> EngineError {
    metrics::counter!(observability::ASSIGNMENT_CONFLICTS_TOTAL).increment(1);
    EngineError::NoAvailability { guests, date, start }
}

impl Engine {
    /// Validate, pick tables and persist a PENDING reservation with its
    /// assignments as one unit. The restaurant stays locked from the conflict
    /// query until the commit, so two requests can never take the same table.
    pub async fn create_reservation(
        &self,
        customer_id: Ulid,
        input: NewReservation,
    ) -> Result<AssignedReservation, EngineError> {
        validate_guest_count(input.guest_count)?;
        validate_note(input.note.as_deref())?;
        let window = slot::booking_window(input.start_time)?;
        let date = slot::validate_booking_date(input.date, slot::today())?;

        let mut txn = self.store.begin(input.restaurant_id).await?;
        let selection = assign_tables(&*txn, date, window, input.guest_count, None)
            .await?
            .ok_or_else(|| no_availability(input.guest_count, date, input.start_time))?;

        let reservation = Reservation {
            id: Ulid::new(),
            customer_id,
            restaurant_id: input.restaurant_id,
            date,
            start_time: window.start,
            end_time: window.end,
            guest_count: input.guest_count,
            status: ReservationStatus::Pending,
            note: input.note,
        };
        txn.insert_reservation(reservation.clone(), &selection.table_ids())
            .await?;
        txn.commit().await?;

        metrics::counter!(observability::RESERVATIONS_CREATED_TOTAL).increment(1);
        info!(
            reservation = %reservation.id,
            restaurant = %reservation.restaurant_id,
            %date,
            start = %window.start,
            guests = reservation.guest_count,
            tables = selection.table_count(),
            "reservation created"
        );
        Ok(AssignedReservation {
            reservation,
            tables: selection.into_tables(),
        })
    }

    /// Change date, time, party size or note of a PENDING reservation.
    /// Tables are reassigned from scratch; the reservation's own current
    /// tables count as free.
    pub async fn modify_reservation(
        &self,
        customer_id: Ulid,
        reservation_id: Ulid,
        patch: ReservationPatch,
    ) -> Result<AssignedReservation, EngineError> {
        if let Some(guests) = patch.guest_count {
            validate_guest_count(guests)?;
        }
        validate_note(patch.note.as_deref())?;
        if let Some(start) = patch.start_time {
            slot::validate_booking_time(start)?;
        }
        let new_date = patch
            .date
            .map(|d| slot::validate_booking_date(d, slot::today()))
            .transpose()?;

        let mut txn = self.begin_for_reservation(reservation_id).await?;
        let current = txn
            .reservation(reservation_id)
            .await?
            .filter(|r| r.customer_id == customer_id)
            .ok_or(EngineError::ReservationNotFound(reservation_id))?;
        if current.status != ReservationStatus::Pending {
            return Err(EngineError::NotModifiable(current.status));
        }

        let date = new_date.unwrap_or(current.date);
        let start_time = patch.start_time.unwrap_or(current.start_time);
        let guest_count = patch.guest_count.unwrap_or(current.guest_count);
        let window = TimeWindow {
            start: start_time,
            end: slot::add_slot_duration(start_time)?,
        };

        let selection = assign_tables(&*txn, date, window, guest_count, Some(reservation_id))
            .await?
            .ok_or_else(|| no_availability(guest_count, date, start_time))?;

        let updated = Reservation {
            date,
            start_time,
            end_time: window.end,
            guest_count,
            note: patch.note.or(current.note),
            ..current
        };
        txn.replace_reservation(updated.clone(), &selection.table_ids())
            .await?;
        txn.commit().await?;

        info!(
            reservation = %reservation_id,
            %date,
            start = %start_time,
            guests = guest_count,
            tables = selection.table_count(),
            "reservation modified"
        );
        Ok(AssignedReservation {
            reservation: updated,
            tables: selection.into_tables(),
        })
    }

    /// Customer cancellation. Assignment rows stay for history but stop
    /// blocking as soon as the status is terminal.
    pub async fn cancel_reservation(
        &self,
        customer_id: Ulid,
        reservation_id: Ulid,
    ) -> Result<Reservation, EngineError> {
        let mut txn = self.begin_for_reservation(reservation_id).await?;
        let mut reservation = txn
            .reservation(reservation_id)
            .await?
            .filter(|r| r.customer_id == customer_id)
            .ok_or(EngineError::ReservationNotFound(reservation_id))?;
        check_transition(reservation.status, ReservationStatus::Cancelled)?;

        txn.set_status(reservation_id, ReservationStatus::Cancelled)
            .await?;
        txn.commit().await?;

        reservation.status = ReservationStatus::Cancelled;
        info!(reservation = %reservation_id, "reservation cancelled");
        Ok(reservation)
    }

    /// Admin status change, limited to reservations of the admin's restaurant.
    pub async fn change_status(
        &self,
        admin_id: Ulid,
        reservation_id: Ulid,
        status: ReservationStatus,
    ) -> Result<AssignedReservation, EngineError> {
        let restaurant = self.admin_restaurant(admin_id).await?;
        let mut txn = self.store.begin(restaurant.id).await?;
        let Some(mut reservation) = txn.reservation(reservation_id).await? else {
            warn!(admin = %admin_id, reservation = %reservation_id, "status change outside own restaurant");
            return Err(EngineError::ReservationNotFound(reservation_id));
        };
        let from = reservation.status;
        check_transition(from, status)?;

        txn.set_status(reservation_id, status).await?;
        reservation.status = status;
        let assigned = with_tables(&*txn, reservation).await?;
        txn.commit().await?;

        info!(reservation = %reservation_id, %from, to = %status, "reservation status changed");
        Ok(assigned)
    }
}
