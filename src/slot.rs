//! Time-of-day parsing, slot arithmetic and the booking-window rules.
//!
//! Every reservation occupies a fixed slot of [`SLOT_MINUTES`] starting at a
//! bookable time of day. Conflict detection everywhere in the crate goes
//! through [`windows_overlap`].

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};

use crate::limits::*;
use crate::model::{ClockTime, TimeWindow};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeError {
    #[error("invalid time format: {0:?} (expected HH:MM)")]
    InvalidFormat(String),
    #[error("invalid date format: {0:?} (expected YYYY-MM-DD)")]
    InvalidDate(String),
    #[error("reservation end time cannot exceed midnight")]
    SlotExceedsDayBoundary,
    #[error("bookings are accepted from 09:00 to 22:00, got {0}")]
    OutsideOperatingHours(ClockTime),
    #[error("booking time must be on the hour or half-hour, got {0}")]
    InvalidGranularity(ClockTime),
    #[error("reservation date {0} is in the past")]
    DateInPast(NaiveDate),
    #[error("reservation date {0} is more than {days} days ahead", days = BOOKING_HORIZON_DAYS)]
    DateTooFarAhead(NaiveDate),
}

/// Parse a strict `HH:MM` string (two digits each, hours 0–23, minutes 0–59).
pub fn parse_time_of_day(s: &str) -> Result<ClockTime, TimeError> {
    let invalid = || TimeError::InvalidFormat(s.to_string());
    let (h, m) = s.split_once(':').ok_or_else(invalid)?;
    if h.len() != 2 || m.len() != 2 || !h.bytes().chain(m.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let hours: u16 = h.parse().map_err(|_| invalid())?;
    let minutes: u16 = m.parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }
    ClockTime::from_minutes(hours * 60 + minutes).ok_or_else(invalid)
}

/// End of the slot that starts at `start`.
///
/// A slot ending at or past midnight belongs to the next day and is rejected.
pub fn add_slot_duration(start: ClockTime) -> Result<ClockTime, TimeError> {
    let total = start.minutes() + SLOT_MINUTES;
    if total >= MINUTES_PER_DAY {
        return Err(TimeError::SlotExceedsDayBoundary);
    }
    ClockTime::from_minutes(total).ok_or(TimeError::SlotExceedsDayBoundary)
}

/// Open-interval overlap: windows that only touch at a boundary do not overlap.
pub fn windows_overlap(
    a_start: ClockTime,
    a_end: ClockTime,
    b_start: ClockTime,
    b_end: ClockTime,
) -> bool {
    a_start < b_end && a_end > b_start
}

pub fn validate_booking_time(t: ClockTime) -> Result<(), TimeError> {
    let minutes = t.minutes();
    if !(FIRST_BOOKING_MINUTE..=LAST_BOOKING_MINUTE).contains(&minutes) {
        return Err(TimeError::OutsideOperatingHours(t));
    }
    if minutes % 30 != 0 {
        return Err(TimeError::InvalidGranularity(t));
    }
    Ok(())
}

/// Validate a bookable start time and build its slot window in one go.
pub fn booking_window(start: ClockTime) -> Result<TimeWindow, TimeError> {
    validate_booking_time(start)?;
    let end = add_slot_duration(start)?;
    Ok(TimeWindow { start, end })
}

/// Parse a calendar date. A trailing time of day is accepted and stripped.
pub fn parse_date(s: &str) -> Result<NaiveDate, TimeError> {
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(d);
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.date());
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.date_naive());
    }
    Err(TimeError::InvalidDate(s.to_string()))
}

/// Accept `date` if it lies within `[today, today + horizon]`.
pub fn validate_booking_date(date: NaiveDate, today: NaiveDate) -> Result<NaiveDate, TimeError> {
    if date < today {
        return Err(TimeError::DateInPast(date));
    }
    if (date - today).num_days() > BOOKING_HORIZON_DAYS {
        return Err(TimeError::DateTooFarAhead(date));
    }
    Ok(date)
}

/// The server's local calendar date.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> ClockTime {
        parse_time_of_day(s).unwrap()
    }

    fn overlap(a: &str, b: &str, c: &str, d: &str) -> bool {
        windows_overlap(t(a), t(b), t(c), t(d))
    }

    #[test]
    fn parse_accepts_valid_times() {
        assert_eq!(t("00:00").minutes(), 0);
        assert_eq!(t("19:30").minutes(), 19 * 60 + 30);
        assert_eq!(t("23:59").minutes(), 23 * 60 + 59);
    }

    #[test]
    fn parse_rejects_malformed() {
        for bad in ["", "9:00", "24:00", "12:60", "12-00", "12:0", "ab:cd", "12:00:00", "+1:00"] {
            assert!(
                matches!(parse_time_of_day(bad), Err(TimeError::InvalidFormat(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn slot_end_is_two_hours_later() {
        assert_eq!(add_slot_duration(t("19:00")).unwrap().to_string(), "21:00");
        assert_eq!(add_slot_duration(t("09:30")).unwrap().to_string(), "11:30");
        assert_eq!(add_slot_duration(t("21:30")).unwrap().to_string(), "23:30");
    }

    #[test]
    fn slot_crossing_midnight_fails() {
        assert_eq!(add_slot_duration(t("22:00")), Err(TimeError::SlotExceedsDayBoundary));
        assert_eq!(add_slot_duration(t("23:00")), Err(TimeError::SlotExceedsDayBoundary));
    }

    #[test]
    fn overlap_excludes_touching_boundaries() {
        assert!(!overlap("09:00", "11:00", "11:00", "13:00"));
        assert!(!overlap("11:00", "13:00", "09:00", "11:00"));
        assert!(overlap("09:00", "11:00", "10:59", "13:00"));
    }

    #[test]
    fn overlap_is_commutative_and_reflexive() {
        let windows = [("09:00", "11:00"), ("10:00", "12:00"), ("11:00", "13:00"), ("18:30", "20:30")];
        for (a0, a1) in windows {
            assert!(overlap(a0, a1, a0, a1), "{a0}-{a1} must overlap itself");
            for (b0, b1) in windows {
                assert_eq!(overlap(a0, a1, b0, b1), overlap(b0, b1, a0, a1));
            }
        }
    }

    #[test]
    fn overlap_containment() {
        assert!(overlap("09:00", "13:00", "10:00", "11:00"));
        assert!(overlap("10:00", "11:00", "09:00", "13:00"));
    }

    #[test]
    fn booking_time_accepts_half_hour_steps_in_hours() {
        let mut minutes = FIRST_BOOKING_MINUTE;
        while minutes <= LAST_BOOKING_MINUTE {
            let ct = ClockTime::from_minutes(minutes).unwrap();
            assert!(validate_booking_time(ct).is_ok(), "{ct} should be bookable");
            minutes += 30;
        }
    }

    #[test]
    fn booking_time_rejections() {
        assert!(matches!(validate_booking_time(t("08:30")), Err(TimeError::OutsideOperatingHours(_))));
        assert!(matches!(validate_booking_time(t("22:30")), Err(TimeError::OutsideOperatingHours(_))));
        assert!(matches!(validate_booking_time(t("19:15")), Err(TimeError::InvalidGranularity(_))));
    }

    #[test]
    fn booking_window_for_last_slot_fails() {
        assert!(booking_window(t("22:00")).is_err());
        let w = booking_window(t("21:30")).unwrap();
        assert_eq!(w.end.to_string(), "23:30");
    }

    #[test]
    fn date_parsing_strips_time() {
        let d = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        assert_eq!(parse_date("2026-03-14").unwrap(), d);
        assert_eq!(parse_date("2026-03-14T19:45:00").unwrap(), d);
        assert_eq!(parse_date("2026-03-14T08:00").unwrap(), d);
        assert_eq!(parse_date("2026-03-14T23:30:00+02:00").unwrap(), d);
        assert!(matches!(parse_date("14/03/2026"), Err(TimeError::InvalidDate(_))));
        assert!(parse_date("2026-02-30").is_err());
    }

    #[test]
    fn date_window() {
        let today = NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
        assert_eq!(validate_booking_date(today, today), Ok(today));

        let yesterday = today.pred_opt().unwrap();
        assert_eq!(validate_booking_date(yesterday, today), Err(TimeError::DateInPast(yesterday)));

        let last = today + chrono::Duration::days(BOOKING_HORIZON_DAYS);
        assert_eq!(validate_booking_date(last, today), Ok(last));

        let beyond = last.succ_opt().unwrap();
        assert_eq!(
            validate_booking_date(beyond, today),
            Err(TimeError::DateTooFarAhead(beyond))
        );
    }
}
