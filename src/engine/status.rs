use crate::model::ReservationStatus::{self, *};

use super::EngineError;

/// Legal next states. Terminal states have none.
pub fn allowed_transitions(from: ReservationStatus) -> &'static [ReservationStatus] {
    match from {
        Pending => &[Confirmed, Cancelled],
        Confirmed => &[Completed, Cancelled],
        Cancelled | Completed => &[],
    }
}

pub fn check_transition(from: ReservationStatus, to: ReservationStatus) -> Result<(), EngineError> {
    if from.is_terminal() {
        return Err(EngineError::Terminal(from));
    }
    if !allowed_transitions(from).contains(&to) {
        return Err(EngineError::InvalidTransition { from, to });
    }
    Ok(())
}
