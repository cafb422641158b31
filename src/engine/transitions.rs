use crate::error::TrackingError;
use crate::models::status::DeliveryStatus;

/// Validates a requested status change against the delivery lifecycle.
/// Pure: side effects of entering a state (timestamps, acquisition
/// start/stop) belong to the orchestrator.
///
/// Statuses move forward only; `Cancelled` is reachable from every
/// non-terminal state, and both `Delivered` and `Cancelled` are dead ends.
pub fn transition(
    current: DeliveryStatus,
    requested: DeliveryStatus,
) -> Result<DeliveryStatus, TrackingError> {
    use DeliveryStatus::*;

    let allowed = matches!(
        (current, requested),
        (Pending, Preparing | OutForDelivery | Cancelled)
            | (Preparing, OutForDelivery | Cancelled)
            | (OutForDelivery, InTransit | Delivered | Cancelled)
            | (InTransit, Delivered | Cancelled)
    );

    if allowed {
        Ok(requested)
    } else {
        Err(TrackingError::InvalidTransition { current, requested })
    }
}

#[cfg(test)]
mod tests {
    use super::transition;
    use crate::error::TrackingError;
    use crate::models::status::DeliveryStatus::{self, *};

    const ALL: [DeliveryStatus; 6] = [
        Pending,
        Preparing,
        OutForDelivery,
        InTransit,
        Delivered,
        Cancelled,
    ];

    fn allowed_from(current: DeliveryStatus) -> Vec<DeliveryStatus> {
        match current {
            Pending => vec![Preparing, OutForDelivery, Cancelled],
            Preparing => vec![OutForDelivery, Cancelled],
            OutForDelivery => vec![InTransit, Delivered, Cancelled],
            InTransit => vec![Delivered, Cancelled],
            Delivered | Cancelled => vec![],
        }
    }

    #[test]
    fn every_pair_matches_the_edge_table() {
        for current in ALL {
            for requested in ALL {
                let result = transition(current, requested);
                if allowed_from(current).contains(&requested) {
                    assert_eq!(result.unwrap(), requested);
                } else {
                    match result {
                        Err(TrackingError::InvalidTransition {
                            current: got_current,
                            requested: got_requested,
                        }) => {
                            assert_eq!(got_current, current);
                            assert_eq!(got_requested, requested);
                        }
                        other => panic!("expected rejection for {current:?} -> {requested:?}, got {other:?}"),
                    }
                }
            }
        }
    }

    #[test]
    fn terminal_states_have_no_way_out() {
        for terminal in [Delivered, Cancelled] {
            for requested in ALL {
                assert!(transition(terminal, requested).is_err());
            }
        }
    }

    #[test]
    fn cancellation_is_reachable_from_every_active_state() {
        for current in [Pending, Preparing, OutForDelivery, InTransit] {
            assert_eq!(transition(current, Cancelled).unwrap(), Cancelled);
        }
    }

    #[test]
    fn skipping_preparation_is_allowed() {
        assert_eq!(transition(Pending, OutForDelivery).unwrap(), OutForDelivery);
    }
}
