use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of a room document.
///
/// States only ever move forward (`waiting` → `starting` → `playing` →
/// `scoring` → `finished`); the one implicit teardown is document deletion,
/// which can happen from any state when the last human leaves.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RoomState {
    /// Seats are open; matchmaking or invite joins are accepted.
    Waiting,
    /// Room is full (or was force-filled); round starts after a short delay.
    Starting,
    /// A question is live and answers are being collected.
    Playing,
    /// Answers are being paired and scored.
    Scoring,
    /// Scores committed; the room lingers briefly before deletion.
    Finished,
}

impl RoomState {
    /// Whether the room can still accept joins.
    pub fn accepts_joins(self) -> bool {
        self == RoomState::Waiting
    }

    /// Whether the state machine has reached its terminal state.
    pub fn is_terminal(self) -> bool {
        self == RoomState::Finished
    }
}

/// Events that drive a room through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomEvent {
    /// A join filled the last open seat.
    SeatsFilled,
    /// The matchmaking search window elapsed; empty seats get synthetic players.
    SearchTimedOut,
    /// The owner of a private room started the game explicitly.
    OwnerStarted,
    /// The pre-round countdown elapsed.
    CountdownElapsed,
    /// Every human player has a recorded answer past the minimum dwell time.
    AllHumansAnswered,
    /// The hard round deadline fired.
    DeadlineReached,
    /// Round scores were computed and recorded.
    ScoresCommitted,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The state the room was in when the invalid event was received.
    pub from: RoomState,
    /// The event that cannot be applied from this state.
    pub event: RoomEvent,
}

/// Compute the state an event leads to, rejecting anything that would move
/// the machine backwards or sideways.
pub fn advance(from: RoomState, event: RoomEvent) -> Result<RoomState, InvalidTransition> {
    let next = match (from, event) {
        (RoomState::Waiting, RoomEvent::SeatsFilled)
        | (RoomState::Waiting, RoomEvent::SearchTimedOut)
        | (RoomState::Waiting, RoomEvent::OwnerStarted) => RoomState::Starting,
        (RoomState::Starting, RoomEvent::CountdownElapsed) => RoomState::Playing,
        (RoomState::Playing, RoomEvent::AllHumansAnswered)
        | (RoomState::Playing, RoomEvent::DeadlineReached) => RoomState::Scoring,
        (RoomState::Scoring, RoomEvent::ScoresCommitted) => RoomState::Finished,
        (from, event) => return Err(InvalidTransition { from, event }),
    };
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_happy_path_through_round() {
        let mut state = RoomState::Waiting;
        for event in [
            RoomEvent::SeatsFilled,
            RoomEvent::CountdownElapsed,
            RoomEvent::AllHumansAnswered,
            RoomEvent::ScoresCommitted,
        ] {
            state = advance(state, event).unwrap();
        }
        assert_eq!(state, RoomState::Finished);
        assert!(state.is_terminal());
    }

    #[test]
    fn every_waiting_trigger_reaches_starting() {
        for event in [
            RoomEvent::SeatsFilled,
            RoomEvent::SearchTimedOut,
            RoomEvent::OwnerStarted,
        ] {
            assert_eq!(advance(RoomState::Waiting, event), Ok(RoomState::Starting));
        }
    }

    #[test]
    fn deadline_and_completion_both_reach_scoring() {
        assert_eq!(
            advance(RoomState::Playing, RoomEvent::DeadlineReached),
            Ok(RoomState::Scoring)
        );
        assert_eq!(
            advance(RoomState::Playing, RoomEvent::AllHumansAnswered),
            Ok(RoomState::Scoring)
        );
    }

    #[test]
    fn transitions_never_move_backwards() {
        let states = [
            RoomState::Waiting,
            RoomState::Starting,
            RoomState::Playing,
            RoomState::Scoring,
            RoomState::Finished,
        ];
        let events = [
            RoomEvent::SeatsFilled,
            RoomEvent::SearchTimedOut,
            RoomEvent::OwnerStarted,
            RoomEvent::CountdownElapsed,
            RoomEvent::AllHumansAnswered,
            RoomEvent::DeadlineReached,
            RoomEvent::ScoresCommitted,
        ];
        for from in states {
            for event in events {
                if let Ok(next) = advance(from, event) {
                    assert!(next > from, "{event:?} regressed {from:?} to {next:?}");
                }
            }
        }
    }

    #[test]
    fn invalid_transition_reports_context() {
        let err = advance(RoomState::Finished, RoomEvent::SeatsFilled).unwrap_err();
        assert_eq!(err.from, RoomState::Finished);
        assert_eq!(err.event, RoomEvent::SeatsFilled);
    }
}
