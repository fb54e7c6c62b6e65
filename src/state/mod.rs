//! Domain model and room lifecycle state machine.

pub mod room;
pub mod state_machine;

pub use room::{Player, Question, Room, RoundResult, Team, TeamRoundResult, UserIdentity};
pub use state_machine::{InvalidTransition, RoomEvent, RoomState, advance};
