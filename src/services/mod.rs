/// Matchmaking, seat assignment, and invite-code room management.
pub mod matchmaking;
/// Room lifecycle controller: timers, bot backfill, and score commits.
pub mod room_controller;
/// Round score computation over paired answers.
pub mod scoring;
/// The session surface exposed to the UI layer.
pub mod session_facade;

pub use room_controller::SearchStatus;
pub use session_facade::SessionFacade;
