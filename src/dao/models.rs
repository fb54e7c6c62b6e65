use std::time::SystemTime;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::state::state_machine::RoomState;

/// Maximum number of seats in a room.
pub const ROOM_CAPACITY: usize = 4;
/// Number of players a team must hold for pair scoring to apply.
pub const TEAM_CAPACITY: usize = 2;

/// How a room was opened and who may join it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoomMode {
    /// Publicly matchable room filled by the matchmaking pool.
    AutoMatch,
    /// Invite-code room started explicitly by its owner.
    Private,
}

/// Kind of answer a question expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnswerKind {
    /// Free-form text answer.
    FreeText,
    /// Numeric answer.
    Numeric,
    /// Time-of-day answer.
    TimeOfDay,
}

/// Gameplay variant a question belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoundKind {
    /// Both teammates try to give the same answer to one shared question.
    SharedGuess,
}

/// Seat occupied by a human or synthetic player.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEntity {
    /// Stable identifier (issued by the identity provider, or generated for bots).
    pub id: String,
    /// Display name.
    pub username: String,
    /// Team this player is seated on.
    pub team_id: String,
    /// Whether the controller created this player to fill an empty seat.
    pub is_synthetic: bool,
    /// When the player joined the room.
    pub joined_at: Option<SystemTime>,
}

/// One of the two teams competing in a room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamEntity {
    /// Stable identifier for the team.
    pub id: String,
    /// Display name chosen for the team.
    pub name: String,
    /// Ordered member ids, disjoint from the other team.
    pub player_ids: Vec<String>,
    /// Display color, irrelevant to scoring.
    pub color: String,
}

/// Question presented to every player of a room for one round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionEntity {
    /// Stable identifier for the question.
    pub id: String,
    /// Question text shown to players.
    pub text: String,
    /// Optional category hint used by the answer oracle.
    pub category: Option<String>,
    /// Kind of answer the question expects.
    pub answer_kind: AnswerKind,
    /// Gameplay variant the question is tagged for.
    pub round_kind: RoundKind,
    /// Seconds players have to answer.
    pub time_limit_secs: u32,
}

/// Outcome of one round for a single team.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeamRoundResultEntity {
    /// Points awarded to the team for this round.
    pub score: i64,
    /// Raw similarity of the paired answers, in `[0, 1]`.
    pub similarity: f64,
    /// Submitted answers keyed by player id.
    pub answers: IndexMap<String, String>,
    /// Display names keyed by player id, captured at scoring time.
    pub player_names: IndexMap<String, String>,
}

/// Outcome of one completed round, appended once per round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundResultEntity {
    /// Round this result belongs to.
    pub round_number: u32,
    /// Question text, captured so results survive pool edits.
    pub question_text: String,
    /// Per-team outcome keyed by team id.
    pub team_results: IndexMap<String, TeamRoundResultEntity>,
}

/// Room document persisted by the storage layer; the unit of a game session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomEntity {
    /// Opaque room identifier; generated for auto-match rooms, caller-chosen
    /// (case-sensitive invite code) for private rooms.
    pub id: String,
    /// How the room was opened.
    pub mode: RoomMode,
    /// User allowed to start the room; `None` for auto-matched rooms.
    pub owner_id: Option<String>,
    /// Seated players, unique by id, at most [`ROOM_CAPACITY`].
    pub players: Vec<PlayerEntity>,
    /// The two competing teams.
    pub teams: Vec<TeamEntity>,
    /// Lifecycle state; transitions are monotonic.
    pub state: RoomState,
    /// Current round, starting at 1.
    pub round_number: u32,
    /// Accumulated points keyed by team id.
    pub scores: IndexMap<String, i64>,
    /// Question in play; present only while the room is `playing`.
    pub current_question: Option<QuestionEntity>,
    /// Submitted answers keyed by player id, cleared at round start.
    pub answers: IndexMap<String, String>,
    /// Mirror of `answers` keys for fast completion checks.
    pub has_answered: IndexMap<String, bool>,
    /// Append-only results, one entry per completed round.
    pub round_results: Vec<RoundResultEntity>,
    /// When the room document was created.
    pub created_at: SystemTime,
    /// When the current round started, stamped at round start.
    pub started_at: Option<SystemTime>,
}

impl RoomEntity {
    /// Whether every seat is taken.
    pub fn is_full(&self) -> bool {
        self.players.len() >= ROOM_CAPACITY
    }

    /// Look up a seated player by id.
    pub fn player(&self, player_id: &str) -> Option<&PlayerEntity> {
        self.players.iter().find(|player| player.id == player_id)
    }

    /// Whether the given user currently occupies a seat.
    pub fn has_player(&self, player_id: &str) -> bool {
        self.player(player_id).is_some()
    }

    /// Iterate over the human (non-synthetic) players.
    pub fn humans(&self) -> impl Iterator<Item = &PlayerEntity> {
        self.players.iter().filter(|player| !player.is_synthetic)
    }

    /// Look up a team by id.
    pub fn team(&self, team_id: &str) -> Option<&TeamEntity> {
        self.teams.iter().find(|team| team.id == team_id)
    }

    /// Every human player has a recorded answer (vacuously false with no humans).
    pub fn all_humans_answered(&self) -> bool {
        let mut humans = self.humans().peekable();
        if humans.peek().is_none() {
            return false;
        }
        humans.all(|player| {
            self.has_answered
                .get(&player.id)
                .copied()
                .unwrap_or_default()
        })
    }
}

/// Partial update replacing whole fields of a room document with
/// locally-composed new values.
#[derive(Debug, Clone, Default)]
pub struct RoomPatch {
    /// Replacement players list.
    pub players: Option<Vec<PlayerEntity>>,
    /// Replacement teams list.
    pub teams: Option<Vec<TeamEntity>>,
    /// Replacement lifecycle state.
    pub state: Option<RoomState>,
    /// Replacement score map.
    pub scores: Option<IndexMap<String, i64>>,
    /// Replacement current question (`Some(None)` clears it).
    pub current_question: Option<Option<QuestionEntity>>,
    /// Replacement answers map.
    pub answers: Option<IndexMap<String, String>>,
    /// Replacement answered-flags map.
    pub has_answered: Option<IndexMap<String, bool>>,
    /// Replacement round results list.
    pub round_results: Option<Vec<RoundResultEntity>>,
    /// Replacement round-start timestamp.
    pub started_at: Option<SystemTime>,
}

impl RoomPatch {
    /// Fold the patch into an existing document, field by field.
    pub fn apply(self, room: &mut RoomEntity) {
        if let Some(players) = self.players {
            room.players = players;
        }
        if let Some(teams) = self.teams {
            room.teams = teams;
        }
        if let Some(state) = self.state {
            room.state = state;
        }
        if let Some(scores) = self.scores {
            room.scores = scores;
        }
        if let Some(current_question) = self.current_question {
            room.current_question = current_question;
        }
        if let Some(answers) = self.answers {
            room.answers = answers;
        }
        if let Some(has_answered) = self.has_answered {
            room.has_answered = has_answered;
        }
        if let Some(round_results) = self.round_results {
            room.round_results = round_results;
        }
        if let Some(started_at) = self.started_at {
            room.started_at = Some(started_at);
        }
    }
}

/// Field-equality filter understood by [`crate::dao::room_store::RoomStore::query`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoomFilter {
    /// Match rooms opened in this mode.
    pub mode: Option<RoomMode>,
    /// Match rooms currently in this state.
    pub state: Option<RoomState>,
}

impl RoomFilter {
    /// Whether a room document satisfies every set field.
    pub fn matches(&self, room: &RoomEntity) -> bool {
        self.mode.is_none_or(|mode| room.mode == mode)
            && self.state.is_none_or(|state| room.state == state)
    }
}
