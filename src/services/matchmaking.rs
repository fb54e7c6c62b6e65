//! Matchmaking and seat assignment: find-or-create for the public pool,
//! invite codes for private rooms, and the team-balance rules every new
//! participant goes through.

use std::time::SystemTime;

use indexmap::IndexMap;
use rand::seq::IndexedRandom;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{PlayerEntity, RoomEntity, RoomFilter, RoomMode, RoomPatch, TeamEntity},
        room_store::RoomStore,
        storage::StorageError,
    },
    error::ServiceError,
    state::{room::UserIdentity, state_machine::RoomState},
};

/// Length of generated invite codes.
const INVITE_CODE_LEN: usize = 6;
/// Invite-code alphabet, skipping lookalike characters.
const INVITE_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
/// Attempts at generating a free invite code before giving up.
const INVITE_CODE_ATTEMPTS: usize = 4;

/// Display names cycled through for synthetic players.
const BOT_NAMES: &[&str] = &["Aylin", "Mert", "Zeynep", "Emre", "Elif", "Kaan"];

/// Compose a fresh waiting room with two empty teams.
pub fn new_room(mode: RoomMode, owner_id: Option<String>) -> RoomEntity {
    let teams = vec![
        TeamEntity {
            id: Uuid::new_v4().simple().to_string(),
            name: "Takım A".into(),
            player_ids: Vec::new(),
            color: "#F97316".into(),
        },
        TeamEntity {
            id: Uuid::new_v4().simple().to_string(),
            name: "Takım B".into(),
            player_ids: Vec::new(),
            color: "#8B5CF6".into(),
        },
    ];
    let scores = teams
        .iter()
        .map(|team| (team.id.clone(), 0))
        .collect::<IndexMap<_, _>>();

    RoomEntity {
        id: String::new(),
        mode,
        owner_id,
        players: Vec::new(),
        teams,
        state: RoomState::Waiting,
        round_number: 1,
        scores,
        current_question: None,
        answers: IndexMap::new(),
        has_answered: IndexMap::new(),
        round_results: Vec::new(),
        created_at: SystemTime::now(),
        started_at: None,
    }
}

/// Team to seat the next participant on: strictly fewer members wins, ties
/// favor the first team.
pub fn balanced_team_id(room: &RoomEntity) -> Option<String> {
    let first = room.teams.first()?;
    let best = room
        .teams
        .iter()
        .skip(1)
        .fold(first, |best, team| {
            if team.player_ids.len() < best.player_ids.len() {
                team
            } else {
                best
            }
        });
    Some(best.id.clone())
}

/// Team with zero members, used for the first synthetic player of a timeout
/// backfill so a lone human never faces an all-empty opponent side.
pub fn team_with_no_members(room: &RoomEntity) -> Option<String> {
    room.teams
        .iter()
        .find(|team| team.player_ids.is_empty())
        .map(|team| team.id.clone())
}

/// Seat a participant, applying the balance rule unless a team is forced.
pub fn seat_player(
    room: &mut RoomEntity,
    id: &str,
    username: &str,
    is_synthetic: bool,
    forced_team_id: Option<String>,
) -> Result<(), ServiceError> {
    if room.is_full() {
        return Err(ServiceError::InvalidState(format!(
            "room `{}` is already full",
            room.id
        )));
    }
    if room.has_player(id) {
        return Err(ServiceError::InvalidState(format!(
            "player `{id}` is already seated"
        )));
    }

    let team_id = forced_team_id
        .or_else(|| balanced_team_id(room))
        .ok_or_else(|| ServiceError::InvalidState("room has no teams".into()))?;
    let team = room
        .teams
        .iter_mut()
        .find(|team| team.id == team_id)
        .ok_or_else(|| ServiceError::InvalidState(format!("unknown team `{team_id}`")))?;

    team.player_ids.push(id.to_string());
    room.players.push(PlayerEntity {
        id: id.to_string(),
        username: username.to_string(),
        team_id,
        is_synthetic,
        joined_at: Some(SystemTime::now()),
    });
    Ok(())
}

/// Remove a participant from the seat list and their team.
pub fn unseat_player(room: &mut RoomEntity, player_id: &str) {
    room.players.retain(|player| player.id != player_id);
    for team in &mut room.teams {
        team.player_ids.retain(|id| id != player_id);
    }
}

/// Fresh identity for a synthetic player.
pub fn synthetic_identity(index: usize) -> (String, String) {
    let id = format!("bot-{}", Uuid::new_v4().simple());
    let name = BOT_NAMES[index % BOT_NAMES.len()].to_string();
    (id, name)
}

/// Generate a human-typable, case-sensitive invite code.
pub fn generate_invite_code() -> String {
    let mut rng = rand::rng();
    (0..INVITE_CODE_LEN)
        .filter_map(|_| INVITE_CODE_ALPHABET.choose(&mut rng))
        .map(|byte| *byte as char)
        .collect()
}

/// Join an open auto-match room with a free seat, or open a new one.
///
/// Every candidate is re-fetched immediately before the seating write; a
/// candidate deleted or filled in between is skipped.
pub async fn find_or_create_auto_room(
    store: &dyn RoomStore,
    user: &UserIdentity,
) -> Result<String, ServiceError> {
    let candidates = store
        .query(RoomFilter {
            mode: Some(RoomMode::AutoMatch),
            state: Some(RoomState::Waiting),
        })
        .await?;

    for candidate in candidates {
        if candidate.has_player(&user.id) {
            info!(room_id = %candidate.id, "user already seated; resuming room");
            return Ok(candidate.id);
        }
        if candidate.is_full() {
            continue;
        }

        let Some(mut room) = store.find(&candidate.id).await? else {
            continue;
        };
        if !room.state.accepts_joins() || room.is_full() || room.has_player(&user.id) {
            continue;
        }

        seat_player(&mut room, &user.id, &user.username, false, None)?;
        match store
            .update(
                &room.id,
                RoomPatch {
                    players: Some(room.players.clone()),
                    teams: Some(room.teams.clone()),
                    ..RoomPatch::default()
                },
            )
            .await
        {
            Ok(()) => {
                info!(room_id = %room.id, user_id = %user.id, "joined waiting room");
                return Ok(room.id);
            }
            Err(StorageError::NotFound { .. }) => continue,
            Err(err) => return Err(err.into()),
        }
    }

    let mut room = new_room(RoomMode::AutoMatch, None);
    seat_player(&mut room, &user.id, &user.username, false, None)?;
    let id = store.create_auto(room).await?;
    info!(room_id = %id, user_id = %user.id, "opened new matchmaking room");
    Ok(id)
}

/// Open a private room under a fresh invite code, with the owner seated.
pub async fn create_private_room(
    store: &dyn RoomStore,
    owner: &UserIdentity,
) -> Result<String, ServiceError> {
    for _ in 0..INVITE_CODE_ATTEMPTS {
        let code = generate_invite_code();
        let mut room = new_room(RoomMode::Private, Some(owner.id.clone()));
        seat_player(&mut room, &owner.id, &owner.username, false, None)?;
        match store.create_with_id(code.clone(), room).await {
            Ok(()) => {
                info!(room_id = %code, owner_id = %owner.id, "opened private room");
                return Ok(code);
            }
            Err(StorageError::AlreadyExists { .. }) => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Err(ServiceError::InvalidState(
        "could not allocate a free invite code".into(),
    ))
}

/// Pull waiting humans out of the public matchmaking pool into a private
/// room that is about to start, until its seats run out.
pub async fn absorb_waiting_humans(
    store: &dyn RoomStore,
    room_id: &str,
) -> Result<(), ServiceError> {
    let pool = store
        .query(RoomFilter {
            mode: Some(RoomMode::AutoMatch),
            state: Some(RoomState::Waiting),
        })
        .await?;

    for source in pool {
        let Some(target) = store.find(room_id).await? else {
            return Err(ServiceError::NotFound(format!("room `{room_id}`")));
        };
        if target.is_full() {
            break;
        }
        let open_seats = crate::dao::models::ROOM_CAPACITY - target.players.len();

        let Some(mut source_room) = store.find(&source.id).await? else {
            continue;
        };
        if source_room.state != RoomState::Waiting {
            continue;
        }

        let movable: Vec<PlayerEntity> = source_room
            .humans()
            .filter(|player| !target.has_player(&player.id))
            .take(open_seats)
            .cloned()
            .collect();
        if movable.is_empty() {
            continue;
        }

        let mut target = target;
        for player in &movable {
            seat_player(&mut target, &player.id, &player.username, false, None)?;
            unseat_player(&mut source_room, &player.id);
        }

        store
            .update(
                room_id,
                RoomPatch {
                    players: Some(target.players.clone()),
                    teams: Some(target.teams.clone()),
                    ..RoomPatch::default()
                },
            )
            .await?;

        if source_room.players.is_empty() {
            store.delete(&source_room.id).await?;
        } else if let Err(err) = store
            .update(
                &source_room.id,
                RoomPatch {
                    players: Some(source_room.players.clone()),
                    teams: Some(source_room.teams.clone()),
                    ..RoomPatch::default()
                },
            )
            .await
        {
            warn!(room_id = %source_room.id, error = %err, "failed to shrink absorbed pool room");
        }

        info!(
            room_id = %room_id,
            absorbed = movable.len(),
            from = %source_room.id,
            "absorbed waiting players into private room"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room_with(players: &[(&str, usize)]) -> RoomEntity {
        // players: (id, team index)
        let mut room = new_room(RoomMode::AutoMatch, None);
        for (id, team_index) in players {
            let team_id = room.teams[*team_index].id.clone();
            seat_player(&mut room, id, id, false, Some(team_id)).unwrap();
        }
        room
    }

    #[test]
    fn balance_prefers_strictly_smaller_team() {
        let room = room_with(&[("a", 0)]);
        assert_eq!(balanced_team_id(&room), Some(room.teams[1].id.clone()));
    }

    #[test]
    fn balance_tie_favors_first_team() {
        let room = room_with(&[("a", 0), ("b", 1)]);
        assert_eq!(balanced_team_id(&room), Some(room.teams[0].id.clone()));
    }

    #[test]
    fn team_sizes_never_diverge_by_more_than_one() {
        let mut room = new_room(RoomMode::AutoMatch, None);
        for id in ["a", "b", "c", "d"] {
            seat_player(&mut room, id, id, false, None).unwrap();
            let first = room.teams[0].player_ids.len() as i64;
            let second = room.teams[1].player_ids.len() as i64;
            assert!((first - second).abs() <= 1);
        }
        assert!(room.is_full());
    }

    #[test]
    fn seat_rejects_duplicates_and_overflow() {
        let mut room = room_with(&[("a", 0), ("b", 1), ("c", 0), ("d", 1)]);
        assert!(matches!(
            seat_player(&mut room, "e", "e", false, None),
            Err(ServiceError::InvalidState(_))
        ));
        let mut partial = room_with(&[("a", 0)]);
        assert!(matches!(
            seat_player(&mut partial, "a", "a", false, None),
            Err(ServiceError::InvalidState(_))
        ));
    }

    #[test]
    fn unseat_removes_player_from_both_structures() {
        let mut room = room_with(&[("a", 0), ("b", 1)]);
        unseat_player(&mut room, "a");
        assert!(!room.has_player("a"));
        assert!(room.teams.iter().all(|team| !team.player_ids.contains(&"a".into())));
        assert!(room.has_player("b"));
    }

    #[test]
    fn invite_codes_are_typable() {
        let code = generate_invite_code();
        assert_eq!(code.len(), INVITE_CODE_LEN);
        assert!(code.bytes().all(|byte| INVITE_CODE_ALPHABET.contains(&byte)));
    }
}
