//! Round score computation: pair each team's answers through the similarity
//! engine and fold the points into the running totals.

use indexmap::IndexMap;

use crate::{
    dao::models::{RoomEntity, RoundResultEntity, TEAM_CAPACITY, TeamRoundResultEntity},
    similarity,
};

/// Points scale applied to the raw similarity.
const POINTS_PER_ROUND: f64 = 100.0;

/// Computed outcome of one round, ready to be committed to the document.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundOutcome {
    /// Result entry to append to the room's history.
    pub result: RoundResultEntity,
    /// Updated running totals keyed by team id.
    pub scores: IndexMap<String, i64>,
}

/// Score every team of the room for the current round.
///
/// Teams with fewer than [`TEAM_CAPACITY`] members score zero; everyone else
/// scores `round(similarity × 100)` over their first two members' answers,
/// with a missing answer treated as empty text.
pub fn score_round(room: &RoomEntity) -> RoundOutcome {
    let mut team_results = IndexMap::new();
    let mut scores = room.scores.clone();

    for team in &room.teams {
        let answers: IndexMap<String, String> = team
            .player_ids
            .iter()
            .filter_map(|id| {
                room.answers
                    .get(id)
                    .map(|answer| (id.clone(), answer.clone()))
            })
            .collect();
        let player_names: IndexMap<String, String> = team
            .player_ids
            .iter()
            .filter_map(|id| {
                room.player(id)
                    .map(|player| (id.clone(), player.username.clone()))
            })
            .collect();

        let (similarity_value, points) = if team.player_ids.len() >= TEAM_CAPACITY {
            let answer_of = |player_id: &String| {
                room.answers
                    .get(player_id)
                    .map(String::as_str)
                    .unwrap_or_default()
            };
            let value = similarity::score(answer_of(&team.player_ids[0]), answer_of(&team.player_ids[1]));
            (value, (value * POINTS_PER_ROUND).round() as i64)
        } else {
            (0.0, 0)
        };

        *scores.entry(team.id.clone()).or_insert(0) += points;
        team_results.insert(
            team.id.clone(),
            TeamRoundResultEntity {
                score: points,
                similarity: similarity_value,
                answers,
                player_names,
            },
        );
    }

    RoundOutcome {
        result: RoundResultEntity {
            round_number: room.round_number,
            question_text: room
                .current_question
                .as_ref()
                .map(|question| question.text.clone())
                .unwrap_or_default(),
            team_results,
        },
        scores,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::models::RoomMode,
        services::matchmaking::{new_room, seat_player, unseat_player},
    };

    fn playing_room() -> RoomEntity {
        let mut room = new_room(RoomMode::AutoMatch, None);
        for id in ["h1", "h2", "b1", "b2"] {
            seat_player(&mut room, id, id, id.starts_with('b'), None).unwrap();
        }
        room
    }

    fn record_answer(room: &mut RoomEntity, player_id: &str, answer: &str) {
        room.answers.insert(player_id.into(), answer.into());
        room.has_answered.insert(player_id.into(), true);
    }

    #[test]
    fn identical_pair_scores_full_points() {
        let mut room = playing_room();
        // seating alternates teams: h1/b1 on the first team, h2/b2 on the second
        record_answer(&mut room, "h1", "ekmek");
        record_answer(&mut room, "b1", "ekmek");
        record_answer(&mut room, "h2", "elma");
        record_answer(&mut room, "b2", "muz");

        let outcome = score_round(&room);
        let first_team = room.teams[0].id.clone();
        let second_team = room.teams[1].id.clone();
        assert_eq!(outcome.scores[&first_team], 100);
        assert_eq!(outcome.scores[&second_team], 50);
        assert_eq!(outcome.result.team_results[&first_team].similarity, 1.0);
    }

    #[test]
    fn each_team_scores_from_its_own_answers() {
        let mut room = playing_room();
        record_answer(&mut room, "h1", "kedi");
        record_answer(&mut room, "b1", "köpek");
        record_answer(&mut room, "h2", "portakal");
        record_answer(&mut room, "b2", "sinema");

        let outcome = score_round(&room);
        let first_team = room.teams[0].id.clone();
        let second_team = room.teams[1].id.clone();
        // kedi/köpek share the animal bucket; portakal/sinema share nothing.
        assert_eq!(outcome.scores[&first_team], 50);
        assert_eq!(outcome.scores[&second_team], 0);
    }

    #[test]
    fn lone_member_team_scores_zero() {
        let mut room = playing_room();
        unseat_player(&mut room, "b2");
        record_answer(&mut room, "h1", "su");
        record_answer(&mut room, "b1", "ayran");
        record_answer(&mut room, "h2", "mavi");

        let outcome = score_round(&room);
        let second_team = room.teams[1].id.clone();
        assert_eq!(outcome.scores[&second_team], 0);
        assert_eq!(outcome.result.team_results[&second_team].score, 0);
    }

    #[test]
    fn missing_answer_counts_as_empty_text() {
        let mut room = playing_room();
        record_answer(&mut room, "h1", "su");

        let outcome = score_round(&room);
        let first_team = room.teams[0].id.clone();
        assert_eq!(outcome.scores[&first_team], 0);
        assert_eq!(outcome.result.team_results[&first_team].similarity, 0.0);
    }

    #[test]
    fn points_accumulate_onto_existing_scores() {
        let mut room = playing_room();
        let first_team = room.teams[0].id.clone();
        room.scores.insert(first_team.clone(), 40);
        record_answer(&mut room, "h1", "su");
        record_answer(&mut room, "b1", "su");

        let outcome = score_round(&room);
        assert_eq!(outcome.scores[&first_team], 140);
    }

    #[test]
    fn result_captures_names_and_raw_answers() {
        let mut room = playing_room();
        record_answer(&mut room, "h1", "istanbul");
        record_answer(&mut room, "b1", "ankara");

        let outcome = score_round(&room);
        let first_team = room.teams[0].id.clone();
        let team_result = &outcome.result.team_results[&first_team];
        assert_eq!(team_result.answers["h1"], "istanbul");
        assert_eq!(team_result.player_names["b1"], "b1");
        assert_eq!(outcome.result.round_number, 1);
    }
}
