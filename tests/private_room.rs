//! Invite-code room flows: create/join/start, pool absorption, and the
//! post-finish cleanup delay.

mod common;

use std::time::Duration;

use common_mind_back::{
    dao::{
        models::{RoomFilter, RoomMode},
        room_store::RoomStore,
    },
    services::matchmaking,
    state::{RoomState, UserIdentity},
};
use tokio::time::sleep;

use common::{facade, test_store};

#[tokio::test(start_paused = true)]
async fn owner_runs_a_full_private_game() {
    let store = test_store();
    let owner = facade(store.clone(), "owner");
    let guest = facade(store.clone(), "guest");

    let code = owner.create_private_room().await.unwrap();
    assert!(guest.join_private_room(&code).await.unwrap());

    let waiting = store.find(&code).await.unwrap().unwrap();
    assert_eq!(waiting.mode, RoomMode::Private);
    assert_eq!(waiting.owner_id.as_deref(), Some("owner"));
    assert_eq!(waiting.state, RoomState::Waiting);
    assert_eq!(waiting.players.len(), 2);

    // Guests cannot start the game.
    assert!(guest.start_private_room(&code).await.is_err());
    assert_eq!(
        store.find(&code).await.unwrap().unwrap().state,
        RoomState::Waiting
    );

    owner.start_private_room(&code).await.unwrap();
    let starting = store.find(&code).await.unwrap().unwrap();
    assert_eq!(starting.state, RoomState::Starting);
    assert_eq!(starting.players.len(), 4);
    assert_eq!(
        starting.players.iter().filter(|p| p.is_synthetic).count(),
        2
    );

    sleep(Duration::from_secs(4)).await;
    assert_eq!(
        store.find(&code).await.unwrap().unwrap().state,
        RoomState::Playing
    );

    // Serve the dwell, then answer.
    sleep(Duration::from_secs(11)).await;
    owner.submit_answer("çay").await.unwrap();
    guest.submit_answer("kahve").await.unwrap();
    sleep(Duration::from_secs(1)).await;

    let finished = store.find(&code).await.unwrap().unwrap();
    assert_eq!(finished.state, RoomState::Finished);
    assert_eq!(finished.round_results.len(), 1);

    // Private rooms are deleted a fixed delay after finishing.
    sleep(Duration::from_secs(5 * 60 + 1)).await;
    assert!(store.find(&code).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn joining_an_unknown_or_started_room_returns_false() {
    let store = test_store();
    let owner = facade(store.clone(), "owner");
    let guest = facade(store.clone(), "guest");

    assert!(!guest.join_private_room("YOKYOK").await.unwrap());

    let code = owner.create_private_room().await.unwrap();
    owner.start_private_room(&code).await.unwrap();
    assert!(!guest.join_private_room(&code).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn starting_absorbs_waiting_humans_from_the_public_pool() {
    let store = test_store();
    let owner = facade(store.clone(), "owner");

    // A human is parked in public matchmaking.
    let waiting_user = UserIdentity::new("cem", "oyuncu-cem");
    let pool_room = matchmaking::find_or_create_auto_room(store.as_ref(), &waiting_user)
        .await
        .unwrap();

    let code = owner.create_private_room().await.unwrap();
    owner.start_private_room(&code).await.unwrap();

    let started = store.find(&code).await.unwrap().unwrap();
    assert_eq!(started.state, RoomState::Starting);
    assert!(started.has_player("cem"));
    // Two seats were taken by humans; the rest were filled synthetically.
    assert_eq!(
        started.players.iter().filter(|p| p.is_synthetic).count(),
        2
    );

    // The emptied pool room is gone, and no waiting public room remains.
    assert!(store.find(&pool_room).await.unwrap().is_none());
    let leftovers = store
        .query(RoomFilter {
            mode: Some(RoomMode::AutoMatch),
            state: Some(RoomState::Waiting),
        })
        .await
        .unwrap();
    assert!(leftovers.is_empty());
}
