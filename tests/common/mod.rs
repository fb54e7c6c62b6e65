//! Shared fixtures for the lifecycle tests: an in-memory store, an offline
//! oracle, and a single-question pool so rounds are predictable.

use std::sync::Arc;

use common_mind_back::{
    AppConfig,
    dao::{
        models::{AnswerKind, QuestionEntity, RoundKind},
        room_store::{RoomStore, memory::MemoryRoomStore},
    },
    oracle::AnswerOracle,
    services::SessionFacade,
    state::UserIdentity,
};

pub fn test_store() -> Arc<MemoryRoomStore> {
    init_tracing();
    Arc::new(MemoryRoomStore::new())
}

/// Install a subscriber when `RUST_LOG` is set, so failing runs can be traced.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

pub fn test_config() -> Arc<AppConfig> {
    Arc::new(AppConfig::with_questions(vec![QuestionEntity {
        id: "q-icecek".into(),
        text: "En sevilen içecek nedir?".into(),
        category: Some("icecek".into()),
        answer_kind: AnswerKind::FreeText,
        round_kind: RoundKind::SharedGuess,
        time_limit_secs: 20,
    }]))
}

pub fn facade(store: Arc<dyn RoomStore>, user_id: &str) -> SessionFacade {
    SessionFacade::new(
        store,
        AnswerOracle::offline(),
        test_config(),
        UserIdentity::new(user_id, format!("oyuncu-{user_id}")),
    )
}
