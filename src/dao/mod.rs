/// Database model definitions.
pub mod models;
/// Room storage and change-subscription operations.
pub mod room_store;
/// Storage abstraction layer for database operations.
pub mod storage;
