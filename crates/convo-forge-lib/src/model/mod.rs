//! Data model shared by the ingestion, aggregation and pair-derivation stages.

pub mod conversation_turn;
pub mod message;
pub mod raw_message;
pub mod training_pair;
