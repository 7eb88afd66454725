use serde::{Deserialize, Serialize};

/// A prompt from the other party followed by the primary sender's response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingPair {
    pub prompt: String,
    pub response: String,
    /// Label of the responding (primary) sender, usually their first name.
    pub target: String,
}
