use serde::{Deserialize, Serialize};

use crate::log::model::Message;
use crate::nutrition::Estimate;

use super::ChatTurn;

#[derive(Debug, Deserialize)]
pub struct ChatTextRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub messages: Vec<Message>,
    /// An estimate is still running; a new message will be queued behind it.
    pub pending: bool,
}

#[derive(Debug, Serialize)]
pub struct ChatTurnResponse {
    pub estimate: Estimate,
    pub total_calories: u32,
    pub messages: Vec<Message>,
}

impl From<ChatTurn> for ChatTurnResponse {
    fn from(turn: ChatTurn) -> Self {
        Self {
            total_calories: turn.estimate.total_calories(),
            estimate: turn.estimate,
            messages: vec![turn.user_message, turn.reply],
        }
    }
}
