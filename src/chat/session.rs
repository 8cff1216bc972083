use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::log::model::{Message, Role};
use crate::nutrition::{Estimate, EstimationError, Estimator, ImageInput};

/// Oldest messages are dropped past this many.
pub const MAX_MESSAGES: usize = 200;

pub const IMAGE_PLACEHOLDER: &str = "Analyzing food image...";

#[derive(Default)]
struct ChatSession {
    messages: Vec<Message>,
}

impl ChatSession {
    fn push(&mut self, message: Message) {
        self.messages.push(message);
        if self.messages.len() > MAX_MESSAGES {
            let excess = self.messages.len() - MAX_MESSAGES;
            self.messages.drain(..excess);
        }
    }
}

/// Per-user slot: the transcript, plus a turn lock held for the whole
/// estimate so that one user's submissions run strictly in order.
#[derive(Default)]
struct Slot {
    session: Mutex<ChatSession>,
    turn: Mutex<()>,
}

/// Result of one chat turn.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub estimate: Estimate,
    pub user_message: Message,
    pub reply: Message,
}

/// In-memory chat transcripts, one per user.
pub struct ChatSessions {
    estimator: Arc<Estimator>,
    slots: Mutex<HashMap<Uuid, Arc<Slot>>>,
}

impl ChatSessions {
    pub fn new(estimator: Arc<Estimator>) -> Self {
        Self {
            estimator,
            slots: Mutex::new(HashMap::new()),
        }
    }

    async fn slot(&self, user_id: Uuid) -> Arc<Slot> {
        self.slots.lock().await.entry(user_id).or_default().clone()
    }

    async fn existing_slot(&self, user_id: Uuid) -> Option<Arc<Slot>> {
        self.slots.lock().await.get(&user_id).cloned()
    }

    pub async fn messages(&self, user_id: Uuid) -> Vec<Message> {
        match self.existing_slot(user_id).await {
            Some(slot) => slot.session.lock().await.messages.clone(),
            None => Vec::new(),
        }
    }

    /// True while an estimate for this user is in flight.
    pub async fn is_busy(&self, user_id: Uuid) -> bool {
        match self.existing_slot(user_id).await {
            Some(slot) => slot.turn.try_lock().is_err(),
            None => false,
        }
    }

    /// Empties the transcript. A slot still in use by a turn is kept so
    /// later submissions queue behind that turn.
    pub async fn clear(&self, user_id: Uuid) {
        let mut slots = self.slots.lock().await;
        let Some(slot) = slots.get(&user_id) else {
            return;
        };
        if Arc::strong_count(slot) == 1 {
            slots.remove(&user_id);
        } else {
            slot.session.lock().await.messages.clear();
        }
        debug!(%user_id, "chat cleared");
    }

    #[instrument(skip(self, text))]
    pub async fn submit_text(&self, user_id: Uuid, text: &str) -> Result<ChatTurn, EstimationError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EstimationError::EmptyInput);
        }
        let slot = self.slot(user_id).await;
        let _turn = slot.turn.lock().await;
        let user_message = Message::new(Role::User, text);
        slot.session.lock().await.push(user_message.clone());

        let result = self.estimator.estimate_text(text).await;
        finish_turn(&slot, user_message, result).await
    }

    #[instrument(skip(self, image), fields(mime = %image.mime_type))]
    pub async fn submit_image(&self, user_id: Uuid, image: &ImageInput) -> Result<ChatTurn, EstimationError> {
        let slot = self.slot(user_id).await;
        let _turn = slot.turn.lock().await;
        let user_message = Message::new(Role::User, IMAGE_PLACEHOLDER);
        slot.session.lock().await.push(user_message.clone());

        let result = self.estimator.estimate_image(image).await;
        finish_turn(&slot, user_message, result).await
    }
}

async fn finish_turn(
    slot: &Slot,
    user_message: Message,
    result: Result<Estimate, EstimationError>,
) -> Result<ChatTurn, EstimationError> {
    let mut session = slot.session.lock().await;
    match result {
        Ok(estimate) => {
            let reply = Message::new(Role::Assistant, estimate.summary());
            session.push(reply.clone());
            Ok(ChatTurn {
                estimate,
                user_message,
                reply,
            })
        }
        Err(e) => {
            session.push(Message::new(Role::Assistant, failure_notice(&e)));
            Err(e)
        }
    }
}

fn failure_notice(e: &EstimationError) -> &'static str {
    match e {
        EstimationError::NoMatch => {
            "I couldn't recognize any foods in that. Try naming each food with an amount, like \"2 eggs and a banana\"."
        }
        EstimationError::MissingCredentials => "Photo analysis isn't available right now. Describe the meal in text instead.",
        EstimationError::InvalidImage(_) | EstimationError::EmptyInput => "I couldn't read that image. Please try another photo.",
        EstimationError::Malformed(_) => "I couldn't make sense of the nutrition estimate. Please try again.",
        EstimationError::Timeout | EstimationError::Transport(_) | EstimationError::Status { .. } => {
            "Sorry, the nutrition service is unavailable. Please try again in a moment."
        }
    }
}
