//! Conversational meal review: the user describes or photographs a meal,
//! gets an estimate back, and confirms it through `POST /meals`.

mod dto;
pub mod handlers;
pub mod session;

pub use handlers::router;
pub use session::{ChatSessions, ChatTurn};
