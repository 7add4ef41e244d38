//! Memory layer: conversation history and per-session scratch state.

pub mod conversation;
pub mod session;

pub use conversation::{history_messages, ChatTurn, Message, Role};
pub use session::{ConversationFlow, RequestContext, SessionContext, SessionStore};
