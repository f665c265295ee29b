//! Conversational retrieval: sessions and turns

mod pipeline;
mod session;

pub use pipeline::{ChatPipeline, TurnEvent, TurnOutcome, TurnRequest};
pub use session::{ChatSession, SessionHandle, SessionRegistry, TurnPhase};
