pub mod client;
pub mod sse;
pub mod strip;
pub mod turn;

pub use client::{AgentClient, AgentSettings};
pub use strip::{strip_annotations, StripOutcome};
pub use turn::{run_turn, rollback_turn, DebugLog, RemoteError, SlotContent, TurnOutcome, TurnUpdate};
