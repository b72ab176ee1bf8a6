//! Xiaoyue Core
//!
//! Network-free building blocks of a tutoring session: the transcript and
//! agent-mood models, the JSON frame protocol, and the session store that the
//! client runtime mutates and renderers observe.

pub mod agent;
pub mod message;
pub mod protocol;
pub mod store;

pub use agent::{AgentState, Emotion, SulkingLevel};
pub use message::{Message, MessageId, MessageRole};
pub use protocol::{CorrectionDetail, FrameKind, InboundFrame, OutboundCommand, QuizItem, SuccessData};
pub use store::SessionStore;
