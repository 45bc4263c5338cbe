pub mod pacing;
pub mod session;
pub mod sse;

pub use pacing::{ CharacterQueue, PacingConfig, PacingTimer };
pub use session::{ SessionOutcome, StreamingMessageSession };
pub use sse::SseDecoder;
