pub mod compose;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gemini;
pub mod session;
pub mod synthesize;
pub mod transport;
pub mod verify;

#[cfg(test)]
mod testing;

pub use compose::{draft_prompt, finalize_prompt, recompose};
pub use config::EngineConfig;
pub use dispatch::{classify_failure, generate_image, ImageBackend};
pub use error::{GenerationError, GenerationPhase, SessionError, TransportError};
pub use session::{ImageTicket, Session, SessionImage};
pub use synthesize::synthesize;
pub use transport::{GenerativeTransport, HttpTransport};
pub use verify::verify;
