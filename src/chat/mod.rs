//! Chat orchestration: the session loop, its I/O surface and observers.
//!
//! ```text
//! User line
//!   -> Transcript (User turn)
//!   -> CompletionClient.complete(snapshot, signatures, settings)
//!   -> CapabilityRegistry.invoke for each requested call (ToolResult turns)
//!   -> ... until a final answer
//!   -> ConversationIo.emit
//! ```

pub mod io;
pub mod observer;
pub mod session;

pub use io::{ConsoleIo, ConversationIo, ScriptedIo, Speaker};
pub use observer::{LogObserver, NoopObserver, SessionObserver};
pub use session::{ChatLoop, Emission, LoopSettings, LoopState, SessionError};
