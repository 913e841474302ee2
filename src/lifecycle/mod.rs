//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Capture working directory → Create output directory → Acquire listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Remove socket file → Drain → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then storage, then the listener
//! - Ordered shutdown: stop accept, close listener, drain
//! - Draining has a deadline; connections still open after it are abandoned

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::spawn_signal_listener;
pub use startup::{prepare, Prepared, StartupError};
