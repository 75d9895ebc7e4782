//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (gateway.rs):
//!     Load config → Validate → Build integrations → Spawn background tasks
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Broadcast → Await sweeper, monitor and server
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
