//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (hooks.rs, driven by Unit / Registry):
//!     attached units in order → components in dependency order → on_startup
//!
//! Shutdown (shutdown.rs):
//!     Signal received → stop accepting → drain → on_shutdown in reverse
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Hooks run one at a time, never in parallel
//! - Each hook may be bounded by `hook_timeout_secs`

pub mod hooks;
pub mod shutdown;
pub mod signals;

pub use hooks::run_hook;
pub use shutdown::Shutdown;
