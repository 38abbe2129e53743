//! State module for process-wide crawl state
//!
//! # Components
//!
//! - `SessionState`: the session cookie echoed on every request, persisted across restarts
//! - `RunFlag`: the single-flight flag that keeps at most one crawl run active

mod run_flag;
mod session;

// Re-export main types
pub use run_flag::{RunFlag, RunGuard};
pub use session::SessionState;
