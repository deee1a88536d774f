//! Record/replay decisions for intercepted traffic.
//!
//! # Module Structure
//!
//! - `mode` - Recording mode enum and the flags each mode implies
//! - `session` - Per-page decision engine
//! - `pending` - Requests forwarded live and not yet saved
//! - `replay` - Recorded outcome to interceptor response
//! - `tasks` - Background task tracking for teardown

mod mode;
mod pending;
mod replay;
mod session;
mod tasks;

pub use mode::{ModeFlags, RecordMode};
pub use pending::{PendingRecordings, Watched};
pub use replay::{replay_for, Replay};
pub use session::{
    is_unavailable_body, Completion, RequestCompletedHook, RequestDecision, SessionOptions,
    VcrSession,
};
pub use tasks::TaskCoordinator;
