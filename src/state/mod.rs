//! Session state module
//!
//! This module persists user states and drives their transitions and timers

pub mod locks;
pub mod machine;
pub mod storage;
pub mod timers;

// Re-export commonly used state components
pub use locks::{UserGuard, UserLocks};
pub use machine::SessionStateMachine;
pub use storage::{MemoryStateStore, RedisStateStore, StateStore};
pub use timers::{TimeoutScheduler, TimerInfo, TimerSlots};
