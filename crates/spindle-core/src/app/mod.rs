//! App - application layer
//!
//! Wires the ports together into TaskQueueLoader.
//!
//! # Components
//! - **TaskQueueLoader**: run state and observers, starting and stopping runs
//! - **run_loop**: the body of one run (peek -> dispatch -> outcome -> refill)
//! - **TaskContext**: what run_task gets to see about its run
//! - **LoaderConfig / RetryPolicy**: settings

pub mod config;
pub mod context;
pub mod loader;
pub mod retry;
mod run_loop;

// re-exports
pub use self::config::{ConfigError, LoaderConfig, load_json_file};
pub use self::context::TaskContext;
pub use self::loader::TaskQueueLoader;
pub use self::retry::RetryPolicy;
