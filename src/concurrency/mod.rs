mod lock_manager;
mod wait_for;

pub use lock_manager::{LockManager, LockMode};
