//! Lifecycle policy engine.
//!
//! A lifecycle policy maps a key prefix and an age threshold to an automatic
//! action (delete or archive). Policies live in an engine owned by each
//! backend; the engine periodically scans the backend's object space and
//! applies the actions. Two variants share one contract: the volatile
//! [`LifecycleEngine`] keeps policies only in memory, while the durable
//! [`PersistentLifecycleEngine`] serializes them to a JSON side file and
//! reloads them on construction.

mod engine;
mod persistent;
mod policy;

pub use engine::{
    run, LifecycleEngine, LifecycleManager, PassSummary, DEFAULT_SCAN_INTERVAL,
};
pub use persistent::{PersistentLifecycleEngine, DEFAULT_POLICY_FILE};
pub use policy::{LifecycleAction, LifecyclePolicy};
