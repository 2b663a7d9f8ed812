mod machine;
mod scheduled;
mod sequence;
mod state;
mod types;


pub use machine::LifecycleCoordinator;
pub use state::LifecycleState;
pub use types::{SequenceReport, Trigger};
