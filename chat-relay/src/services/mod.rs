pub mod generation;
pub mod history;
pub mod metrics;
pub mod providers;
pub mod relay;
pub mod state;

pub use state::{GenerationHandle, GenerationState};
