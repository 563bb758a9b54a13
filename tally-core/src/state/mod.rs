pub mod machine;
pub mod queue;

pub use machine::{ClientCore, Effect, Event, Phase, RetryPolicy};
pub use queue::{Submission, TaskQueue};
