mod scripted;
pub use scripted::ScriptedPipeline;

mod function;
pub use function::FnPipeline;

mod retry;
pub use retry::{RetryPipeline, RetryPolicy};
