mod core;
mod state;
mod submission;


pub use state::{RunOutcome, RunPhase, SessionUpdate, StopHandle, StreamSession};
pub use submission::{has_submittable_content, missing_tool_results};
