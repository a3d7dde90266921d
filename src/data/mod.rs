mod cache;
mod contract;
mod events;
mod project_state;

pub use cache::Cache;
pub use contract::{FileSpec, GenerationRequest, InterfaceContract, MemberKind, MemberSpec, Strategy};
pub use events::{EventSink, NullSink, PipelineEvent};
pub use project_state::{AttemptState, ProjectState, ReviewOutcome};
