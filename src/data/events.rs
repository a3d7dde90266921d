use serde::Serialize;

/// Named status events published at pipeline transition points.
///
/// Consumers are external (UI, CLI progress); publishing never waits for
/// acknowledgment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    WorkflowStarted,
    AgentStatusChanged { agent: String, status: String },
    /// Target file names, published before any code is written
    ContractReady { files: Vec<String> },
    ActivityStarted { agent: String, file: String },
    FileContentUpdated { file: String, content: String },
    StreamText { file: String, chunk: String },
    ReviewStarted { file: String, attempt: usize },
    ReviewCompleted {
        file: String,
        attempt: usize,
        approved: bool,
        feedback: Option<String>,
    },
    FileIntegrated { file: String, new_symbols: usize },
    ActivityFinished { agent: String, file: String },
    WorkflowFinished { success: bool, message: String },
}

/// Fire-and-forget publish channel
pub trait EventSink: Send + Sync {
    fn emit(&self, event: PipelineEvent);
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: PipelineEvent) {}
}

impl EventSink for tokio::sync::mpsc::UnboundedSender<PipelineEvent> {
    fn emit(&self, event: PipelineEvent) {
        // A closed receiver just means nobody is listening anymore.
        let _ = self.send(event);
    }
}

impl<T: EventSink + ?Sized> EventSink for std::sync::Arc<T> {
    fn emit(&self, event: PipelineEvent) {
        (**self).emit(event);
    }
}
