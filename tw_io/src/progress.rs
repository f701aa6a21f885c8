use tw_core::{ArchivedBinary, PublishStage};

/// Events emitted while a publish runs, for the CLI to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishProgress {
    StageStarted { stage: PublishStage },
    StageCompleted { stage: PublishStage, detail: String },
    ArtifactReady { artifact: ArchivedBinary },
    StageFailed { stage: PublishStage, message: String },
}

pub type ProgressCallback = Box<dyn Fn(PublishProgress) + Send + Sync>;
