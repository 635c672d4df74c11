use crate::progress::ProgressState;

/// Stage of a batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    /// Waiting for the user to start a run
    Idle,
    /// Splitting the input text into source URLs
    CollectingSources,
    /// Expanding every source into item URLs
    ExpandingAll,
    /// Downloading items one at a time
    DownloadingSequential,
    /// All items processed
    Done,
}

/// Severity of a user-facing notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A message the UI shows in a modal window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            title: "Error".to_owned(),
            message: message.into(),
        }
    }
}

/// Update sent from the worker to the UI
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// The orchestrator entered a new phase
    Phase(BatchPhase),
    /// New text for the status line
    Status(String),
    /// Snapshot of overall and per-file progress
    Progress(ProgressState),
    /// Something the user must acknowledge
    Notice(Notice),
    /// The run is over; the start button may be enabled again
    Finished,
}
