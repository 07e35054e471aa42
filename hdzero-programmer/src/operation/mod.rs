//! Flash and backup operations and their progress reporting.
//!
//! Operations are plain async functions. They report what they are doing
//! through an [`OperationProgress`] handler and return their result; the
//! caller decides where the events go (a channel to the UI, a log, a test
//! recorder).

mod backup;
mod flash;

pub use backup::{BackupOperation, backup_file_name, default_backup_dir, default_backup_path};
pub use flash::FlashOperation;

use std::fmt;

use crate::{image::ImageError, runner::RunnerError};

/// A structure to manage progress reporting of an operation.
///
/// This struct stores a handler closure which will be called every time an
/// operation enters a new phase, makes progress or has something to log.
///
/// # Example
///
/// ```
/// use hdzero_programmer::OperationProgress;
///
/// let progress = OperationProgress::new(|event| println!("Event: {:?}", event));
/// ```
pub struct OperationProgress {
    handler: Box<dyn Fn(OperationEvent) + Send + Sync>,
}

impl OperationProgress {
    /// Create a new `OperationProgress` with a given `handler` to be called on events.
    pub fn new(handler: impl Fn(OperationEvent) + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
        }
    }

    fn emit(&self, event: OperationEvent) {
        (self.handler)(event);
    }

    pub(crate) fn phase(&self, phase: Phase) {
        self.emit(OperationEvent::Phase(phase));
    }

    pub(crate) fn progress(&self, percent: u8) {
        self.emit(OperationEvent::Progress(percent.min(100)));
    }

    pub(crate) fn log(&self, line: impl Into<String>) {
        self.emit(OperationEvent::Log(line.into()));
    }

    /// Logs captured program output, skipping it when empty.
    pub(crate) fn log_output(&self, output: &str) {
        let output = output.trim_end();
        if !output.is_empty() {
            self.log(output);
        }
    }
}

impl fmt::Debug for OperationProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationProgress").finish_non_exhaustive()
    }
}

/// Events emitted while an operation runs.
///
/// A successful flash emits, in order:
///
/// * `Phase(Preparing)`, `Progress(10)`
/// * `Progress(40)` once the padded image is written
/// * `Phase(Flashing)`
/// * `Progress(100)`, `Phase(Done)`
///
/// interleaved with `Log` lines. A failed operation stops emitting after
/// logging the captured error output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationEvent {
    /// The operation entered a new phase.
    Phase(Phase),
    /// Overall progress in percent, 0 to 100.
    Progress(u8),
    /// A line (or block) of log text.
    Log(String),
}

/// The phases of an operation, as presented to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Building the padded image.
    Preparing,
    /// `flashrom` is writing the chip.
    Flashing,
    /// `flashrom` is reading the chip.
    BackingUp,
    /// The operation finished successfully.
    Done,
}

impl Phase {
    /// Status text shown to the user.
    pub fn status(&self) -> &'static str {
        match self {
            Self::Preparing => "Wait - Prepare firmware",
            Self::Flashing => "Wait - Flashing",
            Self::BackingUp => "Wait - Backing up",
            Self::Done => "Done.",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status())
    }
}

/// The kind of chip operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, docsplay::Display)]
pub enum Operation {
    /// Flash
    Flash,
    /// Backup
    Backup,
}

/// Describes any error that happened during a flash or backup operation.
#[derive(Debug, thiserror::Error, docsplay::Display)]
pub enum OperationError {
    /// Failed to prepare the firmware image: {0}
    Image(#[from] ImageError),

    /// Failed to run flashrom: {0}
    Runner(#[from] RunnerError),

    /// {operation} failed, flashrom {describe_status(status)}
    ToolFailed {
        /// The operation that failed.
        operation: Operation,
        /// Exit status of `flashrom`, `None` if it was killed.
        status: Option<i32>,
        /// Captured standard error output, verbatim.
        stderr: String,
    },

    /// The image preparation task stopped unexpectedly.
    Join(#[from] tokio::task::JoinError),
}

impl OperationError {
    /// The captured error output of `flashrom`, if the tool ran and failed.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::ToolFailed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exited with status {code}"),
        None => "was terminated by a signal".to_string(),
    }
}
