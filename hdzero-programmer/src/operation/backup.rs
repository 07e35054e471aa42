use std::path::{Path, PathBuf};

use time::{OffsetDateTime, macros::format_description};

use super::{Operation, OperationError, OperationProgress, Phase};
use crate::{flashrom::Flashrom, runner::CommandRunner};

/// Reads the whole chip into a file.
#[derive(Debug, Clone)]
pub struct BackupOperation {
    flashrom: Flashrom,
    output: PathBuf,
}

impl BackupOperation {
    /// Prepares reading the chip with `flashrom` into `output`.
    pub fn new(flashrom: Flashrom, output: impl Into<PathBuf>) -> Self {
        Self {
            flashrom,
            output: output.into(),
        }
    }

    /// The file the chip contents are written to.
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Runs the backup and returns the path of the written file.
    pub async fn run<R: CommandRunner>(
        &self,
        runner: &R,
        progress: &OperationProgress,
    ) -> Result<PathBuf, OperationError> {
        tracing::info!("Backing up chip to {:?}", self.output);

        progress.phase(Phase::BackingUp);
        let invocation = self.flashrom.read(&self.output);
        progress.log(format!("→ {invocation}"));

        let output = runner.run(&invocation).await?;
        progress.log_output(&output.stdout);

        if !output.success() {
            progress.log_output(&output.stderr);
            tracing::warn!("flashrom failed with {:?}", output.status);
            return Err(OperationError::ToolFailed {
                operation: Operation::Backup,
                status: output.status,
                stderr: output.stderr,
            });
        }

        progress.progress(100);
        progress.phase(Phase::Done);

        Ok(self.output.clone())
    }
}

/// `HDZero_backup_<YYYYMMDD-HHMMSS>.bin` for the given moment.
pub fn backup_file_name(now: OffsetDateTime) -> String {
    let format = format_description!("[year][month][day]-[hour][minute][second]");
    // The description only uses numeric components, formatting cannot fail for them.
    let stamp = now
        .format(&format)
        .unwrap_or_else(|_| now.unix_timestamp().to_string());

    format!("HDZero_backup_{stamp}.bin")
}

/// The directory backups go to: `configured`, or else the user's home directory.
pub fn default_backup_dir(configured: Option<&Path>) -> Option<PathBuf> {
    configured.map(Path::to_path_buf).or_else(|| {
        directories::UserDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
    })
}

/// Full path of a backup taken at `now` inside `dir`.
pub fn default_backup_path(dir: &Path, now: OffsetDateTime) -> PathBuf {
    dir.join(backup_file_name(now))
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use pretty_assertions::assert_eq;
    use time::macros::datetime;

    use super::*;
    use crate::{
        flashrom::DEFAULT_PROGRAMMER,
        operation::{
            OperationEvent,
            testing::{ScriptedRunner, recorder},
        },
    };

    fn flashrom() -> Flashrom {
        Flashrom::new("/opt/homebrew/bin/flashrom", DEFAULT_PROGRAMMER)
    }

    #[test]
    fn file_name_carries_a_sortable_timestamp() {
        assert_eq!(
            backup_file_name(datetime!(2024-03-07 09:05:01 UTC)),
            "HDZero_backup_20240307-090501.bin"
        );
    }

    #[test]
    fn backup_path_joins_directory_and_name() {
        assert_eq!(
            default_backup_path(Path::new("/Users/pilot"), datetime!(2025-12-31 23:59:59 UTC)),
            PathBuf::from("/Users/pilot/HDZero_backup_20251231-235959.bin")
        );
    }

    #[test]
    fn configured_backup_dir_wins() {
        assert_eq!(
            default_backup_dir(Some(Path::new("/srv/backups"))),
            Some(PathBuf::from("/srv/backups"))
        );
    }

    #[tokio::test]
    async fn successful_backup_returns_the_output_path() {
        let runner = ScriptedRunner::exiting(0, "Reading flash... done.\n", "");
        let (progress, events) = recorder();
        let output = PathBuf::from("/Users/pilot/HDZero_backup_20240307-090501.bin");

        let written = BackupOperation::new(flashrom(), &output)
            .run(&runner, &progress)
            .await
            .unwrap();

        assert_eq!(written, output);
        assert_eq!(
            runner.invocations.lock()[0].arguments(),
            &[
                OsString::from("-p"),
                "ch341a_spi".into(),
                "-r".into(),
                output.clone().into(),
            ]
        );
        assert_eq!(
            *events.lock(),
            vec![
                OperationEvent::Phase(Phase::BackingUp),
                OperationEvent::Log(format!(
                    "→ /opt/homebrew/bin/flashrom -p ch341a_spi -r {}",
                    output.display()
                )),
                OperationEvent::Log("Reading flash... done.".to_string()),
                OperationEvent::Progress(100),
                OperationEvent::Phase(Phase::Done),
            ]
        );
    }

    #[tokio::test]
    async fn dismissed_prompt_is_a_tool_failure() {
        let runner = ScriptedRunner::exiting(126, "", "Error executing command as another user: Request dismissed\n");
        let (progress, events) = recorder();

        let error = BackupOperation::new(flashrom(), "/tmp/backup.bin")
            .run(&runner, &progress)
            .await
            .unwrap_err();

        assert_eq!(
            error.to_string(),
            "Backup failed, flashrom exited with status 126"
        );
        assert_eq!(
            error.stderr(),
            Some("Error executing command as another user: Request dismissed\n")
        );
        assert!(!events.lock().contains(&OperationEvent::Phase(Phase::Done)));
    }
}
