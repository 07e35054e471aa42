use std::path::{Path, PathBuf};

use super::{Operation, OperationError, OperationProgress, Phase};
use crate::{
    flashrom::Flashrom,
    image::{self, PaddedImage},
    runner::CommandRunner,
};

/// Writes a firmware file to the chip.
///
/// The firmware is padded to the full flash size first; `flashrom` then
/// writes the padded image. There is no retry and no separate verify step:
/// success is whatever `flashrom`'s exit status says.
#[derive(Debug, Clone)]
pub struct FlashOperation {
    flashrom: Flashrom,
    firmware: PathBuf,
    temp_dir: Option<PathBuf>,
}

impl FlashOperation {
    /// Prepares flashing `firmware` with `flashrom`.
    pub fn new(flashrom: Flashrom, firmware: impl Into<PathBuf>) -> Self {
        Self {
            flashrom,
            firmware: firmware.into(),
            temp_dir: None,
        }
    }

    /// Places the padded image in `dir` instead of the system temporary directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// The firmware file that is flashed.
    pub fn firmware(&self) -> &Path {
        &self.firmware
    }

    /// Runs the operation to completion and returns the padded image that was written.
    pub async fn run<R: CommandRunner>(
        &self,
        runner: &R,
        progress: &OperationProgress,
    ) -> Result<PaddedImage, OperationError> {
        tracing::info!("Flashing {:?}", self.firmware);

        progress.phase(Phase::Preparing);
        progress.progress(10);
        progress.log("== Building 1MiB padded image ==");

        let firmware = self.firmware.clone();
        let temp_dir = self.temp_dir.clone().unwrap_or_else(std::env::temp_dir);
        let image = tokio::task::spawn_blocking(move || {
            image::prepare_padded_image_in(firmware, temp_dir)
        })
        .await??;

        progress.log(format!("→ padded image: {}", image.path().display()));
        progress.progress(40);

        progress.phase(Phase::Flashing);
        let invocation = self.flashrom.write(image.path());
        progress.log("== Flash (1 prompt) ==");
        progress.log(format!("→ {invocation}"));

        let output = runner.run(&invocation).await?;
        progress.log_output(&output.stdout);

        if !output.success() {
            progress.log_output(&output.stderr);
            tracing::warn!("flashrom failed with {:?}", output.status);
            return Err(OperationError::ToolFailed {
                operation: Operation::Flash,
                status: output.status,
                stderr: output.stderr,
            });
        }

        progress.progress(100);
        progress.phase(Phase::Done);
        tracing::info!("Flashed {:?}", self.firmware);

        Ok(image)
    }
}
