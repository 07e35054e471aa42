//! The Local tab: flash a `.bin` from disk or back up the chip.

use std::path::{Path, PathBuf};

use eframe::egui;
use hdzero_programmer::{ImageError, OperationEvent, image::validate_local_firmware};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalAction {
    Browse,
    Flash,
    Backup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Progress {
    Percent(u8),
    /// Running without a measurable progress.
    Working,
}

#[derive(Debug)]
pub struct LocalPanel {
    firmware: Option<PathBuf>,
    status: String,
    progress: Progress,
    log: String,
}

impl Default for LocalPanel {
    fn default() -> Self {
        Self {
            firmware: None,
            status: "Waiting for file…".to_string(),
            progress: Progress::Percent(0),
            log: String::new(),
        }
    }
}

impl LocalPanel {
    /// Accepts a file picked by the user if it looks like HDZero firmware.
    pub fn select_file(&mut self, path: &Path) -> Result<(), &'static str> {
        match validate_local_firmware(path) {
            Ok(size) => {
                tracing::info!("Selected {path:?} ({size} bytes)");
                self.firmware = Some(path.to_path_buf());
                self.status = "Ready to flash.".to_string();
                Ok(())
            }
            Err(ImageError::NotABinFile { .. }) => Err("Please select a valid .bin file."),
            Err(ImageError::TooLarge { .. }) => Err("Firmware > 64KB; not valid for HDZero."),
            Err(error) => {
                tracing::warn!("{error}");
                Err("The selected file could not be read.")
            }
        }
    }

    /// Takes over a firmware file downloaded on the Internet tab.
    pub fn set_downloaded(&mut self, path: &Path) {
        self.firmware = Some(path.to_path_buf());
        self.status = "Ready to flash (from Internet).".to_string();
    }

    pub fn firmware(&self) -> Option<&Path> {
        self.firmware.as_deref()
    }

    pub fn started(&mut self, status: &str, percent: Option<u8>) {
        self.status = status.to_string();
        self.progress = percent.map_or(Progress::Working, Progress::Percent);
    }

    pub fn finished(&mut self, status: &str) {
        self.status = status.to_string();
        self.progress = Progress::Percent(100);
    }

    pub fn apply(&mut self, event: &OperationEvent) {
        match event {
            OperationEvent::Phase(phase) => self.status = phase.status().to_string(),
            OperationEvent::Progress(percent) => self.progress = Progress::Percent(*percent),
            OperationEvent::Log(line) => self.append_log(line),
        }
    }

    pub fn append_log(&mut self, text: &str) {
        self.log.push_str(text);
        if !text.ends_with('\n') {
            self.log.push('\n');
        }
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn log(&self) -> &str {
        &self.log
    }

    pub fn ui(&mut self, ui: &mut egui::Ui, busy: bool) -> Option<LocalAction> {
        let mut action = None;

        ui.horizontal(|ui| {
            ui.label("Select BIN file:");
            let mut path = self
                .firmware
                .as_deref()
                .map(|path| path.display().to_string())
                .unwrap_or_default();
            ui.add_sized(
                [ui.available_width() - 80.0, 20.0],
                egui::TextEdit::singleline(&mut path).interactive(false),
            );
            if ui.add_enabled(!busy, egui::Button::new("Browse")).clicked() {
                action = Some(LocalAction::Browse);
            }
        });

        ui.label(&self.status);
        let bar = match self.progress {
            Progress::Percent(percent) => {
                egui::ProgressBar::new(f32::from(percent) / 100.0).show_percentage()
            }
            Progress::Working => egui::ProgressBar::new(0.0).animate(true),
        };
        ui.add(bar);

        egui::ScrollArea::vertical()
            .id_salt("local-log")
            .max_height(ui.available_height() - 48.0)
            .stick_to_bottom(true)
            .show(ui, |ui| {
                ui.add(
                    egui::TextEdit::multiline(&mut self.log.as_str())
                        .font(egui::TextStyle::Monospace)
                        .desired_rows(16)
                        .desired_width(f32::INFINITY),
                );
            });

        ui.horizontal(|ui| {
            let size = egui::vec2(0.0, 36.0);
            if ui
                .add_enabled(!busy, egui::Button::new("💾 BACKUP").min_size(size))
                .clicked()
            {
                action = Some(LocalAction::Backup);
            }
            if ui
                .add_enabled(!busy, egui::Button::new("⚡ FLASH").min_size(size))
                .clicked()
            {
                action = Some(LocalAction::Flash);
            }
        });

        action
    }
}
