//! The Internet tab: pick a device and a release from the catalog, download and flash it.

use eframe::egui;
use hdzero_programmer::{Device, DeviceId, FirmwareRelease};

/// Bounding box of the device picture, in pixels.
pub const PICTURE_SIZE: [u32; 2] = [300, 220];

/// What the user asked for on this tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternetAction {
    Reload,
    DeviceChanged,
    Flash,
}

enum Picture {
    Missing,
    Loading(String),
    Loaded(egui::TextureHandle),
    Failed,
}

pub struct InternetPanel {
    devices: Vec<Device>,
    selected_device: Option<usize>,
    firmwares: Vec<FirmwareRelease>,
    selected_firmware: Option<usize>,
    picture: Picture,
    /// One line summary of the last catalog request.
    state: String,
    /// Phase of the running operation.
    phase: String,
    status_box: String,
}

impl Default for InternetPanel {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            selected_device: None,
            firmwares: Vec::new(),
            selected_firmware: None,
            picture: Picture::Missing,
            state: "Ready".to_string(),
            phase: "Ready.".to_string(),
            status_box: String::new(),
        }
    }
}

impl InternetPanel {
    pub fn loading_devices(&mut self) {
        self.state = "Loading devices…".to_string();
        self.devices.clear();
        self.selected_device = None;
        self.clear_firmwares();
    }

    /// Shows a fresh device list and selects the first entry.
    ///
    /// Returns whether a device got selected.
    pub fn set_devices(&mut self, devices: Vec<Device>) -> bool {
        self.state = format!("{} device(s) loaded", devices.len());
        self.selected_device = (!devices.is_empty()).then_some(0);
        self.devices = devices;
        self.clear_firmwares();
        self.selected_device.is_some()
    }

    pub fn selected_device(&self) -> Option<&Device> {
        self.devices.get(self.selected_device?)
    }

    pub fn loading_firmwares(&mut self) {
        self.state = "Loading firmwares…".to_string();
        self.clear_firmwares();
    }

    /// Shows the releases of `device`, unless the user moved on to another device.
    pub fn set_firmwares(&mut self, device: &DeviceId, firmwares: Vec<FirmwareRelease>) {
        if self.selected_device().and_then(|selected| selected.id.as_ref()) != Some(device) {
            tracing::debug!("Dropping firmware list of device {device}, no longer selected");
            return;
        }

        self.state = format!("{} firmware(s) loaded", firmwares.len());
        self.selected_firmware = (!firmwares.is_empty()).then_some(0);
        self.firmwares = firmwares;
    }

    pub fn selected_firmware(&self) -> Option<&FirmwareRelease> {
        self.firmwares.get(self.selected_firmware?)
    }

    fn clear_firmwares(&mut self) {
        self.firmwares.clear();
        self.selected_firmware = None;
    }

    pub fn loading_picture(&mut self, url: &str) {
        self.picture = Picture::Loading(url.to_string());
    }

    /// Whether a picture download for `url` is still wanted.
    pub fn awaits_picture(&self, url: &str) -> bool {
        matches!(&self.picture, Picture::Loading(pending) if pending == url)
    }

    pub fn set_picture(&mut self, picture: Result<egui::TextureHandle, String>) {
        self.picture = match picture {
            Ok(texture) => Picture::Loaded(texture),
            Err(error) => {
                tracing::debug!("Device picture failed: {error}");
                Picture::Failed
            }
        };
    }

    pub fn clear_picture(&mut self) {
        self.picture = Picture::Missing;
    }

    pub fn downloading(&mut self, percent: u8) {
        self.state = format!("Downloading… {percent}%");
    }

    pub fn fail(&mut self, message: &str) {
        self.state = format!("Error: {message}");
        self.status_append(&format!("ERROR: {message}"));
    }

    pub fn set_phase(&mut self, phase: &str) {
        self.phase = phase.to_string();
    }

    pub fn status_append(&mut self, text: &str) {
        self.status_box.push_str(text);
        if !text.ends_with('\n') {
            self.status_box.push('\n');
        }
    }

    pub fn status_set(&mut self, text: &str) {
        self.status_box.clear();
        self.status_append(text);
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn phase(&self) -> &str {
        &self.phase
    }

    pub fn status_box(&self) -> &str {
        &self.status_box
    }

    pub fn ui(&mut self, ui: &mut egui::Ui, busy: bool) -> Option<InternetAction> {
        let mut action = None;

        ui.columns(2, |columns| {
            let left = &mut columns[0];
            left.label(egui::RichText::new("Device").strong());
            if self.device_selector(left) {
                action = Some(InternetAction::DeviceChanged);
            }
            if left.button("⟳ Reload").clicked() {
                action = Some(InternetAction::Reload);
            }
            left.add_space(8.0);
            self.picture_frame(left);
            left.add_space(8.0);
            egui::ScrollArea::vertical()
                .id_salt("status-box")
                .max_height(90.0)
                .stick_to_bottom(true)
                .show(left, |ui| {
                    ui.add(
                        egui::TextEdit::multiline(&mut self.status_box.as_str())
                            .font(egui::TextStyle::Monospace)
                            .desired_width(f32::INFINITY),
                    );
                });

            let right = &mut columns[1];
            right.label("Firmware (version):");
            self.firmware_selector(right);
            right.add_space(6.0);
            right.label(egui::RichText::new("Notes:").strong());
            let notes = self
                .selected_firmware()
                .map(FirmwareRelease::notes_text)
                .unwrap_or_default();
            egui::ScrollArea::vertical()
                .id_salt("notes")
                .max_height(180.0)
                .show(right, |ui| {
                    ui.add(
                        egui::TextEdit::multiline(&mut &*notes)
                            .desired_rows(8)
                            .desired_width(f32::INFINITY),
                    );
                });
            let can_flash = !busy && self.selected_firmware().is_some();
            if right
                .add_enabled(can_flash, egui::Button::new("⚡ FLASH").min_size(egui::vec2(0.0, 36.0)))
                .clicked()
            {
                action = Some(InternetAction::Flash);
            }
        });

        ui.separator();
        ui.label(&self.state);
        ui.weak(&self.phase);

        action
    }

    /// Returns whether the selection changed.
    fn device_selector(&mut self, ui: &mut egui::Ui) -> bool {
        let selected_text = self
            .selected_device()
            .map(Device::display_name)
            .unwrap_or_default();
        let mut selected = self.selected_device;

        egui::ComboBox::from_id_salt("device")
            .width(ui.available_width())
            .selected_text(selected_text)
            .show_ui(ui, |ui| {
                for (index, device) in self.devices.iter().enumerate() {
                    ui.selectable_value(&mut selected, Some(index), device.display_name());
                }
            });

        let changed = selected != self.selected_device;
        if changed {
            self.selected_device = selected;
            self.clear_firmwares();
        }
        changed
    }

    fn firmware_selector(&mut self, ui: &mut egui::Ui) {
        let selected_text = self
            .selected_firmware()
            .map(|release| release.version_label().to_string())
            .unwrap_or_default();

        egui::ComboBox::from_id_salt("firmware")
            .width(ui.available_width())
            .selected_text(selected_text)
            .show_ui(ui, |ui| {
                for (index, release) in self.firmwares.iter().enumerate() {
                    ui.selectable_value(
                        &mut self.selected_firmware,
                        Some(index),
                        release.version_label(),
                    );
                }
            });
    }

    fn picture_frame(&self, ui: &mut egui::Ui) {
        let size = egui::vec2(PICTURE_SIZE[0] as f32, PICTURE_SIZE[1] as f32);

        egui::Frame::dark_canvas(ui.style()).show(ui, |ui| {
            ui.set_min_size(size);
            ui.centered_and_justified(|ui| match &self.picture {
                Picture::Loaded(texture) => {
                    ui.add(egui::Image::new(texture).max_size(size));
                }
                Picture::Loading(_) => {
                    ui.spinner();
                }
                Picture::Missing => {
                    ui.label("No image");
                }
                Picture::Failed => {
                    ui.label("Image load error");
                }
            });
        });
    }
}
