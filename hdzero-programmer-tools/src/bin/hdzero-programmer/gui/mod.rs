//! The eframe user interface.
//!
//! Every long running job (catalog requests, downloads, flash and backup)
//! runs as a task on the tokio runtime owned by [`App`]. Tasks never touch UI
//! state; they post a [`Message`] to the app's mailbox, which is drained at
//! the start of every frame.

mod help;
mod internet;
mod local;

use std::path::{Path, PathBuf};

use eframe::egui;
use hdzero_programmer::{
    BackupOperation, CatalogClient, CatalogError, Config, Device, DeviceId, FirmwareRelease,
    FlashOperation, Flashrom, LocateError, OperationError, OperationEvent, OperationProgress,
    PaddedImage, PrivilegedRunner,
    operation::{default_backup_dir, default_backup_path},
};
use time::{OffsetDateTime, UtcOffset};
use tokio::{runtime::Runtime, sync::mpsc};

use help::HelpPanel;
use internet::{InternetAction, InternetPanel};
use local::{LocalAction, LocalPanel};

pub const APP_TITLE: &str = "HDZero Programmer Tool – by Gunther_FPV";
const HEADER_TITLE: &str = "HDZero Programmer";

/// Results and progress posted by background tasks.
pub(crate) enum Message {
    Devices(Result<Vec<Device>, CatalogError>),
    Firmwares {
        device: DeviceId,
        result: Result<Vec<FirmwareRelease>, CatalogError>,
    },
    DevicePicture {
        url: String,
        result: Result<egui::ColorImage, String>,
    },
    DownloadProgress(u8),
    Downloaded(Result<PathBuf, CatalogError>),
    Operation(OperationEvent),
    Flashed(Result<PaddedImage, OperationError>),
    BackedUp(Result<PathBuf, OperationError>),
}

/// Sending half of the app's message queue. Wakes up the UI on every message.
#[derive(Clone)]
struct Mailbox {
    sender: mpsc::UnboundedSender<Message>,
    ctx: egui::Context,
}

impl Mailbox {
    fn post(&self, message: Message) {
        if self.sender.send(message).is_ok() {
            self.ctx.request_repaint();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tab {
    Internet,
    Local,
    Help,
}

impl Tab {
    const ALL: [Self; 3] = [Self::Internet, Self::Local, Self::Help];

    fn label(self) -> &'static str {
        match self {
            Self::Internet => "🌐 Internet",
            Self::Local => "💻 Local",
            Self::Help => "ℹ Help",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DialogKind {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Dialog {
    kind: DialogKind,
    title: &'static str,
    message: String,
}

impl Dialog {
    fn info(title: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind: DialogKind::Info,
            title,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            kind: DialogKind::Error,
            title: "Error",
            message: message.into(),
        }
    }
}

pub struct App {
    runtime: Runtime,
    mailbox: Mailbox,
    inbox: mpsc::UnboundedReceiver<Message>,

    catalog: Option<CatalogClient>,
    flashrom: Option<Flashrom>,
    runner: PrivilegedRunner,
    backup_dir: Option<PathBuf>,
    utc_offset: UtcOffset,

    tab: Tab,
    internet: InternetPanel,
    local: LocalPanel,
    help: HelpPanel,
    /// Set while a download, flash or backup is running.
    busy: bool,
    dialog: Option<Dialog>,
}

impl App {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        runtime: Runtime,
        config: Config,
        utc_offset: UtcOffset,
    ) -> Self {
        cc.egui_ctx.set_visuals(egui::Visuals::dark());

        let mut app = Self::with_context(cc.egui_ctx.clone(), runtime, config);
        app.utc_offset = utc_offset;
        app.reload_devices();
        app
    }

    fn with_context(ctx: egui::Context, runtime: Runtime, config: Config) -> Self {
        let (sender, inbox) = mpsc::unbounded_channel();
        let mut internet = InternetPanel::default();
        let mut local = LocalPanel::default();

        let catalog = match CatalogClient::new(&config.catalog) {
            Ok(client) => Some(client),
            Err(error) => {
                tracing::error!("Catalog unavailable: {error}");
                internet.fail(&error.to_string());
                None
            }
        };

        let flashrom = match Flashrom::locate(&config.flashrom) {
            Ok(flashrom) => Some(flashrom),
            Err(error) => {
                tracing::warn!("{error}");
                local.append_log(&error.to_string());
                None
            }
        };

        let runner = PrivilegedRunner::new(config.elevation);
        let help = HelpPanel::new(flashrom.as_ref(), runner.elevation(), &config.catalog.api_base);

        Self {
            runtime,
            mailbox: Mailbox { sender, ctx },
            inbox,
            catalog,
            flashrom,
            runner,
            backup_dir: config.backup_dir,
            utc_offset: UtcOffset::UTC,
            tab: Tab::Internet,
            internet,
            local,
            help,
            busy: false,
            dialog: None,
        }
    }

    /// Processes everything background tasks have posted since the last frame.
    fn drain_inbox(&mut self) {
        while let Ok(message) = self.inbox.try_recv() {
            self.handle(message);
        }
    }

    fn handle(&mut self, message: Message) {
        match message {
            Message::Devices(Ok(devices)) => {
                if self.internet.set_devices(devices) {
                    self.device_changed();
                }
            }
            Message::Devices(Err(error)) | Message::Firmwares { result: Err(error), .. } => {
                self.internet_failed(&error.to_string());
            }
            Message::Firmwares {
                device,
                result: Ok(firmwares),
            } => self.internet.set_firmwares(&device, firmwares),
            Message::DevicePicture { url, result } => {
                if self.internet.awaits_picture(&url) {
                    let picture = result.map(|image| {
                        self.mailbox
                            .ctx
                            .load_texture("device-picture", image, egui::TextureOptions::LINEAR)
                    });
                    self.internet.set_picture(picture);
                }
            }
            Message::DownloadProgress(percent) => self.internet.downloading(percent),
            Message::Downloaded(Ok(path)) => {
                self.busy = false;
                self.local.set_downloaded(&path);
                self.local
                    .append_log(&format!("Downloaded from Internet → {}", path.display()));
                self.internet
                    .status_append(&format!("Downloaded: {}", path.display()));
                self.internet.set_phase("Wait - Prepare firmware");
                self.start_flash(&path);
            }
            Message::Downloaded(Err(error)) => {
                self.busy = false;
                self.internet.set_phase("Ready.");
                self.internet_failed(&error.to_string());
            }
            Message::Operation(event) => {
                self.local.apply(&event);
                match &event {
                    OperationEvent::Phase(phase) => self.internet.set_phase(phase.status()),
                    OperationEvent::Log(line) => self.internet.status_append(line),
                    OperationEvent::Progress(_) => {}
                }
            }
            Message::Flashed(result) => {
                self.busy = false;
                match result {
                    Ok(image) => {
                        tracing::info!(
                            "Flashed {} byte firmware padded in {:?}",
                            image.firmware_len(),
                            image.path()
                        );
                        self.local.finished("✅ Done");
                        self.internet.status_append("Finished.");
                        self.dialog = Some(Dialog::info("Success", "Flash completed."));
                    }
                    Err(error) => {
                        let message = describe_failure(&error);
                        self.local.finished("❌ Error");
                        self.local.append_log(&format!("\nERROR: {message}"));
                        self.internet.status_append(&format!("ERROR: {message}"));
                        self.dialog = Some(Dialog::error(message));
                    }
                }
            }
            Message::BackedUp(result) => {
                self.busy = false;
                match result {
                    Ok(path) => {
                        self.local.finished("✅ Backup done");
                        self.local
                            .append_log(&format!("Backup saved: {}", path.display()));
                        self.dialog = Some(Dialog::info(
                            "Backup",
                            format!("Backup saved at:\n{}", path.display()),
                        ));
                    }
                    Err(error) => {
                        let message = describe_failure(&error);
                        self.local.finished("❌ Backup error");
                        self.local.append_log(&format!("\nERROR: {message}"));
                        self.dialog = Some(Dialog::error(message));
                    }
                }
            }
        }
    }

    fn internet_failed(&mut self, message: &str) {
        tracing::warn!("Catalog error: {message}");
        self.internet.fail(message);
        self.local.append_log(&format!("[Internet] ERROR: {message}"));
    }

    fn reload_devices(&mut self) {
        let Some(catalog) = self.catalog.clone() else {
            return;
        };
        self.internet.loading_devices();
        tracing::info!("Loading devices from {}", catalog.base_url());

        let mailbox = self.mailbox.clone();
        self.runtime.spawn(async move {
            mailbox.post(Message::Devices(catalog.devices().await));
        });
    }

    fn device_changed(&mut self) {
        let Some(device) = self.internet.selected_device().cloned() else {
            return;
        };
        let Some(catalog) = self.catalog.clone() else {
            return;
        };

        match device.image_url() {
            Some(url) => {
                let url = url.to_string();
                self.internet.loading_picture(&url);
                let catalog = catalog.clone();
                let mailbox = self.mailbox.clone();
                self.runtime.spawn(async move {
                    let result = match catalog.device_image(&url).await {
                        Ok(bytes) => decode_picture(&bytes).map_err(|error| error.to_string()),
                        Err(error) => Err(error.to_string()),
                    };
                    mailbox.post(Message::DevicePicture { url, result });
                });
            }
            None => self.internet.clear_picture(),
        }

        if let Some(id) = device.id {
            self.internet.loading_firmwares();
            let mailbox = self.mailbox.clone();
            self.runtime.spawn(async move {
                let result = catalog.firmwares(&id).await;
                mailbox.post(Message::Firmwares { device: id, result });
            });
        }
    }

    fn download_selected_firmware(&mut self) {
        if self.busy {
            return;
        }
        let Some(release) = self.internet.selected_firmware() else {
            self.internet_failed("No firmware selected.");
            return;
        };
        let Some(url) = release.firmware_url().map(str::to_string) else {
            self.internet_failed("No firmware_url provided by API.");
            return;
        };
        let Some(catalog) = self.catalog.clone() else {
            return;
        };

        self.busy = true;
        self.internet.set_phase("Wait - Downloading.");
        self.internet.status_set(&format!("Downloading: {url}"));

        let mailbox = self.mailbox.clone();
        self.runtime.spawn(async move {
            let progress = mailbox.clone();
            let result = catalog
                .download(&url, move |percent| {
                    progress.post(Message::DownloadProgress(percent))
                })
                .await;
            mailbox.post(Message::Downloaded(result));
        });
    }

    /// The located `flashrom`, or an error dialog when it is gone.
    fn require_flashrom(&mut self) -> Option<Flashrom> {
        match &self.flashrom {
            Some(flashrom) if flashrom.is_available() => Some(flashrom.clone()),
            _ => {
                self.dialog = Some(Dialog::error(LocateError::NotFound.to_string()));
                None
            }
        }
    }

    fn start_flash(&mut self, firmware: &Path) {
        if self.busy {
            return;
        }
        if !firmware.exists() {
            self.dialog = Some(Dialog::error("Select a .bin file."));
            return;
        }
        let Some(flashrom) = self.require_flashrom() else {
            return;
        };

        self.busy = true;
        self.local.started("Flashing…", Some(0));

        let operation = FlashOperation::new(flashrom, firmware);
        let runner = self.runner;
        let mailbox = self.mailbox.clone();
        self.runtime.spawn(async move {
            let events = mailbox.clone();
            let progress =
                OperationProgress::new(move |event| events.post(Message::Operation(event)));
            let result = operation.run(&runner, &progress).await;
            mailbox.post(Message::Flashed(result));
        });
    }

    fn start_backup(&mut self) {
        if self.busy {
            return;
        }
        let Some(flashrom) = self.require_flashrom() else {
            return;
        };
        let Some(dir) = default_backup_dir(self.backup_dir.as_deref()) else {
            self.dialog = Some(Dialog::error(
                "Could not determine a directory for the backup. Set `backup_dir` in the configuration.",
            ));
            return;
        };
        let now = OffsetDateTime::now_utc().to_offset(self.utc_offset);
        let output = default_backup_path(&dir, now);

        self.busy = true;
        self.local.started("Backing up…", None);

        let operation = BackupOperation::new(flashrom, output);
        let runner = self.runner;
        let mailbox = self.mailbox.clone();
        self.runtime.spawn(async move {
            let events = mailbox.clone();
            let progress =
                OperationProgress::new(move |event| events.post(Message::Operation(event)));
            let result = operation.run(&runner, &progress).await;
            mailbox.post(Message::BackedUp(result));
        });
    }

    fn browse(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .set_title("Select firmware .bin")
            .add_filter("BIN", &["bin"])
            .pick_file()
        else {
            return;
        };

        if let Err(message) = self.local.select_file(&path) {
            self.dialog = Some(Dialog::error(message));
        }
    }

    fn flash_local(&mut self) {
        match self.local.firmware().filter(|path| path.exists()) {
            Some(path) => {
                let path = path.to_path_buf();
                self.start_flash(&path);
            }
            None => self.dialog = Some(Dialog::error("Select or download a .bin file first.")),
        }
    }

    fn show_dialog(&mut self, ctx: &egui::Context) {
        let Some(dialog) = &self.dialog else {
            return;
        };

        let mut close = false;
        egui::Window::new(dialog.title)
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                match dialog.kind {
                    DialogKind::Info => ui.label(&dialog.message),
                    DialogKind::Error => ui.colored_label(egui::Color32::LIGHT_RED, &dialog.message),
                };
                ui.add_space(8.0);
                if ui.button("OK").clicked() {
                    close = true;
                }
            });

        if close {
            self.dialog = None;
        }
    }
}

impl eframe::App for App {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_inbox();

        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.add_space(6.0);
            ui.heading(egui::RichText::new(HEADER_TITLE).size(22.0).strong());
            ui.add_space(10.0);
            ui.horizontal(|ui| {
                for tab in Tab::ALL {
                    ui.selectable_value(&mut self.tab, tab, tab.label());
                }
            });
            ui.add_space(4.0);
        });

        let modal_open = self.dialog.is_some();
        let busy = self.busy;
        let action = egui::CentralPanel::default()
            .show(ctx, |ui| {
                ui.add_enabled_ui(!modal_open, |ui| match self.tab {
                    Tab::Internet => self.internet.ui(ui, busy).map(Action::Internet),
                    Tab::Local => self.local.ui(ui, busy).map(Action::Local),
                    Tab::Help => {
                        self.help.ui(ui);
                        None
                    }
                })
                .inner
            })
            .inner;

        match action {
            Some(Action::Internet(InternetAction::Reload)) => self.reload_devices(),
            Some(Action::Internet(InternetAction::DeviceChanged)) => self.device_changed(),
            Some(Action::Internet(InternetAction::Flash)) => self.download_selected_firmware(),
            Some(Action::Local(LocalAction::Browse)) => self.browse(),
            Some(Action::Local(LocalAction::Flash)) => self.flash_local(),
            Some(Action::Local(LocalAction::Backup)) => self.start_backup(),
            None => {}
        }

        self.show_dialog(ctx);
    }
}

enum Action {
    Internet(InternetAction),
    Local(LocalAction),
}

/// Decodes a device picture and scales it to fit the picture frame.
fn decode_picture(bytes: &[u8]) -> Result<egui::ColorImage, image::ImageError> {
    let picture = image::load_from_memory(bytes)?
        .thumbnail(internet::PICTURE_SIZE[0], internet::PICTURE_SIZE[1])
        .to_rgba8();
    let size = [picture.width() as usize, picture.height() as usize];

    Ok(egui::ColorImage::from_rgba_unmultiplied(size, picture.as_raw()))
}

/// The error text shown to the user, including what `flashrom` printed.
fn describe_failure(error: &OperationError) -> String {
    match error.stderr().map(str::trim).filter(|stderr| !stderr.is_empty()) {
        Some(stderr) => format!("{error}\n\n{stderr}"),
        None => error.to_string(),
    }
}
