//! The Help tab.

use eframe::egui;
use hdzero_programmer::{Elevation, Flashrom};

const README: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../README.md"));

pub struct HelpPanel {
    flashrom: String,
    elevation: &'static str,
    api_base: String,
}

impl HelpPanel {
    pub fn new(flashrom: Option<&Flashrom>, elevation: Elevation, api_base: &str) -> Self {
        Self {
            flashrom: flashrom.map_or_else(
                || "not found".to_string(),
                |flashrom| format!("{} (-p {})", flashrom.path().display(), flashrom.programmer()),
            ),
            elevation: elevation_name(elevation),
            api_base: api_base.to_string(),
        }
    }

    pub fn ui(&mut self, ui: &mut egui::Ui) {
        egui::Grid::new("about")
            .num_columns(2)
            .spacing([12.0, 4.0])
            .show(ui, |ui| {
                ui.label("Version");
                ui.monospace(env!("HDZERO_PROGRAMMER_LONG_VERSION"));
                ui.end_row();

                ui.label("flashrom");
                ui.monospace(&self.flashrom);
                ui.end_row();

                ui.label("Privileges");
                ui.monospace(self.elevation);
                ui.end_row();

                ui.label("Catalog");
                ui.hyperlink(&self.api_base);
                ui.end_row();
            });

        ui.separator();

        let mut readme = README;
        egui::ScrollArea::vertical()
            .id_salt("readme")
            .show(ui, |ui| {
                ui.add(
                    egui::TextEdit::multiline(&mut readme)
                        .font(egui::TextStyle::Monospace)
                        .desired_width(f32::INFINITY),
                );
            });
    }
}

fn elevation_name(elevation: Elevation) -> &'static str {
    match elevation {
        Elevation::Auto => "automatic",
        Elevation::Pkexec => "pkexec",
        Elevation::Osascript => "osascript (administrator privileges)",
        Elevation::None => "none (flashrom runs as the current user)",
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn missing_flashrom_is_spelled_out() {
        let panel = HelpPanel::new(None, Elevation::Pkexec, "https://hdzero.go-next.co");

        assert_eq!(panel.flashrom, "not found");
        assert_eq!(panel.elevation, "pkexec");
    }

    #[test]
    fn located_flashrom_shows_the_programmer() {
        let flashrom = Flashrom::new("/usr/sbin/flashrom", "ch341a_spi");

        let panel = HelpPanel::new(Some(&flashrom), Elevation::None, "http://localhost:8080");

        assert_eq!(panel.flashrom, "/usr/sbin/flashrom (-p ch341a_spi)");
    }
}
