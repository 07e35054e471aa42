mod gui;
mod util;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use eframe::egui;
use figment::Figment;
use figment::providers::{Env, Format as _, Json, Serialized, Toml, Yaml};
use hdzero_programmer::Config;
use time::UtcOffset;

use crate::util::logging::{LevelFilter, default_logfile_location, prune_logs, setup_logging};

/// Name of the configuration file, without extension.
const CONFIG_FILE: &str = ".hdzero-programmer";

#[derive(clap::Parser)]
#[clap(
    name = "hdzero-programmer",
    about = "Flash HDZero VTX and VRX firmware through a CH341A programmer",
    version = env!("HDZERO_PROGRAMMER_VERSION"),
    long_version = env!("HDZERO_PROGRAMMER_LONG_VERSION")
)]
struct Cli {
    /// Location for log file
    ///
    /// If no location is specified, the behaviour depends on `--log-to-folder`.
    #[clap(long, help_heading = "LOG CONFIGURATION")]
    log_file: Option<PathBuf>,
    /// Enable logging to the default folder. This option is ignored if `--log-file` is specified.
    #[clap(long, help_heading = "LOG CONFIGURATION")]
    log_to_folder: bool,
    /// Log level on stderr. Overrides `RUST_LOG`.
    #[clap(long, value_enum, ignore_case = true, help_heading = "LOG CONFIGURATION")]
    log_level: Option<LevelFilter>,

    /// Base URL of the firmware catalog
    #[clap(long, value_name = "URL")]
    api_base: Option<String>,
    /// Path to the flashrom binary
    #[clap(long, value_name = "PATH")]
    flashrom: Option<PathBuf>,
    /// flashrom programmer name
    #[clap(long)]
    programmer: Option<String>,
}

impl Cli {
    /// Applies the command line overrides on top of the loaded configuration.
    fn apply(&self, config: &mut Config) {
        if let Some(api_base) = &self.api_base {
            config.catalog.api_base.clone_from(api_base);
        }
        if let Some(path) = &self.flashrom {
            config.flashrom.path = Some(path.clone());
        }
        if let Some(programmer) = &self.programmer {
            config.flashrom.programmer.clone_from(programmer);
        }
    }
}

fn main() -> Result<()> {
    // Determine the local offset while the program is still single-threaded.
    let utc_offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);

    let mut config = load_config().context("Failed to load configuration.")?;

    let cli = Cli::parse();
    cli.apply(&mut config);

    let log_path = if let Some(ref location) = cli.log_file {
        Some(location.clone())
    } else if cli.log_to_folder {
        let location =
            default_logfile_location().context("Unable to determine default log file location.")?;
        if let Some(directory) = location.parent() {
            prune_logs(directory)?;
        }
        Some(location)
    } else {
        None
    };
    let log_path = log_path.as_deref();

    let _logger_guard = setup_logging(log_path, cli.log_level)?;

    tracing::debug!("Configuration: {config:?}");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("hdzero-worker")
        .build()
        .context("Failed to start the async runtime.")?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(gui::APP_TITLE)
            .with_inner_size([700.0, 620.0])
            .with_min_inner_size([680.0, 600.0]),
        ..Default::default()
    };

    eframe::run_native(
        gui::APP_TITLE,
        options,
        Box::new(move |cc| Ok(Box::new(gui::App::new(cc, runtime, config, utc_offset)))),
    )
    .map_err(|error| anyhow::anyhow!("{error}"))
}

fn load_config() -> Result<Config> {
    // Paths to search for the configuration file.
    let mut paths = vec![PathBuf::from(".")];
    if let Some(home) = directories::UserDirs::new().map(|user| user.home_dir().to_path_buf()) {
        paths.push(home);
    }

    let config = config_figment(&paths).extract::<Config>()?;

    Ok(config)
}

/// Layers defaults, configuration files in `paths` and the environment.
///
/// Files found earlier in `paths` take precedence over later ones.
fn config_figment(paths: &[PathBuf]) -> Figment {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));
    for path in paths.iter().rev() {
        figment = merge_config_files(figment, path);
    }

    figment
        .merge(
            Env::prefixed("HDZERO_")
                .ignore(&["API_BASE"])
                .split("__"),
        )
        .merge(
            Env::raw()
                .only(&["HDZERO_API_BASE"])
                .map(|_| "catalog.api_base".into()),
        )
}

fn merge_config_files(figment: Figment, directory: &Path) -> Figment {
    figment
        .merge(Toml::file(directory.join(format!("{CONFIG_FILE}.toml"))))
        .merge(Json::file(directory.join(format!("{CONFIG_FILE}.json"))))
        .merge(Yaml::file(directory.join(format!("{CONFIG_FILE}.yaml"))))
        .merge(Yaml::file(directory.join(format!("{CONFIG_FILE}.yml"))))
}

#[cfg(test)]
mod test {
    use figment::Jail;
    use hdzero_programmer::{Elevation, config::DEFAULT_API_BASE};
    use pretty_assertions::assert_eq;

    use super::*;

    fn extract(jail: &Jail, home: &Path) -> figment::Result<Config> {
        config_figment(&[jail.directory().to_path_buf(), home.to_path_buf()]).extract()
    }

    #[test]
    fn defaults_without_files_or_environment() {
        Jail::expect_with(|jail| {
            let config = extract(jail, &jail.directory().join("home"))?;

            assert_eq!(config, Config::default());
            assert_eq!(config.catalog.api_base, DEFAULT_API_BASE);
            Ok(())
        });
    }

    #[test]
    fn working_directory_wins_over_home() {
        Jail::expect_with(|jail| {
            std::fs::create_dir(jail.directory().join("home")).unwrap();
            jail.create_file(
                "home/.hdzero-programmer.toml",
                r#"
                    elevation = "none"

                    [flashrom]
                    programmer = "ch341a_spi:spispeed=1M"
                "#,
            )?;
            jail.create_file(
                ".hdzero-programmer.yaml",
                "flashrom:\n  programmer: serprog:dev=/dev/ttyACM0\n",
            )?;

            let config = extract(jail, &jail.directory().join("home"))?;

            assert_eq!(config.flashrom.programmer, "serprog:dev=/dev/ttyACM0");
            assert_eq!(config.elevation, Elevation::None);
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_files() {
        Jail::expect_with(|jail| {
            jail.create_file(
                ".hdzero-programmer.json",
                r#"{ "catalog": { "api_base": "https://mirror.example", "download_timeout_secs": 60 } }"#,
            )?;
            jail.set_env("HDZERO_API_BASE", "http://localhost:8080");
            jail.set_env("HDZERO_CATALOG__LISTING_TIMEOUT_SECS", "5");
            jail.set_env("HDZERO_ELEVATION", "pkexec");

            let config = extract(jail, &jail.directory().join("home"))?;

            assert_eq!(config.catalog.api_base, "http://localhost:8080");
            assert_eq!(config.catalog.listing_timeout_secs, 5);
            assert_eq!(config.catalog.download_timeout_secs, 60);
            assert_eq!(config.elevation, Elevation::Pkexec);
            Ok(())
        });
    }

    #[test]
    fn unknown_keys_are_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file(".hdzero-programmer.toml", "api_url = \"https://old\"\n")?;

            assert!(extract(jail, &jail.directory().join("home")).is_err());
            Ok(())
        });
    }

    #[test]
    fn command_line_overrides_configuration() {
        let cli = Cli::parse_from([
            "hdzero-programmer",
            "--api-base",
            "http://127.0.0.1:3000",
            "--flashrom",
            "/opt/flashrom/bin/flashrom",
            "--log-level",
            "debug",
        ]);
        let mut config = Config::default();

        cli.apply(&mut config);

        assert_eq!(config.catalog.api_base, "http://127.0.0.1:3000");
        assert_eq!(
            config.flashrom.path.as_deref(),
            Some(Path::new("/opt/flashrom/bin/flashrom"))
        );
        assert_eq!(config.flashrom.programmer, "ch341a_spi");
        assert_eq!(cli.log_level, Some(LevelFilter::Debug));
    }
}
