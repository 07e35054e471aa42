//! Locating and invoking the external `flashrom` utility.

use std::{
    env,
    ffi::OsStr,
    fs,
    path::{Path, PathBuf},
};

use crate::{config::FlashromConfig, runner::Invocation};

/// `flashrom` programmer name of the CH341A USB to SPI adapter.
pub const DEFAULT_PROGRAMMER: &str = "ch341a_spi";

/// Install locations checked before falling back to `PATH`.
///
/// GUI applications on macOS do not inherit the shell `PATH`, so the Homebrew
/// prefixes have to be probed explicitly.
const WELL_KNOWN_LOCATIONS: [&str; 5] = [
    "/opt/homebrew/bin/flashrom",
    "/opt/homebrew/sbin/flashrom",
    "/usr/local/bin/flashrom",
    "/usr/local/sbin/flashrom",
    "/usr/bin/flashrom",
];

/// Errors while locating `flashrom`.
#[derive(Debug, thiserror::Error, docsplay::Display)]
pub enum LocateError {
    /// flashrom not found. Install it with `brew install flashrom` or your distribution's package manager.
    NotFound,

    /// The configured flashrom path {0:?} is not an executable file.
    NotExecutable(PathBuf),
}

/// A located `flashrom` binary together with the programmer to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flashrom {
    path: PathBuf,
    programmer: String,
}

impl Flashrom {
    /// Uses the `flashrom` binary at `path` without checking it.
    pub fn new(path: impl Into<PathBuf>, programmer: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            programmer: programmer.into(),
        }
    }

    /// Finds `flashrom` according to `config`.
    ///
    /// An explicitly configured path is used as is, but must point to an
    /// executable file. Otherwise the well-known install locations and then
    /// the directories on `PATH` are searched.
    pub fn locate(config: &FlashromConfig) -> Result<Self, LocateError> {
        if let Some(path) = &config.path {
            return if is_executable(path) {
                Ok(Self::new(path, &config.programmer))
            } else {
                Err(LocateError::NotExecutable(path.clone()))
            };
        }

        let path = search(
            WELL_KNOWN_LOCATIONS.iter().map(PathBuf::from),
            env::var_os("PATH").as_deref(),
        )
        .ok_or(LocateError::NotFound)?;

        tracing::info!("Using flashrom at {:?}", path);

        Ok(Self::new(path, &config.programmer))
    }

    /// Location of the binary.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The programmer passed with `-p`.
    pub fn programmer(&self) -> &str {
        &self.programmer
    }

    /// Whether the binary is still present.
    pub fn is_available(&self) -> bool {
        is_executable(&self.path)
    }

    /// `flashrom -p <programmer> -w <image>`
    pub fn write(&self, image: &Path) -> Invocation {
        Invocation::new(&self.path)
            .args(["-p", self.programmer.as_str(), "-w"])
            .arg(image)
    }

    /// `flashrom -p <programmer> -r <output>`
    pub fn read(&self, output: &Path) -> Invocation {
        Invocation::new(&self.path)
            .args(["-p", self.programmer.as_str(), "-r"])
            .arg(output)
    }
}

/// Returns the first executable among `candidates`, then among the
/// directories of the `PATH`-style list `path_var`.
fn search(
    candidates: impl IntoIterator<Item = PathBuf>,
    path_var: Option<&OsStr>,
) -> Option<PathBuf> {
    let binary = format!("flashrom{}", env::consts::EXE_SUFFIX);
    let on_path = path_var
        .map(|paths| {
            env::split_paths(paths)
                .map(|dir| dir.join(&binary))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    candidates
        .into_iter()
        .chain(on_path)
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    fs::metadata(path)
        .map(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|metadata| metadata.is_file())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use pretty_assertions::assert_eq;

    use super::*;

    #[cfg(unix)]
    fn fake_flashrom(dir: &Path, executable: bool) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("flashrom");
        fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        let mode = if executable { 0o755 } else { 0o644 };
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[test]
    fn write_invocation() {
        let flashrom = Flashrom::new("/usr/local/bin/flashrom", DEFAULT_PROGRAMMER);

        let invocation = flashrom.write(Path::new("/tmp/hdzero_x1.bin"));

        assert_eq!(invocation.program(), Path::new("/usr/local/bin/flashrom"));
        assert_eq!(
            invocation.arguments(),
            &[
                OsString::from("-p"),
                "ch341a_spi".into(),
                "-w".into(),
                "/tmp/hdzero_x1.bin".into(),
            ]
        );
    }

    #[test]
    fn read_invocation_uses_the_configured_programmer() {
        let flashrom = Flashrom::new("flashrom", "ch341a_spi:spispeed=1M");

        let invocation = flashrom.read(Path::new("/home/pilot/HDZero_backup.bin"));

        assert_eq!(
            invocation.arguments(),
            &[
                OsString::from("-p"),
                "ch341a_spi:spispeed=1M".into(),
                "-r".into(),
                "/home/pilot/HDZero_backup.bin".into(),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn configured_path_must_be_executable() {
        let scratch = tempfile::tempdir().unwrap();
        let path = fake_flashrom(scratch.path(), false);
        let config = FlashromConfig {
            path: Some(path.clone()),
            ..Default::default()
        };

        let error = Flashrom::locate(&config).unwrap_err();

        assert!(matches!(error, LocateError::NotExecutable(p) if p == path));
    }

    #[cfg(unix)]
    #[test]
    fn configured_path_is_used() {
        let scratch = tempfile::tempdir().unwrap();
        let path = fake_flashrom(scratch.path(), true);
        let config = FlashromConfig {
            path: Some(path.clone()),
            ..Default::default()
        };

        let flashrom = Flashrom::locate(&config).unwrap();

        assert_eq!(flashrom.path(), path);
        assert_eq!(flashrom.programmer(), DEFAULT_PROGRAMMER);
        assert!(flashrom.is_available());
    }

    #[cfg(unix)]
    #[test]
    fn search_falls_back_to_path() {
        let empty = tempfile::tempdir().unwrap();
        let bin = tempfile::tempdir().unwrap();
        let path = fake_flashrom(bin.path(), true);
        let path_var = env::join_paths([empty.path(), bin.path()]).unwrap();

        let found = search(
            [empty.path().join("flashrom")],
            Some(path_var.as_os_str()),
        );

        assert_eq!(found, Some(path));
    }

    #[cfg(unix)]
    #[test]
    fn search_skips_non_executable_files() {
        let bin = tempfile::tempdir().unwrap();
        fake_flashrom(bin.path(), false);

        assert_eq!(search([], Some(bin.path().as_os_str())), None);
    }
}
