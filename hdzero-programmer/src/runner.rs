//! Running external programs, optionally with elevated privileges.
//!
//! Talking to the CH341A programmer needs raw USB access, which on most
//! systems requires administrator rights. Commands are always described as a
//! program plus an argument vector ([`Invocation`]) and are never assembled
//! into a shell string, so a firmware path containing shell metacharacters is
//! passed through untouched.

use std::{
    ffi::OsString,
    fmt,
    future::Future,
    io,
    path::{Path, PathBuf},
    process::Stdio,
};

use serde::{Deserialize, Serialize};

/// Location of the AppleScript interpreter on macOS.
const OSASCRIPT: &str = "/usr/bin/osascript";

/// Location-independent name of the polkit helper; it is looked up on `PATH`.
const PKEXEC: &str = "pkexec";

/// AppleScript run handler that executes its `argv` as one shell command with
/// administrator privileges. Every element is escaped with `quoted form of`,
/// so arguments reach the shell verbatim.
const APPLESCRIPT_RUN_HANDLER: [&str; 7] = [
    "on run argv",
    "set shellCommand to \"\"",
    "repeat with anArgument in argv",
    "set shellCommand to shellCommand & quoted form of (anArgument as text) & \" \"",
    "end repeat",
    "do shell script shellCommand with administrator privileges",
    "end run",
];

/// A single program invocation: the program to start and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: PathBuf,
    args: Vec<OsString>,
}

impl Invocation {
    /// Creates an invocation of `program` without arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends a single argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The program that is started.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// The arguments passed to the program.
    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }
}

/// Renders the invocation the way a POSIX shell user would type it.
///
/// This is for log output only; the invocation is never executed through a shell.
impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote_for_display(&self.program.to_string_lossy()))?;
        for arg in &self.args {
            write!(f, " {}", quote_for_display(&arg.to_string_lossy()))?;
        }
        Ok(())
    }
}

fn quote_for_display(value: &str) -> String {
    let is_plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./=:,+@%".contains(c));

    if is_plain {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

/// Captured result of a finished program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was terminated by a signal.
    pub status: Option<i32>,
    /// Everything the program wrote to stdout.
    pub stdout: String,
    /// Everything the program wrote to stderr.
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the program exited with status zero.
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

impl From<std::process::Output> for CommandOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Errors that prevent a program from running at all.
///
/// A program that starts and then fails (including a dismissed password
/// prompt) is not an error here; it is reported through [`CommandOutput::status`].
#[derive(Debug, thiserror::Error, docsplay::Display)]
pub enum RunnerError {
    /// Failed to start {program:?}.
    Spawn {
        /// The program that could not be started.
        program: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },
}

/// Something that can execute an [`Invocation`] and capture its output.
pub trait CommandRunner: Send + Sync {
    /// Runs the invocation to completion.
    fn run(
        &self,
        invocation: &Invocation,
    ) -> impl Future<Output = Result<CommandOutput, RunnerError>> + Send;
}

/// How a command obtains the privileges needed to access the programmer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Elevation {
    /// Pick the native mechanism of the current operating system.
    #[default]
    Auto,
    /// Use polkit's `pkexec`, which shows a graphical password prompt.
    Pkexec,
    /// Use `osascript` with `administrator privileges` (macOS).
    Osascript,
    /// Run the command directly, e.g. when udev rules already grant access.
    None,
}

impl Elevation {
    /// Resolves [`Elevation::Auto`] to the mechanism used on this platform.
    pub fn resolve(self) -> Self {
        match self {
            Self::Auto if cfg!(target_os = "macos") => Self::Osascript,
            Self::Auto if cfg!(target_os = "linux") => Self::Pkexec,
            Self::Auto => Self::None,
            other => other,
        }
    }
}

/// Runs commands after asking the user for one-time elevated privileges.
#[derive(Debug, Clone, Copy)]
pub struct PrivilegedRunner {
    elevation: Elevation,
}

impl PrivilegedRunner {
    /// Creates a runner using the given elevation mechanism.
    pub fn new(elevation: Elevation) -> Self {
        Self {
            elevation: elevation.resolve(),
        }
    }

    /// The elevation mechanism in effect.
    pub fn elevation(&self) -> Elevation {
        self.elevation
    }

    /// Wraps `invocation` into the invocation of the privilege helper.
    pub fn elevate(&self, invocation: &Invocation) -> Invocation {
        match self.elevation {
            Elevation::Pkexec => Invocation::new(PKEXEC)
                .arg(invocation.program())
                .args(invocation.arguments().iter().cloned()),
            Elevation::Osascript => APPLESCRIPT_RUN_HANDLER
                .iter()
                .fold(Invocation::new(OSASCRIPT), |script, line| {
                    script.arg("-e").arg(*line)
                })
                .arg(invocation.program())
                .args(invocation.arguments().iter().cloned()),
            Elevation::None | Elevation::Auto => invocation.clone(),
        }
    }
}

impl CommandRunner for PrivilegedRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, RunnerError> {
        let elevated = self.elevate(invocation);

        tracing::info!("Running {} ({:?})", invocation, self.elevation);
        tracing::debug!("Elevated invocation: {}", elevated);

        let output = tokio::process::Command::new(elevated.program())
            .args(elevated.arguments())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| RunnerError::Spawn {
                program: elevated.program().to_path_buf(),
                source,
            })?;

        let output = CommandOutput::from(output);
        tracing::debug!("{} exited with {:?}", invocation.program().display(), output.status);

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    use super::*;

    fn flashrom_write() -> Invocation {
        Invocation::new("/usr/local/bin/flashrom").args([
            "-p",
            "ch341a_spi",
            "-w",
            "/tmp/my \"fw\"; rm -rf ~.bin",
        ])
    }

    #[test]
    fn pkexec_prefixes_the_argument_vector() {
        let elevated = PrivilegedRunner::new(Elevation::Pkexec).elevate(&flashrom_write());

        assert_eq!(elevated.program(), Path::new("pkexec"));
        assert_eq!(
            elevated.arguments(),
            &[
                OsString::from("/usr/local/bin/flashrom"),
                "-p".into(),
                "ch341a_spi".into(),
                "-w".into(),
                "/tmp/my \"fw\"; rm -rf ~.bin".into(),
            ]
        );
    }

    #[test]
    fn osascript_passes_arguments_outside_the_script() {
        let elevated = PrivilegedRunner::new(Elevation::Osascript).elevate(&flashrom_write());
        let args = elevated.arguments();

        assert_eq!(elevated.program(), Path::new(OSASCRIPT));

        let script_len = APPLESCRIPT_RUN_HANDLER.len() * 2;
        for pair in args[..script_len].chunks(2) {
            assert_eq!(pair[0], "-e");
            assert!(!pair[1].to_string_lossy().contains("flashrom"));
            assert!(!pair[1].to_string_lossy().contains("rm -rf"));
        }
        let mut expected = vec![OsString::from("/usr/local/bin/flashrom")];
        expected.extend(flashrom_write().arguments().iter().cloned());
        assert_eq!(&args[script_len..], expected.as_slice());
    }

    #[test]
    fn no_elevation_runs_the_invocation_unchanged() {
        let invocation = flashrom_write();

        assert_eq!(
            PrivilegedRunner::new(Elevation::None).elevate(&invocation),
            invocation
        );
    }

    #[test]
    fn auto_elevation_resolves_to_a_concrete_mechanism() {
        assert_ne!(Elevation::Auto.resolve(), Elevation::Auto);
        assert_eq!(Elevation::Pkexec.resolve(), Elevation::Pkexec);
    }

    #[test_case("plain", "plain")]
    #[test_case("/tmp/a b.bin", "'/tmp/a b.bin'")]
    #[test_case("it's", r"'it'\''s'")]
    #[test_case("", "''")]
    fn display_quoting(input: &str, expected: &str) {
        assert_eq!(quote_for_display(input), expected);
    }

    #[test]
    fn display_renders_a_shell_line() {
        assert_eq!(
            flashrom_write().to_string(),
            r#"/usr/local/bin/flashrom -p ch341a_spi -w '/tmp/my "fw"; rm -rf ~.bin'"#
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_output_and_exit_status() {
        let runner = PrivilegedRunner::new(Elevation::None);
        let invocation =
            Invocation::new("/bin/sh").args(["-c", "echo flashed; echo 'no chip' >&2; exit 3"]);

        let output = runner.run(&invocation).await.unwrap();

        assert_eq!(output.status, Some(3));
        assert!(!output.success());
        assert_eq!(output.stdout, "flashed\n");
        assert_eq!(output.stderr, "no chip\n");
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let runner = PrivilegedRunner::new(Elevation::None);

        let error = runner
            .run(&Invocation::new("/nonexistent/flashrom"))
            .await
            .unwrap_err();

        assert!(matches!(error, RunnerError::Spawn { .. }));
    }
}
