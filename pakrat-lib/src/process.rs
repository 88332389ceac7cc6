//! External process execution with live output streaming
//!
//! One child process per invocation. Two background readers feed a single
//! queue that the caller's task drains until both streams reach EOF; the
//! exit status is then awaited, so completion always observes the exit
//! signal and a fully drained queue. Cancellation unblocks the draining
//! loop promptly but does not kill the child.

use crate::elevation;
use crate::env::EnvStore;
use crate::error::{PakratError, Result};
use crate::exit_codes::{self, WELL_KNOWN_SUCCESS};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Delay after process exit to let file operations settle, skipped when
/// `no_sleep` is set.
const POST_RUN_SETTLE: Duration = Duration::from_secs(2);

/// Which stream a captured line arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// A single line of child-process output, tagged by stream, in arrival
/// order.
#[derive(Debug, Clone)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
}

/// Window style for the child process. Minimized needs a full startup-info
/// block; only Hidden maps to a creation flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowStyle {
    #[default]
    Normal,
    Minimized,
    Hidden,
}

/// One process invocation. Constructed per call, consumed once.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    /// Executable path or PATH-resolved command name.
    pub executable: String,
    /// Argument string, logged as part of the command line.
    pub arguments: String,
    /// Defaults to the current location, or the temp directory when the
    /// current location is a network path.
    pub working_directory: Option<PathBuf>,
    pub elevated: bool,
    pub window_style: WindowStyle,
    /// Skip the post-run settle delay.
    pub no_sleep: bool,
    /// Exit codes treated as non-fatal. Empty means `[0]`.
    pub valid_exit_codes: Vec<i32>,
    /// Extra arguments passed to the child but excluded from logs and
    /// error messages.
    pub sensitive_arguments: Option<String>,
}

impl ProcessRequest {
    pub fn new(executable: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            arguments: arguments.into(),
            working_directory: None,
            elevated: false,
            window_style: WindowStyle::Normal,
            no_sleep: false,
            valid_exit_codes: vec![0],
            sensitive_arguments: None,
        }
    }
}

/// Result of one completed process invocation.
#[derive(Debug, Clone)]
pub struct ProcessResult {
    pub exit_code: i32,
    pub output: Vec<OutputLine>,
}

/// Executes one external process to completion (or cancellation), streaming
/// its output and classifying the exit code.
pub struct ProcessRunner {
    env: EnvStore,
    cancel: CancellationToken,
}

impl ProcessRunner {
    pub fn new(env: EnvStore) -> Self {
        Self::with_cancellation(env, CancellationToken::new())
    }

    pub fn with_cancellation(env: EnvStore, cancel: CancellationToken) -> Self {
        Self { env, cancel }
    }

    /// Token shared for the lifetime of this invocation; triggering it
    /// unblocks the draining loop. Triggering it again is a no-op.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the process and apply exit-code policy: codes outside the valid
    /// set are fatal; valid-but-unusual codes are warned about and
    /// normalized to `0`.
    pub async fn run(&self, request: &ProcessRequest) -> Result<ProcessResult> {
        let mut noop = |_line: &OutputLine| {};
        let (result, command) = self.execute(request, &mut noop).await?;
        self.interpret_exit_code(result, request, &command)
    }

    /// Like [`run`](Self::run), surfacing each output line to `observer` as
    /// it arrives.
    pub async fn run_with_observer<F>(
        &self,
        request: &ProcessRequest,
        mut observer: F,
    ) -> Result<ProcessResult>
    where
        F: FnMut(&OutputLine),
    {
        let (result, command) = self.execute(request, &mut observer).await?;
        self.interpret_exit_code(result, request, &command)
    }

    /// Run without exit-code policy; the caller interprets the raw exit
    /// code itself (used for tools with their own exit-code tables).
    pub async fn run_raw<F>(
        &self,
        request: &ProcessRequest,
        mut observer: F,
    ) -> Result<ProcessResult>
    where
        F: FnMut(&OutputLine),
    {
        let (result, _) = self.execute(request, &mut observer).await?;
        Ok(result)
    }

    async fn execute<F>(
        &self,
        request: &ProcessRequest,
        observer: &mut F,
    ) -> Result<(ProcessResult, String)>
    where
        F: FnMut(&OutputLine),
    {
        let executable = normalize_executable(&request.executable)?;
        let executable = self.resolve_executable(&executable);
        let arguments = request.arguments.replace('\0', "");
        let command_line = format!("\"{}\" {}", executable.display(), arguments);

        let marker = PathBuf::from(format!("{}.istext", executable.display()));
        if marker.exists() {
            return Err(PakratError::Process {
                command: command_line,
                exit_code: 4,
                reason: format!(
                    "The file was a text file but is attempting to be run as an executable - '{}'",
                    executable.display()
                ),
            });
        }

        if request.elevated {
            if elevation::process_is_elevated() {
                debug!("Process already has elevated rights, no elevation needed");
            } else {
                debug!("Elevation requested; running best-effort with the current token");
            }
        }

        let working_directory = self.working_directory(request);
        debug!(
            "{} [{}]. This may take a while, depending on the statements.",
            if request.elevated {
                "Elevating permissions and running"
            } else {
                "Running"
            },
            command_line
        );

        let mut command = Command::new(&executable);
        self.apply_arguments(&mut command, request, &arguments);
        command
            .current_dir(&working_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| PakratError::ProcessStart {
            executable: executable.display().to_string(),
            message: e.to_string(),
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PakratError::Unknown("child stdout was not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| PakratError::Unknown("child stderr was not captured".into()))?;

        let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
        let tx_err = tx.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(text)) = lines.next_line().await {
                if tx
                    .send(OutputLine {
                        stream: OutputStream::Stdout,
                        text,
                    })
                    .is_err()
                {
                    break;
                }
            }
        });
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(text)) = lines.next_line().await {
                if tx_err
                    .send(OutputLine {
                        stream: OutputStream::Stderr,
                        text,
                    })
                    .is_err()
                {
                    break;
                }
            }
        });

        // wait() is awaited only after the queue completes; waiting alone is
        // unreliable while the output streams are still flushing.
        let wait = tokio::spawn(async move { child.wait().await });

        debug!("Waiting for process to exit");

        let mut output = Vec::new();
        loop {
            tokio::select! {
                maybe = rx.recv() => match maybe {
                    Some(line) => {
                        match line.stream {
                            OutputStream::Stdout => debug!("{}", line.text),
                            OutputStream::Stderr => error!("{}", line.text),
                        }
                        observer(&line);
                        output.push(line);
                    }
                    // Both readers reached EOF and the queue is drained.
                    None => break,
                },
                _ = self.cancel.cancelled() => {
                    // The child is deliberately not killed; only this call
                    // returns.
                    warn!(
                        "Cancellation requested; returning without waiting for '{}'",
                        executable.display()
                    );
                    return Err(PakratError::Cancelled);
                }
            }
        }

        let status = wait
            .await
            .map_err(|e| PakratError::Unknown(format!("process wait task failed: {e}")))??;
        let exit_code = match status.code() {
            Some(code) => code,
            None => {
                warn!("Process '{}' was terminated by a signal", executable.display());
                -1
            }
        };

        if !request.no_sleep {
            tokio::select! {
                _ = tokio::time::sleep(POST_RUN_SETTLE) => {}
                _ = self.cancel.cancelled() => {}
            }
        }

        debug!("Command [{}] exited with '{}'.", command_line, exit_code);

        Ok((ProcessResult { exit_code, output }, command_line))
    }

    #[cfg(windows)]
    fn apply_arguments(&self, command: &mut Command, request: &ProcessRequest, arguments: &str) {
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;

        let mut full = arguments.to_string();
        if let Some(sensitive) = &request.sensitive_arguments {
            full.push(' ');
            full.push_str(sensitive);
        }
        if !full.trim().is_empty() {
            command.raw_arg(full);
        }
        if request.window_style == WindowStyle::Hidden {
            command.creation_flags(CREATE_NO_WINDOW);
        }
    }

    #[cfg(not(windows))]
    fn apply_arguments(&self, command: &mut Command, request: &ProcessRequest, arguments: &str) {
        let mut argv = split_arguments(arguments);
        if let Some(sensitive) = &request.sensitive_arguments {
            argv.extend(split_arguments(sensitive));
        }
        command.args(argv);
    }

    fn interpret_exit_code(
        &self,
        mut result: ProcessResult,
        request: &ProcessRequest,
        command: &str,
    ) -> Result<ProcessResult> {
        let exit_code = result.exit_code;
        let reason = exit_codes::reason(exit_code);
        if let Some(reason) = reason {
            warn!("{}", reason);
        }

        let default_valid = [0];
        let valid: &[i32] = if request.valid_exit_codes.is_empty() {
            &default_valid
        } else {
            &request.valid_exit_codes
        };

        if !valid.contains(&exit_code) {
            let reason = match reason {
                Some(r) => format!("Exit code indicates the following: {r}"),
                None => "See log for possible error messages.".to_string(),
            };
            return Err(PakratError::Process {
                command: command.to_string(),
                exit_code,
                reason,
            });
        }

        if !WELL_KNOWN_SUCCESS.contains(&exit_code) {
            warn!(
                "Exit code '{}' was considered valid by configuration, but not as a normal success code. Returning '0'.",
                exit_code
            );
            result.exit_code = 0;
        }

        Ok(result)
    }

    fn resolve_executable(&self, name: &str) -> PathBuf {
        if name.eq_ignore_ascii_case("msiexec") || name.eq_ignore_ascii_case("msiexec.exe") {
            let system_root = self
                .env
                .get_nonblank("SystemRoot")
                .unwrap_or(r"C:\Windows");
            return Path::new(system_root).join("System32").join("msiexec.exe");
        }

        let path = Path::new(name);
        if path.exists() {
            return path.to_path_buf();
        }

        match which::which(name) {
            Ok(found) => found,
            Err(_) => {
                warn!(
                    "May not be able to find '{}'. Please use full path for executables.",
                    name
                );
                PathBuf::from(name)
            }
        }
    }

    fn working_directory(&self, request: &ProcessRequest) -> PathBuf {
        if let Some(dir) = &request.working_directory {
            return dir.clone();
        }

        match std::env::current_dir() {
            Ok(dir) if !is_network_path(&dir) => dir,
            _ => {
                debug!("Unable to use current location for Working Directory. Using temp location instead.");
                std::env::temp_dir()
            }
        }
    }
}

fn normalize_executable(raw: &str) -> Result<String> {
    let cleaned = raw.replace('\0', "");
    let trimmed = cleaned
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim();
    if trimmed.is_empty() {
        return Err(PakratError::Configuration(
            "Process name was empty after normalization; an executable path or name is required"
                .into(),
        ));
    }
    Ok(trimmed.to_string())
}

fn is_network_path(path: &Path) -> bool {
    path.to_string_lossy().starts_with(r"\\")
}

/// Split an argument string into argv entries, honoring single and double
/// quotes. Windows passes the string through verbatim instead.
#[cfg(not(windows))]
fn split_arguments(arguments: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut has_token = false;

    for c in arguments.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None => match c {
                '"' | '\'' => {
                    quote = Some(c);
                    has_token = true;
                }
                c if c.is_whitespace() => {
                    if has_token {
                        args.push(std::mem::take(&mut current));
                        has_token = false;
                    }
                }
                c => {
                    current.push(c);
                    has_token = true;
                }
            },
        }
    }
    if has_token {
        args.push(current);
    }

    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> ProcessRunner {
        ProcessRunner::new(EnvStore::empty())
    }

    fn result_with_code(exit_code: i32) -> ProcessResult {
        ProcessResult {
            exit_code,
            output: Vec::new(),
        }
    }

    #[test]
    fn normalize_strips_quotes_and_nul() {
        assert_eq!(
            normalize_executable("  \"C:\\tools\\setup.exe\"  ").unwrap(),
            "C:\\tools\\setup.exe"
        );
        assert_eq!(normalize_executable("set\0up").unwrap(), "setup");
        assert!(matches!(
            normalize_executable("  \"\"  "),
            Err(PakratError::Configuration(_))
        ));
    }

    #[cfg(not(windows))]
    #[test]
    fn split_arguments_honors_quotes() {
        assert_eq!(
            split_arguments(r#"/i "C:\some dir\pkg.msi" /qn"#),
            vec!["/i", r"C:\some dir\pkg.msi", "/qn"]
        );
        assert_eq!(split_arguments("-c 'echo hi'"), vec!["-c", "echo hi"]);
        assert_eq!(split_arguments("   "), Vec::<String>::new());
        assert_eq!(split_arguments("\"\""), vec![""]);
    }

    #[test]
    fn valid_zero_exit_stays_zero() {
        let request = ProcessRequest::new("setup.exe", "/S");
        let result = runner()
            .interpret_exit_code(result_with_code(0), &request, "[\"setup.exe\" /S]")
            .unwrap();
        assert_eq!(result.exit_code, 0);
    }

    #[test]
    fn reboot_code_valid_by_caller_is_not_normalized() {
        let mut request = ProcessRequest::new("setup.exe", "/S");
        request.valid_exit_codes = vec![0, 3010];
        let result = runner()
            .interpret_exit_code(result_with_code(3010), &request, "[\"setup.exe\" /S]")
            .unwrap();
        assert_eq!(result.exit_code, 3010);
    }

    #[test]
    fn unusual_valid_code_is_normalized_to_zero() {
        let mut request = ProcessRequest::new("setup.exe", "/S");
        request.valid_exit_codes = vec![0, 21];
        let result = runner()
            .interpret_exit_code(result_with_code(21), &request, "[\"setup.exe\" /S]")
            .unwrap();
        assert_eq!(result.exit_code, 0);
    }

    #[test]
    fn invalid_exit_code_is_fatal_with_reason() {
        let request = ProcessRequest::new("msiexec", "/i \"bad.msi\"");
        let err = runner()
            .interpret_exit_code(result_with_code(1619), &request, "\"msiexec\" /i \"bad.msi\"")
            .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("1619"));
        assert!(text.contains("corrupt") || text.contains("not an MSI"));
    }

    #[test]
    fn unknown_invalid_code_points_at_the_log() {
        let request = ProcessRequest::new("setup.exe", "/S");
        let err = runner()
            .interpret_exit_code(result_with_code(77), &request, "\"setup.exe\" /S")
            .unwrap_err();
        assert!(err.to_string().contains("See log for possible error messages."));
    }

    #[test]
    fn empty_valid_set_defaults_to_zero_only() {
        let mut request = ProcessRequest::new("setup.exe", "");
        request.valid_exit_codes = Vec::new();
        assert!(runner()
            .interpret_exit_code(result_with_code(1), &request, "\"setup.exe\" ")
            .is_err());
        assert!(runner()
            .interpret_exit_code(result_with_code(0), &request, "\"setup.exe\" ")
            .is_ok());
    }
}
