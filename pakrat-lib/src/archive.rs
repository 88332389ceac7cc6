//! Archive extraction via the 7-Zip command line tool
//!
//! Supported archive formats are listed at:
//! https://sevenzip.osdn.jp/chm/general/formats.htm

use crate::arch;
use crate::env::{vars, EnvStore};
use crate::error::{PakratError, Result};
use crate::process::{OutputStream, ProcessRequest, ProcessRunner, WindowStyle};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One extraction invocation.
#[derive(Debug, Clone)]
pub struct ExtractRequest {
    /// 32-bit (or only) archive.
    pub archive: Option<PathBuf>,
    /// 64-bit archive, chosen when running as a 64-bit process.
    pub archive64: Option<PathBuf>,
    pub package_name: Option<String>,
    pub destination: PathBuf,
    /// Specific directory within the archive to extract.
    pub specific_folder: Option<String>,
    /// Skip the extraction log; speeds up archives with many files.
    pub disable_logging: bool,
}

impl ExtractRequest {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            archive: None,
            archive64: None,
            package_name: None,
            destination: destination.into(),
            specific_folder: None,
            disable_logging: false,
        }
    }
}

/// Extract an archive with 7-Zip and return the destination. The list of
/// extracted entries is logged next to the package folder for subsequent
/// uninstalls, unless logging is disabled.
pub async fn extract(
    request: &ExtractRequest,
    env: &mut EnvStore,
    runner: &ProcessRunner,
) -> Result<PathBuf> {
    if request.archive.is_none() && request.archive64.is_none() {
        return Err(PakratError::Configuration(
            "Parameters are incorrect; either an archive or a 64-bit archive must be specified."
                .into(),
        ));
    }

    let package_name = request
        .package_name
        .clone()
        .or_else(|| env.get_nonblank(vars::PACKAGE_NAME).map(str::to_string))
        .unwrap_or_default();

    let mut bitness_message = "";
    let mut archive = request.archive.clone();
    if arch::matches(32) || env.is_true(vars::FORCE_X86) {
        if request.archive.is_none() {
            return Err(PakratError::Configuration(format!(
                "32-bit archive is not supported for {package_name}"
            )));
        }
        if request.archive64.is_some() {
            bitness_message = "32-bit ";
        }
    } else if let Some(archive64) = &request.archive64 {
        archive = Some(archive64.clone());
        bitness_message = "64-bit ";
    }
    let archive = archive.ok_or_else(|| {
        PakratError::Configuration("No archive is available for this architecture.".into())
    })?;

    let log_path = if request.disable_logging {
        None
    } else {
        env.get_nonblank(vars::PACKAGE_FOLDER).map(|folder| {
            Path::new(folder).join(format!("{}.txt", file_name_of(&archive)))
        })
    };

    info!(
        "Extracting {}{} to {}...",
        bitness_message,
        archive.display(),
        request.destination.display()
    );
    std::fs::create_dir_all(&request.destination)?;

    let seven_zip = locate_seven_zip(env)?;
    debug!("7-Zip found at '{}'", seven_zip.display());

    let options = seven_zip_arguments(
        &request.destination,
        &archive,
        request.disable_logging,
        request.specific_folder.as_deref(),
    );
    debug!("Executing command ['{}' {}]", seven_zip.display(), options);
    let command_line = format!("\"{}\" {}", seven_zip.display(), options);

    let mut process_request = ProcessRequest::new(seven_zip.display().to_string(), options);
    process_request.window_style = WindowStyle::Hidden;
    process_request.no_sleep = true;

    let mut extracted: Vec<String> = Vec::new();
    let result = runner
        .run_raw(&process_request, |line| {
            if line.stream == OutputStream::Stdout {
                if let Some(entry) = extraction_log_entry(&request.destination, &line.text) {
                    extracted.push(entry);
                }
            }
        })
        .await?;

    env.set(vars::EXIT_CODE, result.exit_code.to_string());

    if let Some(log_path) = &log_path {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut contents = extracted.join("\n");
        if !contents.is_empty() {
            contents.push('\n');
        }
        std::fs::write(log_path, contents)?;
    }

    debug!("7-Zip exit code: {}", result.exit_code);

    if result.exit_code != 0 {
        return Err(PakratError::Process {
            command: command_line,
            exit_code: result.exit_code,
            reason: seven_zip_exit_reason(result.exit_code),
        });
    }

    env.set(
        vars::INSTALL_LOCATION,
        request.destination.display().to_string(),
    );

    Ok(request.destination.clone())
}

/// 7-Zip command line: extract with overwrite, no progress indicator, and
/// per-entry output unless logging is disabled.
fn seven_zip_arguments(
    destination: &Path,
    archive: &Path,
    disable_logging: bool,
    specific_folder: Option<&str>,
) -> String {
    let logging_option = if disable_logging { "-bb0" } else { "-bb1" };
    let mut options = format!(
        "x -aoa -bd {} -o\"{}\" -y \"{}\"",
        logging_option,
        destination.display(),
        archive.display()
    );
    if let Some(folder) = specific_folder.map(str::trim).filter(|f| !f.is_empty()) {
        options.push_str(&format!(" \"{folder}\""));
    }
    options
}

/// 7-Zip prints each extracted entry as `- <name>` when `-bb1` is active.
fn extraction_log_entry(destination: &Path, line: &str) -> Option<String> {
    line.strip_prefix("- ")
        .map(|name| destination.join(name).display().to_string())
}

fn seven_zip_exit_reason(exit_code: i32) -> String {
    match exit_code {
        1 => "Some files could not be extracted.".into(),
        2 => "7-Zip encountered a fatal error while extracting the files.".into(),
        7 => "7-Zip command line error.".into(),
        8 => "7-Zip out of memory.".into(),
        255 => "Extraction cancelled by the user.".into(),
        code => format!("7-Zip signalled an unknown error (code {code})"),
    }
}

fn locate_seven_zip(env: &EnvStore) -> Result<PathBuf> {
    if let Some(tools) = env.get_nonblank(vars::TOOLS_LOCATION) {
        for candidate in ["7z.exe", "7zip.exe", "7z"] {
            let path = Path::new(tools).join(candidate);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    which::which("7z")
        .or_else(|_| which::which("7za"))
        .or_else(|_| which::which("7zz"))
        .map_err(|_| {
            PakratError::Configuration(
                "The 7-Zip executable was not found. Set the tools location or add 7z to the search path."
                    .into(),
            )
        })
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_line_matches_the_tool_contract() {
        let options = seven_zip_arguments(
            Path::new(r"C:\tools\pkg"),
            Path::new(r"C:\temp\pkg.zip"),
            false,
            None,
        );
        assert_eq!(
            options,
            r#"x -aoa -bd -bb1 -o"C:\tools\pkg" -y "C:\temp\pkg.zip""#
        );
    }

    #[test]
    fn disabled_logging_switches_to_bb0() {
        let options = seven_zip_arguments(
            Path::new(r"C:\tools\pkg"),
            Path::new(r"C:\temp\pkg.zip"),
            true,
            None,
        );
        assert!(options.contains("-bb0"));
        assert!(!options.contains("-bb1"));
    }

    #[test]
    fn specific_folder_is_appended_quoted() {
        let options = seven_zip_arguments(
            Path::new(r"C:\tools\pkg"),
            Path::new(r"C:\temp\pkg.zip"),
            false,
            Some("bin"),
        );
        assert!(options.ends_with(r#" "bin""#));
    }

    #[test]
    fn extraction_log_lines_are_destination_prefixed() {
        let destination = Path::new("/opt/pkg");
        assert_eq!(
            extraction_log_entry(destination, "- bin/tool.exe"),
            Some("/opt/pkg/bin/tool.exe".to_string())
        );
        assert_eq!(extraction_log_entry(destination, "Extracting archive"), None);
        assert_eq!(extraction_log_entry(destination, "-bb1"), None);
    }

    #[test]
    fn exit_reasons_cover_the_tool_contract() {
        assert!(seven_zip_exit_reason(1).contains("could not be extracted"));
        assert!(seven_zip_exit_reason(2).contains("fatal error"));
        assert!(seven_zip_exit_reason(7).contains("command line"));
        assert!(seven_zip_exit_reason(8).contains("memory"));
        assert!(seven_zip_exit_reason(255).contains("cancelled"));
        assert!(seven_zip_exit_reason(99).contains("unknown error (code 99)"));
    }
}
