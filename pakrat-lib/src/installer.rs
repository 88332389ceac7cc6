//! Windows installer dispatch
//!
//! Routes MSI/MSP/MSU/EXE installers through the process runner with the
//! conventional silent invocation for each type.

use crate::arch;
use crate::env::{vars, EnvStore};
use crate::error::{PakratError, Result};
use crate::process::{ProcessRequest, ProcessRunner};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Known installer types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallerKind {
    Msi,
    Msp,
    Msu,
    Exe,
}

impl InstallerKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "msi" => Some(InstallerKind::Msi),
            "msp" => Some(InstallerKind::Msp),
            "msu" => Some(InstallerKind::Msu),
            "exe" => Some(InstallerKind::Exe),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstallerKind::Msi => "msi",
            InstallerKind::Msp => "msp",
            InstallerKind::Msu => "msu",
            InstallerKind::Exe => "exe",
        }
    }
}

/// One installer invocation.
#[derive(Debug, Clone)]
pub struct InstallRequest {
    pub package_name: String,
    /// 32-bit (or only) installer file.
    pub file: Option<PathBuf>,
    /// 64-bit installer file.
    pub file64: Option<PathBuf>,
    /// Explicit installer type; inferred from the file extension when
    /// unset.
    pub file_type: Option<String>,
    pub silent_arguments: Vec<String>,
    /// Ignore the package silent arguments in favor of the environment's
    /// install arguments.
    pub use_only_install_arguments: bool,
    pub valid_exit_codes: Vec<i32>,
    pub elevated: bool,
}

impl InstallRequest {
    pub fn new(package_name: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            file: None,
            file64: None,
            file_type: None,
            silent_arguments: Vec::new(),
            use_only_install_arguments: false,
            valid_exit_codes: vec![0],
            elevated: true,
        }
    }
}

/// Install a package via its native installer. Returns the (normalized)
/// exit code and records it in the environment store.
pub async fn install(
    request: &InstallRequest,
    env: &mut EnvStore,
    runner: &ProcessRunner,
) -> Result<i32> {
    let (file_path, bitness_message) = select_install_file(request, env, arch::width())?;

    info!("Installing {}{}...", bitness_message, request.package_name);

    let file_type = match request.file_type.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        Some(file_type) => file_type.to_lowercase(),
        None => {
            debug!("No file type supplied. Using the file extension to determine the type");
            file_path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default()
                .to_lowercase()
        }
    };

    let kind = match InstallerKind::from_name(&file_type) {
        Some(kind) => kind,
        None => {
            warn!(
                "File type '{}' is unrecognised, using 'exe' instead.",
                file_type
            );
            InstallerKind::Exe
        }
    };
    env.set(vars::INSTALLER_TYPE, kind.as_str());

    let silent_args = request.silent_arguments.join(" ");
    let additional_args = env
        .get_nonblank(vars::INSTALL_ARGUMENTS)
        .unwrap_or("")
        .to_string();

    let arguments = if request.use_only_install_arguments || env.is_true(vars::INSTALL_OVERRIDE) {
        info!(
            "Overriding package arguments with '{}' (replacing '{}')",
            additional_args, silent_args
        );
        additional_args.clone()
    } else {
        format!("{} {}", silent_args, additional_args)
            .trim()
            .to_string()
    };

    ensure_argument_directories(&[silent_args.as_str(), additional_args.as_str()]);

    let working_directory = match file_path.parent() {
        Some(parent) if parent != Path::new("") => Some(parent.to_path_buf()),
        _ => {
            warn!(
                "Unable to set the working directory for installer to location of '{}'",
                file_path.display()
            );
            None
        }
    };

    let (executable, arguments) = installer_command(kind, &file_path, &arguments, env);

    let mut process_request = ProcessRequest::new(executable, arguments);
    process_request.working_directory = working_directory;
    process_request.elevated = request.elevated;
    if !request.valid_exit_codes.is_empty() {
        process_request.valid_exit_codes = request.valid_exit_codes.clone();
    }

    let result = runner.run(&process_request).await?;
    env.set(vars::EXIT_CODE, result.exit_code.to_string());

    info!("{} has been installed", request.package_name);
    Ok(result.exit_code)
}

/// Select the installer file for the effective architecture.
fn select_install_file(
    request: &InstallRequest,
    env: &EnvStore,
    width: u32,
) -> Result<(PathBuf, &'static str)> {
    let force_x86 = env.is_true(vars::FORCE_X86);

    if width == 32 || force_x86 {
        let file = request.file.clone().ok_or_else(|| {
            PakratError::Configuration(format!(
                "32-bit installation is not supported for {}",
                request.package_name
            ))
        })?;
        let bitness = if request.file64.is_some() { "32-bit " } else { "" };
        return Ok((file, bitness));
    }

    if let Some(file64) = &request.file64 {
        return Ok((file64.clone(), "64-bit "));
    }

    let file = request.file.clone().ok_or_else(|| {
        PakratError::Configuration(
            "Package parameters incorrect, either File or File64 must be specified.".into(),
        )
    })?;
    Ok((file, ""))
}

/// Executable and argument line for each installer type.
fn installer_command(
    kind: InstallerKind,
    file_path: &Path,
    arguments: &str,
    env: &EnvStore,
) -> (String, String) {
    match kind {
        InstallerKind::Msi => (
            "msiexec".to_string(),
            format!("/i \"{}\" {}", file_path.display(), arguments),
        ),
        InstallerKind::Msp => (
            "msiexec".to_string(),
            format!("/update \"{}\" {}", file_path.display(), arguments),
        ),
        InstallerKind::Msu => {
            let system_root = env.get_nonblank("SystemRoot").unwrap_or(r"C:\Windows");
            let wusa = Path::new(system_root).join("System32").join("wusa.exe");
            (
                wusa.display().to_string(),
                format!("\"{}\" {}", file_path.display(), arguments),
            )
        }
        InstallerKind::Exe => (file_path.display().to_string(), arguments.to_string()),
    }
}

fn path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?:['"])(([a-zA-Z]:|\.)\\[^'"]+)(?:["'])|(([a-zA-Z]:|\.)\\[\S]+)"#)
            .expect("path pattern is valid")
    })
}

/// Pre-create directories for path-shaped arguments (MSI logging requires
/// the log directory to exist). Failures are absorbed.
fn ensure_argument_directories(argument_strings: &[&str]) {
    for arguments in argument_strings {
        for captures in path_pattern().captures_iter(arguments) {
            let path = captures
                .get(1)
                .or_else(|| captures.get(3))
                .map(|m| m.as_str());
            if let Some(path) = path {
                if let Some(parent) = Path::new(path).parent() {
                    debug!("Ensuring {} exists", parent.display());
                    if let Err(e) = std::fs::create_dir_all(parent) {
                        debug!("Error ensuring directories exist - {}", e);
                    }
                }
            }
        }
    }
}
