//! Pakrat Library
//!
//! Core library for package installation scripts: resilient external-process
//! execution, file downloads with checksum verification, installer dispatch
//! and archive extraction.

pub mod arch;
pub mod archive;
pub mod checksum;
pub mod download;
pub mod elevation;
pub mod env;
pub mod error;
pub mod exit_codes;
pub mod installer;
pub mod process;
pub mod proxy;

pub use checksum::ChecksumType;
pub use download::{DownloadEngine, DownloadRequest};
pub use env::EnvStore;
pub use error::{ErrorKind, PakratError, Result};
pub use exit_codes::ExitCodeClassification;
pub use installer::{InstallRequest, InstallerKind};
pub use process::{OutputLine, OutputStream, ProcessRequest, ProcessResult, ProcessRunner};
