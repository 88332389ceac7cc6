//! Download engine with caching, checksum verification and proxy support
//!
//! Resolution applies environment overrides ahead of caller-supplied values,
//! then selects the 32/64-bit URL and checksum pair. A file is returned only
//! after it passed checksum or content-length validation, except for local
//! copy operations where the source is already trusted.

use crate::arch;
use crate::checksum::{self, ChecksumType};
use crate::env::{vars, EnvStore};
use crate::error::{PakratError, Result};
use crate::proxy;
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use reqwest::redirect::Policy;
use reqwest::Client;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_USER_AGENT: &str = "pakrat/0.1";
const MAX_REDIRECTS: usize = 20;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(300);

/// Bytes written to disk per chunk.
const CHUNK_SIZE: usize = 1024 * 1024;
/// Progress is reported every this many chunks.
const PROGRESS_INTERVAL: u64 = 10;
/// Pause after transfer to let file operations settle before validation.
const FS_SETTLE: Duration = Duration::from_secs(2);

/// One download invocation. Environment overrides (URL, checksum,
/// force-32-bit) take precedence over these fields at resolution time.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub package_name: String,
    pub url: Option<String>,
    /// Distinct 64-bit URL, chosen when running as a 64-bit process.
    pub url64: Option<String>,
    pub destination: PathBuf,
    pub checksum: Option<String>,
    pub checksum_type: Option<ChecksumType>,
    pub checksum64: Option<String>,
    pub checksum_type64: Option<ChecksumType>,
    /// Additional request headers.
    pub headers: Vec<(String, String)>,
    /// Rename the destination to the name the remote side suggests.
    pub use_original_file_name: bool,
    pub force_download: bool,
}

impl DownloadRequest {
    pub fn new(package_name: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            package_name: package_name.into(),
            url: None,
            url64: None,
            destination: destination.into(),
            checksum: None,
            checksum_type: None,
            checksum64: None,
            checksum_type64: None,
            headers: Vec::new(),
            use_original_file_name: false,
            force_download: false,
        }
    }
}

/// URL and checksum pair effective after overrides and bit-width selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveDownload {
    pub url: String,
    pub checksum: Option<String>,
    pub checksum_type: ChecksumType,
    /// Label for user-facing messages: "", "32 bit" or "64 bit".
    pub bitness: &'static str,
}

/// FTP transfers are delegated to an external collaborator.
pub trait FtpFetcher: Send + Sync {
    fn fetch(&self, url: &str, destination: &Path) -> Result<()>;
}

struct FtpUnsupported;

impl FtpFetcher for FtpUnsupported {
    fn fetch(&self, url: &str, _destination: &Path) -> Result<()> {
        Err(PakratError::Network {
            url: url.to_string(),
            message: "No FTP transfer collaborator is configured.".into(),
        })
    }
}

/// Resolve the effective URL/checksum pair for the current process bit
/// width.
pub fn resolve(request: &DownloadRequest, env: &EnvStore) -> Result<EffectiveDownload> {
    resolve_for_width(request, env, arch::width())
}

/// Resolution order: environment URL overrides, environment checksum
/// overrides, then bit-width selection. The force-32-bit flag wins over the
/// process bit width.
pub fn resolve_for_width(
    request: &DownloadRequest,
    env: &EnvStore,
    width: u32,
) -> Result<EffectiveDownload> {
    let mut url = nonblank(request.url.as_deref());
    let mut url64 = nonblank(request.url64.as_deref());

    if let Some(over) = env.get_nonblank(vars::URL_OVERRIDE) {
        url = Some(over.to_string());
    }
    if let Some(over) = env.get_nonblank(vars::URL64_OVERRIDE) {
        url64 = Some(over.to_string());
    }

    let mut url = url.map(|u| normalize_url_slashes(&u));
    let url64 = url64.map(|u| normalize_url_slashes(&u));

    let mut checksum = nonblank(request.checksum.as_deref());
    let mut checksum_type = request.checksum_type;
    let mut checksum64 = nonblank(request.checksum64.as_deref());
    let mut checksum_type64 = request.checksum_type64;

    if let Some(over) = env.get_nonblank(vars::CHECKSUM32) {
        checksum = Some(over.to_string());
    }
    if let Some(over) = env.get_nonblank(vars::CHECKSUM_TYPE32) {
        if let Ok(parsed) = over.parse::<ChecksumType>() {
            checksum_type = Some(parsed);
        }
    }
    if let Some(over) = env.get_nonblank(vars::CHECKSUM64) {
        checksum64 = Some(over.to_string());
    }
    if let Some(over) = env.get_nonblank(vars::CHECKSUM_TYPE64) {
        if let Ok(parsed) = over.parse::<ChecksumType>() {
            checksum_type64 = Some(parsed);
        }
    }

    let url32 = url.clone();
    let checksum32 = checksum.clone();
    let checksum_type32 = checksum_type;

    debug!("CPU is {} bit", width);

    let distinct64 = url64.is_some() && url64 != url32;
    let mut bitness = if distinct64 { "32 bit" } else { "" };

    if width == 64 && url64.is_some() {
        debug!("Setting url to the 64-bit variant");
        bitness = "64 bit";
        url = url64;
        // only switch the checksum pair when the urls actually differ
        if distinct64 {
            checksum = checksum64;
            if checksum_type64.is_some() {
                checksum_type = checksum_type64;
            }
        }
    }

    if env.is_true(vars::FORCE_X86) {
        debug!("Force 32-bit was requested, using the 32-bit url");
        if distinct64 {
            bitness = "32 bit";
        }
        url = url32;
        checksum = checksum32;
        checksum_type = checksum_type32;
    }

    let url = url.ok_or_else(|| {
        let architecture = if bitness.is_empty() { "32 bit" } else { bitness };
        PakratError::Configuration(format!(
            "This package does not support {architecture} architecture."
        ))
    })?;

    Ok(EffectiveDownload {
        url,
        checksum,
        checksum_type: checksum_type.unwrap_or_default(),
        bitness,
    })
}

/// Resolves effective parameters, fetches or reuses a local file and
/// validates it.
pub struct DownloadEngine {
    client: Client,
    ftp: Box<dyn FtpFetcher>,
}

impl DownloadEngine {
    /// Build the engine from the environment store: explicit proxy
    /// configuration and timeout overrides are consulted here.
    pub fn new(env: &EnvStore) -> Result<Self> {
        let request_timeout = env.timeout_or(vars::REQUEST_TIMEOUT, DEFAULT_REQUEST_TIMEOUT);
        let response_timeout = env.timeout_or(vars::RESPONSE_TIMEOUT, DEFAULT_RESPONSE_TIMEOUT);
        debug!(
            "Using request timeout of {:?} and response timeout of {:?}",
            request_timeout, response_timeout
        );

        let mut builder = Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .cookie_store(true)
            .connect_timeout(request_timeout)
            .timeout(response_timeout);

        if let Some(proxy) = proxy::resolve(env)? {
            builder = builder.proxy(proxy);
        }

        Ok(Self {
            client: builder.build()?,
            ftp: Box::new(FtpUnsupported),
        })
    }

    /// Replace the FTP collaborator.
    pub fn with_ftp_fetcher(mut self, ftp: Box<dyn FtpFetcher>) -> Self {
        self.ftp = ftp;
        self
    }

    /// Materialize the requested file locally and validate it. Returns the
    /// final resolved path.
    pub async fn fetch(&self, request: &DownloadRequest, env: &EnvStore) -> Result<PathBuf> {
        let effective = resolve(request, env)?;
        let mut url = effective.url.clone();
        let mut destination = request.destination.clone();

        if url.to_lowercase().starts_with("http://") {
            url = self.upgrade_to_https(url).await;
        }

        if let Some(parent) = destination.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                debug!("Attempt to create directory failed: {}", e);
            }
        }

        let mut url_is_remote = true;
        let mut response_headers = HeaderMap::new();
        let lower = url.to_lowercase();

        if lower.starts_with("http") {
            match self.head(&url).await {
                Ok((headers, final_url)) => {
                    response_headers = headers;
                    if request.use_original_file_name {
                        match remote_file_name(&response_headers, &final_url, &url) {
                            Some(name) => {
                                debug!("File name determined from url is '{}'", name);
                                let parent =
                                    destination.parent().map(Path::to_path_buf).unwrap_or_default();
                                destination = parent.join(name);
                            }
                            None => debug!(
                                "Remote file name is unavailable or illegal, keeping '{}'",
                                destination.display()
                            ),
                        }
                    }
                }
                Err(e) => warn!("Attempt to get headers for '{}' failed.\n  {}", url, e),
            }

            if self.needs_download(request, &destination, &effective, &response_headers)? {
                info!(
                    "Downloading {} {}\n  from '{}'.",
                    request.package_name, effective.bitness, url
                );
                self.transfer_http(&url, &destination, &request.headers)
                    .await?;
            } else {
                debug!(
                    "{}'s requested file has already been downloaded. Using cached copy at\n  '{}'.",
                    request.package_name,
                    destination.display()
                );
            }
        } else if lower.starts_with("ftp") {
            info!("Ftp-ing {}\n  from '{}'.", request.package_name, url);
            self.ftp.fetch(&url, &destination)?;
        } else {
            let source = if lower.starts_with("file:") {
                file_url_to_path(&url)
            } else {
                PathBuf::from(&url)
            };
            info!(
                "Copying {}\n  from '{}'",
                request.package_name,
                source.display()
            );
            std::fs::copy(&source, &destination)?;
            url_is_remote = false;
        }

        // give the file system a moment to finish up before validating
        tokio::time::sleep(FS_SETTLE).await;

        if !destination.exists() {
            return Err(PakratError::Validation(format!(
                "Expected a file to be downloaded to '{}', but nothing exists at that location.",
                destination.display()
            )));
        }

        let checksum_configured = effective
            .checksum
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .is_some();

        if !response_headers.is_empty() && !checksum_configured {
            // no checksum to validate against, validate content length
            if let Some(expected) = content_length_of(&response_headers) {
                debug!(
                    "Checking that '{}' is the size we expect it to be.",
                    destination.display()
                );
                let actual = std::fs::metadata(&destination)?.len();
                if actual != expected {
                    return Err(PakratError::LengthMismatch {
                        path: destination,
                        expected,
                        actual,
                    });
                }
            }

            if let Some(remote_sha1) = header_str(&response_headers, "x-checksum-sha1") {
                debug!(
                    "Verifying remote checksum of '{}' for '{}'.",
                    remote_sha1,
                    destination.display()
                );
                checksum::assert_valid(
                    &destination,
                    Some(remote_sha1),
                    ChecksumType::Sha1,
                    &url,
                    env,
                )?;
            }
        }

        // checksum validation is skipped for embedded files without one,
        // but required whenever the url is remote
        if checksum_configured || url_is_remote {
            debug!(
                "Verifying package provided checksum of '{:?}' for '{}'.",
                effective.checksum,
                destination.display()
            );
            checksum::assert_valid(
                &destination,
                effective.checksum.as_deref(),
                effective.checksum_type,
                &url,
                env,
            )?;
        }

        Ok(destination)
    }

    /// Header-only probe of the HTTPS equivalent; failure is non-fatal.
    async fn upgrade_to_https(&self, url: String) -> String {
        let https_url = format!("https://{}", &url["http://".len()..]);
        match self.head(&https_url).await {
            Ok(_) => {
                warn!("Url has SSL/TLS available, switching to HTTPS for download.");
                https_url
            }
            Err(e) => {
                debug!("Url does not have HTTPS available: {}", e);
                url
            }
        }
    }

    async fn head(&self, url: &str) -> Result<(HeaderMap, String)> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PakratError::Network {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let final_url = response.url().to_string();
        Ok((response.headers().clone(), final_url))
    }

    fn needs_download(
        &self,
        request: &DownloadRequest,
        destination: &Path,
        effective: &EffectiveDownload,
        headers: &HeaderMap,
    ) -> Result<bool> {
        if !destination.exists() || request.force_download {
            return Ok(true);
        }

        if let Some(expected) = nonblank(effective.checksum.as_deref()) {
            info!("File appears to be downloaded already. Verifying with package checksum to determine if it needs to be re-downloaded.");
            if checksum::is_valid(destination, &expected, effective.checksum_type)? {
                return Ok(false);
            }
            debug!("Existing file failed checksum. Will be re-downloaded from url.");
            return Ok(true);
        }

        if let Some(expected) = content_length_of(headers) {
            let actual = std::fs::metadata(destination)?.len();
            if actual == expected {
                return Ok(false);
            }
        }

        Ok(true)
    }

    async fn transfer_http(
        &self,
        url: &str,
        destination: &Path,
        headers: &[(String, String)],
    ) -> Result<()> {
        let marker = istext_marker(destination);
        if marker.exists() {
            if let Err(e) = std::fs::remove_file(&marker) {
                warn!("Unable to remove marker file: {}", e);
            }
        }

        let mut request = self.client.get(url);
        for (name, value) in headers {
            debug!(" * {}={}", name, value);
            request = request.header(name.as_str(), value.as_str());
        }

        let mut response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PakratError::Network {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        // binary installers are not expected to be served as text; flag the
        // likely misconfiguration without failing the download
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if content_type.contains("text/html") || content_type.contains("text/plain") {
            let message = format!(
                "'{}' has content type '{}'",
                file_name_of(destination),
                content_type
            );
            warn!("{}", message);
            if let Err(e) = std::fs::write(&marker, &message) {
                warn!("Unable to write marker file: {}", e);
            }
        }

        let goal = response.content_length().unwrap_or(0);
        let goal_formatted = format_file_size(goal);

        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = std::fs::File::create(destination)?;

        let progress = if goal > 0 {
            let pb = ProgressBar::new(goal);
            let style = ProgressStyle::default_bar()
                .template("{msg} {bar:40.cyan/blue} {bytes}/{total_bytes} {eta}")
                .map_err(|e| PakratError::Unknown(format!("Progress bar template error: {e}")))?;
            pb.set_style(style);
            pb.set_message("Downloading");
            Some(pb)
        } else {
            None
        };

        let mut pending: Vec<u8> = Vec::with_capacity(CHUNK_SIZE);
        let mut total: u64 = 0;
        let mut chunks_written: u64 = 0;

        while let Some(bytes) = response.chunk().await.map_err(|e| PakratError::Network {
            url: url.to_string(),
            message: e.to_string(),
        })? {
            pending.extend_from_slice(&bytes);
            while pending.len() >= CHUNK_SIZE {
                let rest = pending.split_off(CHUNK_SIZE);
                writer.write_all(&pending)?;
                total += pending.len() as u64;
                pending = rest;
                chunks_written += 1;

                if let Some(pb) = &progress {
                    pb.set_position(total);
                }
                if goal > 0 && chunks_written % PROGRESS_INTERVAL == 0 {
                    debug!(
                        "Saving {} of {} ({}%)",
                        format_file_size(total),
                        goal_formatted,
                        total * 100 / goal
                    );
                }
            }
        }
        if !pending.is_empty() {
            writer.write_all(&pending)?;
            total += pending.len() as u64;
        }
        writer.flush()?;

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        info!(
            "Download of '{}' ({}) completed.",
            file_name_of(destination),
            format_file_size(total)
        );

        Ok(())
    }
}

/// Sibling marker written when a download came back as text content.
pub fn istext_marker(destination: &Path) -> PathBuf {
    PathBuf::from(format!("{}.istext", destination.display()))
}

fn nonblank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Collapse accidental double slashes while preserving the scheme
/// separator.
fn normalize_url_slashes(url: &str) -> String {
    url.replace("//", "/").replace(":/", "://")
}

fn content_length_of(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn bad_file_name_chars() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"[\\/:*?"<>|=;\x00-\x1f]"#).expect("file name pattern is valid")
    })
}

/// Suggested remote file name, resolved from the Content-Disposition
/// header, the Location header, the final response URL, then the request
/// URL. Names with illegal characters are rejected at each step.
fn remote_file_name(headers: &HeaderMap, final_url: &str, request_url: &str) -> Option<String> {
    fn acceptable(name: &str) -> bool {
        !name.is_empty() && !bad_file_name_chars().is_match(name)
    }

    if let Some(value) = header_str(headers, CONTENT_DISPOSITION.as_str()) {
        let lower = value.to_lowercase();
        if let Some(index) = lower.rfind("filename=") {
            let name = value[index + "filename=".len()..].replace('"', "");
            let name = name.trim();
            if acceptable(name) {
                debug!("Using header 'Content-Disposition' to determine file name.");
                return Some(name.to_string());
            }
        }
    }

    if let Some(value) = header_str(headers, LOCATION.as_str()) {
        if let Some(name) = url_file_name(value) {
            if acceptable(&name) {
                debug!("Using header 'Location' to determine file name.");
                return Some(name);
            }
        }
    }

    if !final_url.contains('?') {
        if let Some(name) = url_file_name(final_url) {
            if acceptable(&name) {
                debug!("Using response url to determine file name.");
                return Some(name);
            }
        }
    }

    if !request_url.contains('?') {
        if let Some(name) = url_file_name(request_url) {
            if Path::new(&name).extension().is_some() && acceptable(&name) {
                debug!("Using request url to determine file name.");
                return Some(name);
            }
        }
    }

    None
}

fn url_file_name(url: &str) -> Option<String> {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(str::to_string)
        .filter(|name| !name.is_empty() && !name.contains(':'))
}

fn file_url_to_path(url: &str) -> PathBuf {
    let rest = url["file:".len()..].trim_start_matches("//");
    let bytes = rest.as_bytes();
    // file:///C:/dir keeps the drive letter, file:///dir keeps the root
    if bytes.len() > 2 && bytes[0] == b'/' && bytes[2] == b':' {
        PathBuf::from(&rest[1..])
    } else if rest.starts_with('/') {
        PathBuf::from(rest)
    } else {
        PathBuf::from(format!("/{rest}"))
    }
}

/// Human-readable size, e.g. `1.21 MB`.
pub fn format_file_size(size: u64) -> String {
    const UNITS: [&str; 7] = ["B", "KB", "MB", "GB", "TB", "PB", "EB"];
    let mut size = size as f64;
    for unit in UNITS {
        if size < 1024.0 {
            return format!("{:.2} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.2} ZB", size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn request_with_urls(url: Option<&str>, url64: Option<&str>) -> DownloadRequest {
        let mut request = DownloadRequest::new("testpkg", "/tmp/testpkg/testpkg.exe");
        request.url = url.map(str::to_string);
        request.url64 = url64.map(str::to_string);
        request.checksum = Some("aaaa".into());
        request.checksum_type = Some(ChecksumType::Sha256);
        request.checksum64 = Some("bbbb".into());
        request.checksum_type64 = Some(ChecksumType::Sha512);
        request
    }

    #[test]
    fn sixty_four_bit_process_selects_the_64_bit_pair() {
        let request = request_with_urls(
            Some("https://example/pkg32.exe"),
            Some("https://example/pkg64.exe"),
        );
        let env = EnvStore::empty();
        let effective = resolve_for_width(&request, &env, 64).unwrap();
        assert_eq!(effective.url, "https://example/pkg64.exe");
        assert_eq!(effective.checksum.as_deref(), Some("bbbb"));
        assert_eq!(effective.checksum_type, ChecksumType::Sha512);
        assert_eq!(effective.bitness, "64 bit");
    }

    #[test]
    fn force_x86_selects_the_primary_pair_regardless_of_width() {
        let request = request_with_urls(
            Some("https://example/pkg32.exe"),
            Some("https://example/pkg64.exe"),
        );
        let mut env = EnvStore::empty();
        env.set(vars::FORCE_X86, "true");
        let effective = resolve_for_width(&request, &env, 64).unwrap();
        assert_eq!(effective.url, "https://example/pkg32.exe");
        assert_eq!(effective.checksum.as_deref(), Some("aaaa"));
        assert_eq!(effective.checksum_type, ChecksumType::Sha256);
    }

    #[test]
    fn thirty_two_bit_process_keeps_the_primary_pair() {
        let request = request_with_urls(
            Some("https://example/pkg32.exe"),
            Some("https://example/pkg64.exe"),
        );
        let env = EnvStore::empty();
        let effective = resolve_for_width(&request, &env, 32).unwrap();
        assert_eq!(effective.url, "https://example/pkg32.exe");
        assert_eq!(effective.checksum.as_deref(), Some("aaaa"));
    }

    #[test]
    fn identical_urls_keep_the_primary_checksum() {
        let request = request_with_urls(
            Some("https://example/pkg.exe"),
            Some("https://example/pkg.exe"),
        );
        let env = EnvStore::empty();
        let effective = resolve_for_width(&request, &env, 64).unwrap();
        assert_eq!(effective.checksum.as_deref(), Some("aaaa"));
        assert_eq!(effective.bitness, "64 bit");
    }

    #[test]
    fn env_overrides_beat_request_fields() {
        let request = request_with_urls(
            Some("https://example/pkg32.exe"),
            Some("https://example/pkg64.exe"),
        );
        let mut env = EnvStore::empty();
        env.set(vars::URL64_OVERRIDE, "https://mirror/pkg64.exe");
        env.set(vars::CHECKSUM64, "cccc");
        env.set(vars::CHECKSUM_TYPE64, "sha1");
        let effective = resolve_for_width(&request, &env, 64).unwrap();
        assert_eq!(effective.url, "https://mirror/pkg64.exe");
        assert_eq!(effective.checksum.as_deref(), Some("cccc"));
        assert_eq!(effective.checksum_type, ChecksumType::Sha1);
    }

    #[test]
    fn missing_url_for_architecture_is_a_configuration_error() {
        let request = request_with_urls(None, Some("https://example/pkg64.exe"));
        let mut env = EnvStore::empty();
        env.set(vars::FORCE_X86, "true");
        let err = resolve_for_width(&request, &env, 64).unwrap_err();
        assert!(matches!(err, PakratError::Configuration(_)));
        assert!(err.to_string().contains("32 bit"));
    }

    #[test]
    fn url_slash_normalization_preserves_scheme() {
        assert_eq!(
            normalize_url_slashes("https://example//downloads//pkg.exe"),
            "https://example/downloads/pkg.exe"
        );
    }

    #[test]
    fn remote_file_name_prefers_content_disposition() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment; filename=\"pkg-1.2.3.exe\""),
        );
        let name = remote_file_name(
            &headers,
            "https://example/download",
            "https://example/download",
        );
        assert_eq!(name.as_deref(), Some("pkg-1.2.3.exe"));
    }

    #[test]
    fn remote_file_name_rejects_illegal_characters() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment; filename=\"bad=name.exe\""),
        );
        // falls through to the response url
        let name = remote_file_name(
            &headers,
            "https://example/files/pkg.exe",
            "https://example/files/pkg.exe",
        );
        assert_eq!(name.as_deref(), Some("pkg.exe"));
    }

    #[test]
    fn remote_file_name_skips_urls_with_queries() {
        let headers = HeaderMap::new();
        let name = remote_file_name(
            &headers,
            "https://example/get?id=4",
            "https://example/get?id=4",
        );
        assert_eq!(name, None);
    }

    #[test]
    fn file_url_round_trips_to_paths() {
        assert_eq!(
            file_url_to_path("file:///tmp/pkg.exe"),
            PathBuf::from("/tmp/pkg.exe")
        );
        assert_eq!(
            file_url_to_path("file:///C:/temp/pkg.exe"),
            PathBuf::from("C:/temp/pkg.exe")
        );
    }

    #[test]
    fn file_sizes_format_with_units() {
        assert_eq!(format_file_size(512), "512.00 B");
        assert_eq!(format_file_size(2048), "2.00 KB");
        assert_eq!(format_file_size(1024 * 1024), "1.00 MB");
    }
}
