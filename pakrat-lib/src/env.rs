//! Process-wide environment variable store
//!
//! Environment variables are the only state shared across command
//! invocations. The store is an explicit dependency of the download engine,
//! the process runner and the installer dispatch rather than hidden global
//! access; reads are unsynchronized and writes are last-writer-wins, which
//! is acceptable for single-threaded, sequential script execution.

use std::collections::HashMap;
use std::time::Duration;

/// Names of environment variables consumed or produced by pakrat commands.
pub mod vars {
    /// Explicit proxy server address, e.g. `http://proxy:8080`.
    pub const PROXY_LOCATION: &str = "PAKRAT_PROXY_LOCATION";
    pub const PROXY_USER: &str = "PAKRAT_PROXY_USER";
    pub const PROXY_PASSWORD: &str = "PAKRAT_PROXY_PASSWORD";
    /// Comma-separated host patterns that bypass the explicit proxy.
    pub const PROXY_BYPASS_LIST: &str = "PAKRAT_PROXY_BYPASS_LIST";
    pub const PROXY_BYPASS_ON_LOCAL: &str = "PAKRAT_PROXY_BYPASS_ON_LOCAL";

    /// Connect-phase timeout override, in milliseconds.
    pub const REQUEST_TIMEOUT: &str = "PAKRAT_REQUEST_TIMEOUT";
    /// Read/response-phase timeout override, in milliseconds.
    pub const RESPONSE_TIMEOUT: &str = "PAKRAT_RESPONSE_TIMEOUT";

    pub const URL_OVERRIDE: &str = "PAKRAT_URL_OVERRIDE";
    pub const URL64_OVERRIDE: &str = "PAKRAT_URL64_OVERRIDE";
    pub const CHECKSUM32: &str = "PAKRAT_CHECKSUM32";
    pub const CHECKSUM_TYPE32: &str = "PAKRAT_CHECKSUM_TYPE32";
    pub const CHECKSUM64: &str = "PAKRAT_CHECKSUM64";
    pub const CHECKSUM_TYPE64: &str = "PAKRAT_CHECKSUM_TYPE64";

    /// When `true`, the 32-bit/primary URL and checksum are used even in a
    /// 64-bit process.
    pub const FORCE_X86: &str = "PAKRAT_FORCE_X86";

    /// When `true`, checksum validation is skipped entirely.
    pub const IGNORE_CHECKSUMS: &str = "PAKRAT_IGNORE_CHECKSUMS";
    /// When `true`, a missing checksum on a remote source is accepted.
    pub const ALLOW_EMPTY_CHECKSUMS: &str = "PAKRAT_ALLOW_EMPTY_CHECKSUMS";
    /// When `true`, a missing checksum is accepted for HTTPS sources only.
    pub const ALLOW_EMPTY_CHECKSUMS_SECURE: &str = "PAKRAT_ALLOW_EMPTY_CHECKSUMS_SECURE";

    pub const PACKAGE_NAME: &str = "PAKRAT_PACKAGE_NAME";
    pub const PACKAGE_FOLDER: &str = "PAKRAT_PACKAGE_FOLDER";
    pub const PACKAGE_VERSION: &str = "PAKRAT_PACKAGE_VERSION";

    /// Extra arguments appended to (or replacing) a package's silent
    /// installer arguments.
    pub const INSTALL_ARGUMENTS: &str = "PAKRAT_INSTALL_ARGUMENTS";
    /// When `true`, INSTALL_ARGUMENTS replaces the silent arguments instead
    /// of being appended.
    pub const INSTALL_OVERRIDE: &str = "PAKRAT_INSTALL_OVERRIDE";
    pub const INSTALLER_TYPE: &str = "PAKRAT_INSTALLER_TYPE";

    pub const EXIT_CODE: &str = "PAKRAT_EXIT_CODE";
    pub const INSTALL_LOCATION: &str = "PAKRAT_INSTALL_LOCATION";
    /// Directory holding bundled tools such as the 7-Zip executable.
    pub const TOOLS_LOCATION: &str = "PAKRAT_TOOLS_LOCATION";
}

/// Snapshot of the process environment, passed by reference into the
/// components that consume it.
#[derive(Debug, Clone, Default)]
pub struct EnvStore {
    values: HashMap<String, String>,
}

impl EnvStore {
    /// Empty store, primarily for tests and embedding callers that want
    /// full control over the visible variables.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Snapshot the current process environment.
    pub fn from_process() -> Self {
        Self {
            values: std::env::vars().collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Like [`get`](Self::get) but treats empty and whitespace-only values
    /// as unset.
    pub fn get_nonblank(&self, name: &str) -> Option<&str> {
        self.get(name).map(str::trim).filter(|v| !v.is_empty())
    }

    /// Last-writer-wins; no synchronization.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// True when the variable is set to `true` (case-insensitive).
    pub fn is_true(&self, name: &str) -> bool {
        matches!(self.get_nonblank(name), Some(v) if v.eq_ignore_ascii_case("true"))
    }

    /// Parse a millisecond timeout override, clamping unset, unparsable and
    /// non-positive values to the supplied default.
    pub fn timeout_or(&self, name: &str, default: Duration) -> Duration {
        match self.get_nonblank(name) {
            Some(raw) => match raw.parse::<i64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms as u64),
                _ => default,
            },
            None => default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_nonblank_filters_whitespace() {
        let mut env = EnvStore::empty();
        env.set(vars::URL_OVERRIDE, "   ");
        assert_eq!(env.get_nonblank(vars::URL_OVERRIDE), None);
        env.set(vars::URL_OVERRIDE, "https://example/pkg.exe");
        assert_eq!(
            env.get_nonblank(vars::URL_OVERRIDE),
            Some("https://example/pkg.exe")
        );
    }

    #[test]
    fn is_true_is_case_insensitive() {
        let mut env = EnvStore::empty();
        env.set(vars::FORCE_X86, "True");
        assert!(env.is_true(vars::FORCE_X86));
        env.set(vars::FORCE_X86, "1");
        assert!(!env.is_true(vars::FORCE_X86));
    }

    #[test]
    fn timeout_clamps_non_positive_overrides() {
        let mut env = EnvStore::empty();
        let default = Duration::from_millis(30_000);
        assert_eq!(env.timeout_or(vars::REQUEST_TIMEOUT, default), default);
        env.set(vars::REQUEST_TIMEOUT, "-5");
        assert_eq!(env.timeout_or(vars::REQUEST_TIMEOUT, default), default);
        env.set(vars::REQUEST_TIMEOUT, "0");
        assert_eq!(env.timeout_or(vars::REQUEST_TIMEOUT, default), default);
        env.set(vars::REQUEST_TIMEOUT, "45000");
        assert_eq!(
            env.timeout_or(vars::REQUEST_TIMEOUT, default),
            Duration::from_millis(45_000)
        );
    }

    #[test]
    fn set_is_last_writer_wins() {
        let mut env = EnvStore::empty();
        env.set(vars::PACKAGE_NAME, "first");
        env.set(vars::PACKAGE_NAME, "second");
        assert_eq!(env.get(vars::PACKAGE_NAME), Some("second"));
    }
}
