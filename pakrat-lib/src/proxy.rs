//! Proxy resolution for outbound requests
//!
//! Explicit proxy configuration from the environment store takes precedence
//! over system proxy auto-detection (which the HTTP client performs on its
//! own when no explicit proxy is installed).

use crate::env::{vars, EnvStore};
use crate::error::Result;
use reqwest::{NoProxy, Proxy};
use tracing::info;

/// Resolve the explicit proxy for outbound requests, if one is configured.
///
/// Returns `Ok(None)` when no explicit proxy is set; the client then falls
/// back to system proxy auto-detection.
pub fn resolve(env: &EnvStore) -> Result<Option<Proxy>> {
    let location = match env.get_nonblank(vars::PROXY_LOCATION) {
        Some(location) => location,
        None => return Ok(None),
    };

    let mut proxy = Proxy::all(location)?;

    if let Some(user) = env.get_nonblank(vars::PROXY_USER) {
        let password = env.get_nonblank(vars::PROXY_PASSWORD).unwrap_or("");
        proxy = proxy.basic_auth(user, password);
    }

    let mut bypass: Vec<String> = env
        .get_nonblank(vars::PROXY_BYPASS_LIST)
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if env.is_true(vars::PROXY_BYPASS_ON_LOCAL) {
        bypass.push("localhost".to_string());
        bypass.push("127.0.0.1".to_string());
    }

    if !bypass.is_empty() {
        proxy = proxy.no_proxy(NoProxy::from_string(&bypass.join(",")));
    }

    info!("Using explicit proxy server '{}'.", location);

    Ok(Some(proxy))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_explicit_proxy_resolves_to_none() {
        let env = EnvStore::empty();
        assert!(resolve(&env).unwrap().is_none());
    }

    #[test]
    fn explicit_proxy_resolves() {
        let mut env = EnvStore::empty();
        env.set(vars::PROXY_LOCATION, "http://proxy.internal:8080");
        env.set(vars::PROXY_USER, "svc");
        env.set(vars::PROXY_PASSWORD, "hunter2");
        env.set(vars::PROXY_BYPASS_LIST, "*.internal, mirror.local");
        env.set(vars::PROXY_BYPASS_ON_LOCAL, "true");
        assert!(resolve(&env).unwrap().is_some());
    }

    #[test]
    fn malformed_proxy_location_is_an_error() {
        let mut env = EnvStore::empty();
        env.set(vars::PROXY_LOCATION, "not a proxy url");
        assert!(resolve(&env).is_err());
    }
}
