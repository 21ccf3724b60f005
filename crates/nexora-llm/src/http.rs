//! Shared HTTP client construction for consistent timeout and TLS configuration.

use std::time::Duration;

/// Create a shared HTTP client with standard Nexora configuration.
///
/// Config: 10s connect timeout, 60s request timeout, rustls TLS,
/// `nexora/{version}` user-agent, redirect limit 10. Pipeline-level timeouts are
/// tighter and enforced by the caller.
#[must_use]
pub fn default_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(60))
        .user_agent(concat!("nexora/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .expect("default HTTP client construction must not fail")
}

/// Strip trailing slashes so endpoint paths can be appended with `format!`.
pub(crate) fn trim_base_url(mut base_url: String) -> String {
    while base_url.ends_with('/') {
        base_url.pop();
    }
    base_url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_trailing_slashes() {
        assert_eq!(trim_base_url("http://x/v1///".into()), "http://x/v1");
        assert_eq!(trim_base_url("http://x".into()), "http://x");
    }
}
