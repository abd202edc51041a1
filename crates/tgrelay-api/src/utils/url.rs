//! Public download links

use axum::http::{header, HeaderMap};
use tgrelay_core::Config;

/// Base URL clients should use to reach this server.
///
/// `BASE_URL` wins; otherwise the scheme comes from `X-Forwarded-Proto`
/// (reverse proxies) and the host from the `Host` header.
pub fn public_base_url(config: &Config, headers: &HeaderMap) -> String {
    if let Some(base) = config.base_url() {
        return base.to_string();
    }

    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("http");
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");

    format!("{}://{}", scheme, host)
}

pub fn download_url(config: &Config, headers: &HeaderMap, file_id: &str) -> String {
    format!("{}/d?file_id={}", public_base_url(config, headers), file_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use tgrelay_core::RelayConfig;

    fn config(base_url: Option<&str>) -> Config {
        let base_url = base_url.map(str::to_string);
        Config::new(
            RelayConfig::from_vars(|key: &str| match key {
                "ACCESS_PWD" => Some("secret".to_string()),
                "STORAGE_BACKEND" => Some("local".to_string()),
                "LOCAL_STORAGE_PATH" => Some("/tmp/tgrelay-test".to_string()),
                "BASE_URL" => base_url.clone(),
                _ => None,
            })
            .unwrap(),
        )
    }

    #[test]
    fn test_base_url_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("files.example.com"));
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));

        assert_eq!(
            download_url(&config(None), &headers, "BQAC"),
            "https://files.example.com/d?file_id=BQAC"
        );
    }

    #[test]
    fn test_configured_base_url_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("internal:8080"));

        assert_eq!(
            public_base_url(&config(Some("https://relay.example.com/")), &headers),
            "https://relay.example.com"
        );
    }

    #[test]
    fn test_defaults_to_http() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("127.0.0.1:8080"));
        assert_eq!(
            public_base_url(&config(None), &headers),
            "http://127.0.0.1:8080"
        );
    }
}
