//! Startup probe of the classification service's `/health` route.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::error::HealthError;
use crate::protocol;

pub const HEALTH_PATH: &str = "/health";
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

#[derive(Clone, Debug)]
pub struct HealthProbe {
    client: Client,
    url: Url,
}

impl HealthProbe {
    /// Probe `<page origin>/health`.
    ///
    /// # Errors
    ///
    /// Returns `HealthError::Endpoint` if `page_url` is not a valid URL, or
    /// `HealthError::Http` if the HTTP client cannot be built.
    pub fn for_page(page_url: &str) -> Result<Self, HealthError> {
        let mut url = protocol::parse_url(page_url)?;
        url.set_path(HEALTH_PATH);
        url.set_query(None);
        url.set_fragment(None);
        Self::new(url)
    }

    /// # Errors
    ///
    /// Returns `HealthError::Http` if the HTTP client cannot be built.
    pub fn new(url: Url) -> Result<Self, HealthError> {
        let client = Client::builder().timeout(PROBE_TIMEOUT).build()?;
        Ok(Self { client, url })
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// # Errors
    ///
    /// Returns `HealthError` if the request fails or the service does not
    /// report `"ok"`.
    pub async fn check(&self) -> Result<(), HealthError> {
        let response = self.client.get(self.url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(HealthError::HttpStatus(response.status()));
        }

        let body: HealthResponse = response.json().await?;
        if body.status == "ok" {
            Ok(())
        } else {
            Err(HealthError::Unhealthy(body.status))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves one canned HTTP response and returns the page URL.
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await.unwrap();
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        format!("http://{addr}/practice")
    }

    #[test]
    fn probe_targets_the_page_origin() {
        let probe = HealthProbe::for_page("https://signs.example.org:8443/app/?x=1").unwrap();
        assert_eq!(probe.url().as_str(), "https://signs.example.org:8443/health");
    }

    #[test]
    fn bad_page_url_is_an_endpoint_error() {
        let err = HealthProbe::for_page("not a url").unwrap_err();
        assert!(matches!(err, HealthError::Endpoint(_)));
    }

    #[test]
    fn explicit_url_builds_a_client() {
        let url = Url::parse("http://127.0.0.1:8001/health").unwrap();
        let probe = HealthProbe::new(url.clone()).unwrap();
        assert_eq!(probe.url(), &url);
    }

    #[tokio::test]
    async fn healthy_service_passes() {
        let page = serve_once("200 OK", r#"{"status":"ok"}"#).await;
        HealthProbe::for_page(&page).unwrap().check().await.unwrap();
    }

    #[tokio::test]
    async fn unhealthy_service_is_reported() {
        let page = serve_once("200 OK", r#"{"status":"loading"}"#).await;
        let err = HealthProbe::for_page(&page).unwrap().check().await.unwrap_err();
        assert!(matches!(err, HealthError::Unhealthy(status) if status == "loading"));
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let page = serve_once("503 Service Unavailable", "{}").await;
        let err = HealthProbe::for_page(&page).unwrap().check().await.unwrap_err();
        assert!(matches!(err, HealthError::HttpStatus(code) if code.as_u16() == 503));
    }
}
