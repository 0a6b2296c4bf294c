//! Blocking HTTP transport for the inventory service.

use std::time::Duration;

use kegmon_traits::{BoxError, HttpResponse, Transport};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};

pub struct HttpTransport {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn from_config(cfg: &kegmon_config::Config) -> eyre::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(cfg.service.request_timeout_ms))
            .build()
            .map_err(|e| eyre::eyre!("build http client: {e}"))?;
        Ok(Self {
            client,
            base_url: cfg.service_base_url(),
            api_key: cfg.service.api_key.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => req.header(AUTHORIZATION, format!("Bearer {key}")),
            None => req,
        }
    }

    fn send(req: RequestBuilder) -> Result<HttpResponse, BoxError> {
        let resp = req.send()?;
        let status = resp.status().as_u16();
        let body = resp.text()?;
        tracing::debug!(status, len = body.len(), "http response");
        Ok(HttpResponse { status, body })
    }
}

impl Transport for HttpTransport {
    fn get(&mut self, path: &str) -> Result<HttpResponse, BoxError> {
        let url = format!("{}{path}", self.base_url);
        tracing::debug!(%url, "GET");
        Self::send(self.authorized(self.client.get(url)))
    }

    fn post(&mut self, path: &str, body: &str) -> Result<HttpResponse, BoxError> {
        let url = format!("{}{path}", self.base_url);
        tracing::debug!(%url, "POST");
        let req = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_string());
        Self::send(self.authorized(req))
    }
}
