use crate::api::{ListOptions, Observable, OpenCtiApi};
use crate::error::ClientError;
use crate::graphql::{GraphQlRequest, GraphQlResponse, ObservablesData};
use async_trait::async_trait;
use reqwest::Url;
use std::time::Duration;
use tracing::debug;

/// HTTP client for the OpenCTI health endpoint and GraphQL API.
#[derive(Clone)]
pub struct OpenCtiClient {
    http: reqwest::Client,
    endpoint: String,
    health_url: Url,
    graphql_url: Url,
    token: String,
}

impl OpenCtiClient {
    /// Build a client for `url`, authenticating with the API `token`.
    pub fn new(url: &str, token: &str, timeout: Duration) -> Result<Self, ClientError> {
        let base = parse_base_url(url)?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("opencti-exporter/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Self::with_http_client(http, base, token)
    }

    /// Use a preconfigured `reqwest::Client` (proxies, custom TLS roots).
    pub fn with_http_client(
        http: reqwest::Client,
        base: Url,
        token: &str,
    ) -> Result<Self, ClientError> {
        let invalid = |reason: String| ClientError::InvalidUrl {
            url: base.to_string(),
            reason,
        };
        let health_url = base.join("health").map_err(|e| invalid(e.to_string()))?;
        let graphql_url = base.join("graphql").map_err(|e| invalid(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: base.as_str().trim_end_matches('/').to_string(),
            health_url,
            graphql_url,
            token: token.to_string(),
        })
    }
}

/// Parse the platform URL, forcing a trailing slash so joins keep any path prefix.
pub fn parse_base_url(url: &str) -> Result<Url, ClientError> {
    let mut base = Url::parse(url).map_err(|e| ClientError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(ClientError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme {:?}", base.scheme()),
        });
    }
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base)
}

#[async_trait]
impl OpenCtiApi for OpenCtiClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn health_check(&self) -> Result<(), ClientError> {
        let resp = self
            .http
            .get(self.health_url.clone())
            .bearer_auth(&self.token)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                endpoint: "health",
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    async fn list_observables(
        &self,
        options: &ListOptions,
    ) -> Result<Vec<Observable>, ClientError> {
        debug!(
            first = options.first,
            order_by = options.order_by.as_str(),
            "Listing StixCyberObservables"
        );
        let resp = self
            .http
            .post(self.graphql_url.clone())
            .bearer_auth(&self.token)
            .json(&GraphQlRequest::list_observables(options))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                endpoint: "graphql",
                status: status.as_u16(),
            });
        }
        let body: GraphQlResponse<ObservablesData> = resp.json().await?;
        body.into_observables()
    }
}
