//! A minimal client for the handful of IBM Cloud VPC endpoints the suite needs.  Requests are
//! authenticated with an IAM bearer token obtained from the configured API key; the token is
//! cached and refreshed shortly before it expires.
//!
//! API documentation: <https://cloud.ibm.com/apidocs/vpc/latest>
use std::time::Duration;

use pp_core::errors::*;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{
    Deserialize,
    Serialize,
};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::*;
use url::Url;
use url::form_urlencoded;

use crate::IbmCloudProps;

const VPC_API_VERSION: &str = "2024-04-30";
const VPC_API_GENERATION: &str = "2";
const IAM_GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";
const REQUEST_TIMEOUT_SECONDS: u64 = 30;
const TOKEN_REFRESH_MARGIN_SECONDS: u64 = 60;

err_impl! {VpcError,
    #[error("IBM Cloud API request failed: {0}")]
    Api(String),

    #[error("invalid IBM Cloud endpoint: {0}")]
    InvalidEndpoint(String),
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ResourceRef {
    pub name: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub profile: ResourceRef,

    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct PageLink {
    href: String,
}

#[derive(Debug, Deserialize)]
struct InstanceCollection {
    #[serde(default)]
    instances: Vec<Instance>,
    next: Option<PageLink>,
}

#[derive(Debug, Deserialize)]
struct IamTokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    token: String,
    refresh_at: Instant,
}

pub struct VpcClient {
    http: reqwest::Client,
    api_key: String,
    iam_endpoint: String,
    vpc_endpoint: String,
    token: Mutex<Option<CachedToken>>,
}

impl VpcClient {
    pub fn new(props: &IbmCloudProps) -> anyhow::Result<VpcClient> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build()?;

        Ok(VpcClient {
            http,
            api_key: props.api_key.clone(),
            iam_endpoint: props.iam_endpoint().trim_end_matches('/').into(),
            vpc_endpoint: props.vpc_endpoint().trim_end_matches('/').into(),
            token: Mutex::new(None),
        })
    }

    // Lists every instance (optionally restricted to one VPC), following pagination to the end
    pub async fn list_instances(&self, vpc_id: Option<&str>) -> anyhow::Result<Vec<Instance>> {
        let mut instances = vec![];
        let mut start: Option<String> = None;
        loop {
            let mut params = vec![];
            if let Some(id) = vpc_id {
                params.push(("vpc.id", id.to_string()));
            }
            if let Some(s) = start.take() {
                params.push(("start", s));
            }

            let url = self.vpc_url("/v1/instances", &params)?;
            let page: InstanceCollection = self.get(url).await?;
            instances.extend(page.instances);

            match page.next {
                Some(link) => start = Some(next_page_start(&link.href)?),
                None => break,
            }
        }

        debug!("found {} instances", instances.len());
        Ok(instances)
    }

    // Returns None if the instance doesn't exist
    pub async fn get_instance(&self, id: &str) -> anyhow::Result<Option<Instance>> {
        let url = self.vpc_url(&format!("/v1/instances/{id}"), &[])?;
        let resp = self.http.get(url).bearer_auth(self.token().await?).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(handle_response(resp).await?))
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> anyhow::Result<T> {
        debug!("GET {url}");
        let resp = self.http.get(url).bearer_auth(self.token().await?).send().await?;
        handle_response(resp).await
    }

    fn vpc_url(&self, path: &str, extra: &[(&str, String)]) -> anyhow::Result<Url> {
        let base = format!("{}{path}", self.vpc_endpoint);
        let mut params = vec![("version", VPC_API_VERSION.to_string()), ("generation", VPC_API_GENERATION.to_string())];
        params.extend(extra.iter().cloned());
        Url::parse_with_params(&base, &params).map_err(|_| VpcError::invalid_endpoint(&base))
    }

    async fn token(&self) -> anyhow::Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(t) = cached.as_ref()
            && Instant::now() < t.refresh_at
        {
            return Ok(t.token.clone());
        }

        info!("requesting IAM token from {}", self.iam_endpoint);
        let body = form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", IAM_GRANT_TYPE)
            .append_pair("apikey", &self.api_key)
            .finish();
        let resp = self
            .http
            .post(format!("{}/identity/token", self.iam_endpoint))
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(reqwest::header::ACCEPT, "application/json")
            .body(body)
            .send()
            .await?;
        let token: IamTokenResponse = handle_response(resp).await?;

        let lifetime = token.expires_in.saturating_sub(TOKEN_REFRESH_MARGIN_SECONDS);
        *cached = Some(CachedToken {
            token: token.access_token.clone(),
            refresh_at: Instant::now() + Duration::from_secs(lifetime),
        });
        Ok(token.access_token)
    }
}

async fn handle_response<T: DeserializeOwned>(resp: reqwest::Response) -> anyhow::Result<T> {
    let status = resp.status();
    let text = resp.text().await?;
    if !status.is_success() {
        bail!(VpcError::api(&format!("{status}: {text}")));
    }
    Ok(serde_json::from_str(&text)?)
}

// The API hands back a full URL for the next page; all we need from it is the start token
fn next_page_start(href: &str) -> anyhow::Result<String> {
    let url = Url::parse(href).map_err(|_| VpcError::invalid_endpoint(href))?;
    url.query_pairs()
        .find(|(k, _)| k == "start")
        .map(|(_, v)| v.into_owned())
        .ok_or_else(|| VpcError::api(&format!("no start token in next page link {href}")))
}
