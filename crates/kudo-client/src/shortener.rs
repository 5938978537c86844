use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the link-shortening service. Shortening is cosmetic: every
/// failure mode falls back to the original link so a broken shortener
/// never blocks verification.
pub struct ShortenerClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ShortenerResponse {
    #[serde(rename = "shortenedUrl")]
    shortened_url: Option<String>,
}

impl ShortenerClient {
    pub fn new(endpoint: String, api_key: Option<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            endpoint,
            api_key,
        })
    }

    pub async fn shorten(&self, url: &str) -> String {
        let Some(key) = &self.api_key else {
            return url.to_string();
        };

        match self.try_shorten(key, url).await {
            Ok(Some(short)) => short,
            Ok(None) => url.to_string(),
            Err(e) => {
                warn!("shortener call failed: {e:#}");
                url.to_string()
            }
        }
    }

    async fn try_shorten(&self, key: &str, url: &str) -> anyhow::Result<Option<String>> {
        let resp = self
            .http
            .get(&self.endpoint)
            .query(&[("api", key), ("url", url)])
            .send()
            .await?
            .error_for_status()?
            .json::<ShortenerResponse>()
            .await?;
        Ok(resp.shortened_url)
    }
}
