use std::time::Duration;

use kudo_types::like::{LikeDelivery, LikeOutcome};
use serde::Deserialize;
use tracing::warn;

/// The action call is abandoned and reported as failed after this long.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the external service that performs the actual like action.
pub struct LikeApiClient {
    http: reqwest::Client,
    url_template: String,
}

/// Wire shape of the action API response. Fields beyond `status` only
/// matter on success, so they decode as optional and get validated in
/// `classify`: a status-1 body missing any of them is malformed, not a
/// delivery with zeroes.
#[derive(Debug, Deserialize)]
struct RawLikeResponse {
    status: i64,
    #[serde(rename = "PlayerNickname")]
    player_nickname: Option<String>,
    #[serde(rename = "LikesbeforeCommand")]
    likes_before: Option<i64>,
    #[serde(rename = "LikesafterCommand")]
    likes_after: Option<i64>,
    #[serde(rename = "LikesGivenByAPI")]
    likes_given: Option<i64>,
}

impl LikeApiClient {
    /// `url_template` carries `{region}` and `{uid}` placeholders.
    pub fn new(url_template: String) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http, url_template })
    }

    /// Calls the action API once. Transport, decode, and unknown-status
    /// failures all fold into `LikeOutcome::Failed`; there is no retry.
    pub async fn deliver(&self, region: &str, uid: &str) -> LikeOutcome {
        let url = request_url(&self.url_template, region, uid);
        match self.fetch(&url).await {
            Ok(raw) => classify(raw),
            Err(e) => {
                warn!("like API call failed: {e:#}");
                LikeOutcome::Failed {
                    detail: Some(format!("{e:#}")),
                }
            }
        }
    }

    async fn fetch(&self, url: &str) -> anyhow::Result<RawLikeResponse> {
        let resp = self.http.get(url).send().await?.error_for_status()?;
        Ok(resp.json::<RawLikeResponse>().await?)
    }
}

fn request_url(template: &str, region: &str, uid: &str) -> String {
    template.replace("{region}", region).replace("{uid}", uid)
}

fn classify(raw: RawLikeResponse) -> LikeOutcome {
    match raw.status {
        1 => match (
            raw.player_nickname,
            raw.likes_before,
            raw.likes_after,
            raw.likes_given,
        ) {
            (Some(nickname), Some(before), Some(after), Some(added)) => {
                LikeOutcome::Delivered(LikeDelivery {
                    nickname,
                    likes_before: before,
                    likes_added: added,
                    likes_after: after,
                })
            }
            _ => LikeOutcome::Failed {
                detail: Some("status 1 response missing player fields".into()),
            },
        },
        2 => LikeOutcome::Saturated,
        other => LikeOutcome::Failed {
            detail: Some(format!("unexpected status {other}")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(body: &str) -> RawLikeResponse {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn url_template_expansion() {
        let url = request_url("https://api.example/like?uid={uid}&region={region}", "ind", "12345");
        assert_eq!(url, "https://api.example/like?uid=12345&region=ind");
    }

    #[test]
    fn status_one_with_full_fields_is_delivered() {
        let raw = decode(
            r#"{"status":1,"PlayerNickname":"Ace","LikesbeforeCommand":10,
                "LikesafterCommand":110,"LikesGivenByAPI":100}"#,
        );
        assert_eq!(
            classify(raw),
            LikeOutcome::Delivered(LikeDelivery {
                nickname: "Ace".into(),
                likes_before: 10,
                likes_added: 100,
                likes_after: 110,
            })
        );
    }

    #[test]
    fn status_one_missing_fields_is_a_failure() {
        let raw = decode(r#"{"status":1,"PlayerNickname":"Ace"}"#);
        assert!(matches!(classify(raw), LikeOutcome::Failed { .. }));
    }

    #[test]
    fn status_two_is_saturated() {
        let raw = decode(r#"{"status":2}"#);
        assert_eq!(classify(raw), LikeOutcome::Saturated);
    }

    #[test]
    fn unknown_status_is_a_failure_with_detail() {
        let raw = decode(r#"{"status":7}"#);
        match classify(raw) {
            LikeOutcome::Failed { detail: Some(d) } => assert!(d.contains('7')),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn extra_fields_are_tolerated() {
        let raw = decode(r#"{"status":2,"Server":"eu-3","Queue":0}"#);
        assert_eq!(classify(raw), LikeOutcome::Saturated);
    }
}
