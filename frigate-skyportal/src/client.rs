//! Secondary service client
//!
//! Two endpoints are used:
//!
//! - `GET {base}/api/candidates_filter`: paginated `(filter_id, candid)` matches
//! - `GET {base}/api/sources/{object_id}`: groups, classifications and names
//!
//! Both answer `{"status": "success" | "error", "message": ..., "data": ...}`.

use crate::config::{join_ids, SkyPortalConfig};
use crate::error::{Result, SkyPortalError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt::Debug;
use tracing::{debug, warn};

/// Query parameters for one candidates-filter page.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterMatchPageParams {
    /// ISO timestamps of the window bounds
    pub start_date: String,
    pub end_date: String,
    /// 1-based
    pub page_number: usize,
    pub per_page: usize,
    /// `None` when every group is searched
    pub group_ids: Option<Vec<i64>>,
    pub filter_ids: Vec<i64>,
    pub saved_only: bool,
    /// Total reported by an earlier page, passed back so the service can skip
    /// recounting
    pub total_matches: Option<u64>,
}

impl FilterMatchPageParams {
    /// Wire parameters, in request order.
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut q = vec![
            ("startDate", self.start_date.clone()),
            ("endDate", self.end_date.clone()),
            ("pageNumber", self.page_number.to_string()),
            ("numPerPage", self.per_page.to_string()),
        ];
        if self.saved_only {
            q.push(("savedStatus", "savedToAllSelected".to_string()));
        }
        if let Some(ids) = &self.group_ids {
            q.push(("groupIDs", join_ids(ids)));
        }
        if !self.filter_ids.is_empty() {
            q.push(("filterIDs", join_ids(&self.filter_ids)));
        }
        if let Some(total) = self.total_matches {
            q.push(("totalMatches", total.to_string()));
        }
        q
    }
}

/// One match: a candid that passed a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FilterMatch {
    #[serde(deserialize_with = "lenient_i64")]
    pub filter_id: i64,
    #[serde(rename = "passing_alert_id", alias = "match_id", deserialize_with = "lenient_i64")]
    pub match_id: i64,
}

/// `data` of a candidates-filter response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FilterMatchPage {
    #[serde(default)]
    pub candidates: Vec<FilterMatch>,
    #[serde(rename = "totalMatches", alias = "total_matches", default)]
    pub total_matches: Option<u64>,
}

/// One classification attached to a source.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Classification {
    #[serde(default)]
    pub classification: Option<String>,
    /// Produced by a model rather than a human
    #[serde(default)]
    pub ml: bool,
    #[serde(default)]
    pub probability: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct GroupRef {
    #[serde(deserialize_with = "lenient_i64")]
    id: i64,
}

/// `data` of a source lookup, reduced to the fields the pipeline uses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceRecord {
    pub group_ids: Vec<i64>,
    pub classifications: Vec<Classification>,
    /// Canonical external catalog name (e.g. the TNS designation)
    pub canonical_name: Option<String>,
}

impl<'de> Deserialize<'de> for SourceRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            #[serde(default)]
            groups: Vec<GroupRef>,
            #[serde(default)]
            classifications: Vec<Classification>,
            #[serde(default)]
            canonical_name: Option<String>,
            #[serde(default)]
            tns_name: Option<String>,
        }

        let raw = Raw::deserialize(deserializer)?;
        Ok(SourceRecord {
            group_ids: raw.groups.into_iter().map(|g| g.id).collect(),
            classifications: raw.classifications,
            canonical_name: raw
                .canonical_name
                .or(raw.tns_name)
                .filter(|name| !name.trim().is_empty()),
        })
    }
}

/// Accept integers and numeric strings.
fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<i64, D::Error> {
    use serde::de::Error;
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| D::Error::custom(format!("{n} is not an integer"))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("'{s}' is not an integer"))),
        other => Err(D::Error::custom(format!("expected an integer, got {other}"))),
    }
}

/// The two request shapes the collectors issue against the service.
#[async_trait]
pub trait SkyPortalClient: Debug + Send + Sync {
    async fn filter_matches_page(&self, params: &FilterMatchPageParams) -> Result<FilterMatchPage>;

    async fn object_metadata(&self, object_id: &str) -> Result<SourceRecord>;
}

/// Response envelope shared by both endpoints.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<Value>,
    #[serde(default)]
    data: Option<Value>,
}

/// HTTP-based SkyPortal client
#[derive(Debug, Clone)]
pub struct HttpSkyPortalClient {
    config: SkyPortalConfig,
    http: reqwest::Client,
}

impl HttpSkyPortalClient {
    pub fn new(config: SkyPortalConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| SkyPortalError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_http(config, http))
    }

    pub fn with_http(mut config: SkyPortalConfig, http: reqwest::Client) -> Self {
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        Self { config, http }
    }

    fn add_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(ref token) = self.config.token {
            req.header(reqwest::header::AUTHORIZATION, format!("token {token}"))
        } else {
            req
        }
    }

    /// GET `url`, retrying transient failures, and decode `data` as `T`.
    async fn get_data<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        let retry = self.config.retry;
        let mut failures = 0u32;
        let data = loop {
            match self.get_once(url, query).await {
                Ok(data) => break data,
                Err(e) if e.is_transient() && retry.should_retry(failures + 1) => {
                    failures += 1;
                    let delay = retry.delay_for(failures);
                    warn!(
                        error = %e,
                        attempt = failures,
                        max_retries = retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "SkyPortal request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        };

        let data = data.ok_or_else(|| SkyPortalError::Schema(format!("no data in response from {url}")))?;
        serde_json::from_value(data)
            .map_err(|e| SkyPortalError::Schema(format!("unexpected response from {url}: {e}")))
    }

    async fn get_once(&self, url: &str, query: &[(&str, String)]) -> Result<Option<Value>> {
        debug!(url, ?query, "SkyPortal request");
        let resp = self
            .add_auth(self.http.get(url))
            .query(query)
            .send()
            .await
            .map_err(|e| SkyPortalError::Connection(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(SkyPortalError::query(
                Some(status.as_u16()),
                &format!("status {status} from {url}: {text}"),
            ));
        }

        let envelope: Envelope = resp
            .json()
            .await
            .map_err(|e| SkyPortalError::Schema(format!("invalid response body: {e}")))?;
        match envelope.status.as_deref() {
            None | Some("success") => Ok(envelope.data),
            Some(other) => {
                let message = match envelope.message {
                    Some(Value::String(s)) => s,
                    Some(v) => v.to_string(),
                    None => format!("status '{other}' without message"),
                };
                Err(SkyPortalError::query(None, &message))
            }
        }
    }
}

#[async_trait]
impl SkyPortalClient for HttpSkyPortalClient {
    async fn filter_matches_page(&self, params: &FilterMatchPageParams) -> Result<FilterMatchPage> {
        let url = format!("{}/api/candidates_filter", self.config.base_url);
        self.get_data(&url, &params.to_query()).await
    }

    async fn object_metadata(&self, object_id: &str) -> Result<SourceRecord> {
        if object_id.is_empty() {
            return Err(SkyPortalError::Config("empty object id".into()));
        }
        let url = format!(
            "{}/api/sources/{}",
            self.config.base_url,
            urlencoding::encode(object_id)
        );
        self.get_data(&url, &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> HttpSkyPortalClient {
        HttpSkyPortalClient::new(SkyPortalConfig::new(server.uri(), Some("tok".into()))).unwrap()
    }

    fn params() -> FilterMatchPageParams {
        FilterMatchPageParams {
            start_date: "2023-02-25 00:00:00.000".into(),
            end_date: "2023-02-26 00:00:00.000".into(),
            page_number: 2,
            per_page: 500,
            group_ids: Some(vec![41, 43]),
            filter_ids: vec![],
            saved_only: true,
            total_matches: Some(1200),
        }
    }

    #[test]
    fn test_query_parameters() {
        let q = params().to_query();
        let keys: Vec<&str> = q.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            vec!["startDate", "endDate", "pageNumber", "numPerPage", "savedStatus", "groupIDs", "totalMatches"]
        );
        assert!(q.contains(&("groupIDs", "41,43".to_string())));

        let first = FilterMatchPageParams {
            group_ids: None,
            filter_ids: vec![3],
            saved_only: false,
            total_matches: None,
            ..params()
        };
        let keys: Vec<&str> = first.to_query().iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["startDate", "endDate", "pageNumber", "numPerPage", "filterIDs"]);
    }

    #[tokio::test]
    async fn test_filter_matches_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/candidates_filter"))
            .and(header("authorization", "token tok"))
            .and(query_param("pageNumber", "2"))
            .and(query_param("totalMatches", "1200"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": {
                    "candidates": [
                        {"filter_id": 7, "passing_alert_id": 123},
                        {"filter_id": "9", "passing_alert_id": 124}
                    ],
                    "totalMatches": 1200
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let page = client(&server).filter_matches_page(&params()).await.unwrap();
        assert_eq!(page.total_matches, Some(1200));
        assert_eq!(
            page.candidates,
            vec![
                FilterMatch { filter_id: 7, match_id: 123 },
                FilterMatch { filter_id: 9, match_id: 124 }
            ]
        );
    }

    #[tokio::test]
    async fn test_error_status_truncated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400).set_body_string("y".repeat(3000)))
            .mount(&server)
            .await;

        match client(&server).filter_matches_page(&params()).await.unwrap_err() {
            SkyPortalError::Query { status, message } => {
                assert_eq!(status, Some(400));
                assert_eq!(message.chars().count(), 1000);
            }
            other => panic!("expected Query, got: {other}"),
        }
    }

    #[tokio::test]
    async fn test_object_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/sources/ZTF23abcdefg"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": {
                    "id": "ZTF23abcdefg",
                    "groups": [{"id": 41, "name": "A"}, {"id": 43, "name": "B"}],
                    "classifications": [
                        {"classification": "SN Ia", "ml": false, "probability": 0.9},
                        {"classification": "AGN", "ml": true, "probability": 0.99}
                    ],
                    "tns_name": "2023abc"
                }
            })))
            .mount(&server)
            .await;

        let source = client(&server).object_metadata("ZTF23abcdefg").await.unwrap();
        assert_eq!(source.group_ids, vec![41, 43]);
        assert_eq!(source.classifications.len(), 2);
        assert_eq!(source.canonical_name.as_deref(), Some("2023abc"));
    }

    #[tokio::test]
    async fn test_object_id_is_percent_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/sources/odd%2Fid%3Fx%3D1%23y"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": {"groups": [], "classifications": []}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = client(&server).object_metadata("odd/id?x=1#y").await.unwrap();
        assert!(source.group_ids.is_empty());
        assert!(matches!(
            client(&server).object_metadata("").await,
            Err(SkyPortalError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_object_metadata_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "error",
                "message": "Invalid source ID"
            })))
            .mount(&server)
            .await;

        let err = client(&server).object_metadata("ZTF00").await.unwrap_err();
        assert!(matches!(err, SkyPortalError::Query { status: None, .. }));
    }

    #[tokio::test]
    async fn test_missing_data_is_schema_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
            .mount(&server)
            .await;

        let err = client(&server).object_metadata("ZTF00").await.unwrap_err();
        assert!(matches!(err, SkyPortalError::Schema(_)));
    }

    #[test]
    fn test_source_prefers_canonical_name() {
        let source: SourceRecord = serde_json::from_value(json!({
            "canonical_name": "SN 2023abc",
            "tns_name": "2023abc"
        }))
        .unwrap();
        assert_eq!(source.canonical_name.as_deref(), Some("SN 2023abc"));
        assert!(source.group_ids.is_empty());
    }
}
