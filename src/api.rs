use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::ApiError;
use crate::models::{AttributionFilter, BadgeAttribution, MemberRef, Page, ProjectRef};

const USER_AGENT: &str = concat!("badge-analytics/", env!("CARGO_PKG_VERSION"));

/// Anything that can serve one page of a listing.
#[async_trait]
pub trait PageSource<T: Send>: Send + Sync {
    async fn fetch_page(&self, page: u32) -> Result<Page<T>, ApiError>;
}

/// The listings the chart pipelines read from.
#[async_trait]
pub trait BadgeSource: Send + Sync {
    async fn badge_attributions(
        &self,
        organization_id: u64,
        filter: &AttributionFilter,
    ) -> Result<Vec<BadgeAttribution>, ApiError>;

    async fn confirmed_member_count(&self, organization_id: u64) -> Result<usize, ApiError>;
}

/// Walks every page of `source` in order and concatenates the records.
///
/// Pages are requested one at a time. The first failure aborts the walk and
/// whatever was already collected is dropped.
pub async fn fetch_all<T, S>(source: &S) -> Result<Vec<T>, ApiError>
where
    T: Send,
    S: PageSource<T> + ?Sized,
{
    let first = source.fetch_page(1).await?;
    let total_pages = first.total_pages();
    let mut records = first.data;

    for page in 2..=total_pages {
        let next = source.fetch_page(page).await?;
        records.extend(next.data);
    }

    tracing::debug!(total_pages, records = records.len(), "Listing fully fetched");
    Ok(records)
}

pub struct ApiClient {
    http_client: reqwest::Client,
    base_url: String,
    token: String,
    page_size: u32,
}

impl ApiClient {
    pub fn new(base_url: &str, token: &str, page_size: u32) -> Result<Self, ApiError> {
        reqwest::Url::parse(base_url).map_err(|e| ApiError::InvalidUrl(e.to_string()))?;

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            page_size: page_size.max(1),
        })
    }

    pub async fn projects(&self, organization_id: u64) -> Result<Vec<ProjectRef>, ApiError> {
        let endpoint = self.endpoint(format!("organizations/{organization_id}/projects"), Vec::new());
        fetch_all(&endpoint).await
    }

    pub async fn confirmed_members(&self, organization_id: u64) -> Result<Vec<MemberRef>, ApiError> {
        fetch_all(&self.members_endpoint(organization_id)).await
    }

    fn attributions_endpoint(&self, organization_id: u64, filter: &AttributionFilter) -> Endpoint<'_> {
        let mut query = Vec::new();
        if let Some(series) = &filter.series {
            query.push(("series", series.clone()));
        }
        if let Some(project_id) = filter.project_id {
            query.push(("project_id", project_id.to_string()));
        }
        self.endpoint(
            format!("organizations/{organization_id}/badges/attributions"),
            query,
        )
    }

    fn members_endpoint(&self, organization_id: u64) -> Endpoint<'_> {
        self.endpoint(
            format!("organizations/{organization_id}/members"),
            vec![("status", "confirmed".to_string())],
        )
    }

    fn endpoint(&self, path: String, query: Vec<(&'static str, String)>) -> Endpoint<'_> {
        Endpoint {
            client: self,
            url: format!("{}/{}", self.base_url, path),
            query,
        }
    }
}

#[async_trait]
impl BadgeSource for ApiClient {
    async fn badge_attributions(
        &self,
        organization_id: u64,
        filter: &AttributionFilter,
    ) -> Result<Vec<BadgeAttribution>, ApiError> {
        let endpoint = self.attributions_endpoint(organization_id, filter);
        let records: Vec<BadgeAttribution> = fetch_all(&endpoint).await?;
        tracing::info!(
            organization_id,
            series = ?filter.series,
            project_id = ?filter.project_id,
            count = records.len(),
            "Fetched badge attributions"
        );
        Ok(records)
    }

    async fn confirmed_member_count(&self, organization_id: u64) -> Result<usize, ApiError> {
        Ok(self.confirmed_members(organization_id).await?.len())
    }
}

/// A single listing resource with its fixed query parameters.
struct Endpoint<'a> {
    client: &'a ApiClient,
    url: String,
    query: Vec<(&'static str, String)>,
}

impl Endpoint<'_> {
    fn request(&self, page: u32) -> reqwest::RequestBuilder {
        self.client
            .http_client
            .get(&self.url)
            .bearer_auth(&self.client.token)
            .query(&self.query)
            .query(&[("page", page), ("per_page", self.client.page_size)])
    }
}

#[async_trait]
impl<T> PageSource<T> for Endpoint<'_>
where
    T: DeserializeOwned + Send + 'static,
{
    async fn fetch_page(&self, page: u32) -> Result<Page<T>, ApiError> {
        tracing::debug!(url = %self.url, page, "Requesting page");

        let response = self
            .request(page)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ApiError::Status(status.as_u16(), error_text));
        }

        response
            .json::<Page<T>>()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PageMeta;
    use reqwest::header::AUTHORIZATION;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    struct StaticPages {
        pages: Vec<Vec<u32>>,
        with_meta: bool,
        fail_on: Option<u32>,
        requested: Mutex<Vec<u32>>,
    }

    impl StaticPages {
        fn new(pages: Vec<Vec<u32>>) -> Self {
            Self {
                pages,
                with_meta: true,
                fail_on: None,
                requested: Mutex::new(Vec::new()),
            }
        }

        fn requested(&self) -> Vec<u32> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageSource<u32> for StaticPages {
        async fn fetch_page(&self, page: u32) -> Result<Page<u32>, ApiError> {
            self.requested.lock().unwrap().push(page);
            if self.fail_on == Some(page) {
                return Err(ApiError::Status(500, "boom".to_string()));
            }
            let data = self.pages.get(page as usize - 1).cloned().unwrap_or_default();
            let meta = self.with_meta.then(|| PageMeta {
                total_pages: Some(self.pages.len() as u32),
            });
            Ok(Page { data, meta })
        }
    }

    #[tokio::test]
    async fn concatenates_every_page_in_order() {
        let source = StaticPages::new(vec![vec![1, 2, 3], vec![4], vec![5, 6]]);
        let records = fetch_all(&source).await.unwrap();
        assert_eq!(records, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(source.requested(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn missing_meta_means_one_page() {
        let mut source = StaticPages::new(vec![vec![1, 2], vec![3]]);
        source.with_meta = false;
        let records = fetch_all(&source).await.unwrap();
        assert_eq!(records, vec![1, 2]);
        assert_eq!(source.requested(), vec![1]);
    }

    #[tokio::test]
    async fn failure_discards_partial_results() {
        let mut source = StaticPages::new(vec![vec![1], vec![2], vec![3]]);
        source.fail_on = Some(2);
        let result = fetch_all(&source).await;
        assert!(matches!(result, Err(ApiError::Status(500, _))));
        assert_eq!(source.requested(), vec![1, 2]);
    }

    #[tokio::test]
    async fn empty_pages_are_still_walked() {
        let source = StaticPages::new(vec![vec![], vec![7], vec![]]);
        let records = fetch_all(&source).await.unwrap();
        assert_eq!(records, vec![7]);
        assert_eq!(source.requested(), vec![1, 2, 3]);
    }

    #[test]
    fn rejects_invalid_base_url() {
        let result = ApiClient::new("not a url", "token", 500);
        assert!(matches!(result, Err(ApiError::InvalidUrl(_))));
    }

    #[test]
    fn trims_trailing_slash_and_clamps_page_size() {
        let client = ApiClient::new("https://api.example.org/v1/", "token", 0).unwrap();
        assert_eq!(client.base_url, "https://api.example.org/v1");
        assert_eq!(client.page_size, 1);
    }

    fn query_pairs(request: &reqwest::Request) -> Vec<(String, String)> {
        request.url().query_pairs().into_owned().collect()
    }

    fn pairs(expected: &[(&str, &str)]) -> Vec<(String, String)> {
        expected
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn attribution_request_carries_token_filters_and_paging() {
        let client = ApiClient::new("https://api.example.org/v1", "secret", 250).unwrap();
        let filter = AttributionFilter {
            series: Some("Série CPS".to_string()),
            project_id: Some(3),
        };
        let request = client
            .attributions_endpoint(42, &filter)
            .request(2)
            .build()
            .unwrap();

        assert_eq!(request.url().path(), "/v1/organizations/42/badges/attributions");
        assert_eq!(
            query_pairs(&request),
            pairs(&[("series", "Série CPS"), ("project_id", "3"), ("page", "2"), ("per_page", "250")])
        );
        assert_eq!(request.headers()[AUTHORIZATION].to_str().unwrap(), "Bearer secret");
    }

    #[test]
    fn unfiltered_request_sends_only_paging() {
        let client = ApiClient::new("https://api.example.org", "secret", 500).unwrap();
        let request = client
            .attributions_endpoint(42, &AttributionFilter::default())
            .request(1)
            .build()
            .unwrap();
        assert_eq!(query_pairs(&request), pairs(&[("page", "1"), ("per_page", "500")]));
    }

    #[test]
    fn member_request_asks_for_confirmed_only() {
        let client = ApiClient::new("https://api.example.org", "secret", 500).unwrap();
        let request = client.members_endpoint(7).request(3).build().unwrap();

        assert_eq!(request.url().path(), "/organizations/7/members");
        assert_eq!(
            query_pairs(&request),
            pairs(&[("status", "confirmed"), ("page", "3"), ("per_page", "500")])
        );
        assert_eq!(request.headers()[AUTHORIZATION].to_str().unwrap(), "Bearer secret");
    }

    /// Answers one HTTP request with `status` and `body`, then returns the raw
    /// request head it received.
    async fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buffer = [0u8; 1024];
            while !received.windows(4).any(|window| window == b"\r\n\r\n") {
                let read = socket.read(&mut buffer).await.unwrap();
                if read == 0 {
                    break;
                }
                received.extend_from_slice(&buffer[..read]);
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&received).into_owned()
        });
        (base_url, server)
    }

    #[tokio::test]
    async fn non_success_status_becomes_status_error() {
        let (base_url, server) = serve_once("503 Service Unavailable", "maintenance").await;
        let client = ApiClient::new(&base_url, "secret", 500).unwrap();

        match client.confirmed_members(7).await {
            Err(ApiError::Status(503, body)) => assert_eq!(body, "maintenance"),
            other => panic!("expected a 503 status error, got {other:?}"),
        }

        let request = server.await.unwrap();
        assert!(
            request.starts_with("GET /organizations/7/members?status=confirmed&page=1&per_page=500 "),
            "{request}"
        );
        assert!(request.to_ascii_lowercase().contains("authorization: bearer secret"));
    }

    #[tokio::test]
    async fn served_page_keeps_records_around_a_malformed_one() {
        let (base_url, server) = serve_once(
            "200 OK",
            r#"{"data":[{"id":1},{"id":2,"project":{"id":3,"title":null}},{"id":"x"},{"id":4}]}"#,
        )
        .await;
        let client = ApiClient::new(&base_url, "secret", 500).unwrap();

        let records = client
            .badge_attributions(9, &AttributionFilter::default())
            .await
            .unwrap();
        let ids: Vec<u64> = records.iter().map(|record| record.id).collect();
        assert_eq!(ids, vec![1, 2, 4]);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn undecodable_body_becomes_parse_error() {
        let (base_url, server) = serve_once("200 OK", "<html>oops</html>").await;
        let client = ApiClient::new(&base_url, "secret", 500).unwrap();

        let result = client.projects(9).await;
        assert!(matches!(result, Err(ApiError::Parse(_))), "{result:?}");
        server.await.unwrap();
    }
}
