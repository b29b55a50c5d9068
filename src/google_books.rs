//! Client for the Google Books volumes API.
//!
//! Only transport failures are retried; any HTTP status other than 404 on a
//! single-volume lookup is reported as [`Error::Upstream`].

use std::time::Duration;

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::{
    book::NewBook,
    config::Config,
    error::{Error, Result},
};

/// Google caps `maxResults` at 40.
pub const MAX_SEARCH_RESULTS: u32 = 40;

const MAX_RETRIES: u32 = 3;
const BASE_DELAY_MS: u64 = 200;

/// Send with exponential backoff on transport errors (200ms, 400ms, 800ms).
async fn retry_send<F, Fut>(f: F) -> Result<reqwest::Response, reqwest::Error>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    for attempt in 0..MAX_RETRIES {
        match f().await {
            Ok(resp) => return Ok(resp),
            Err(e) => {
                let delay = Duration::from_millis(BASE_DELAY_MS * 2u64.pow(attempt));
                warn!(
                    attempt = attempt + 1,
                    max_retries = MAX_RETRIES,
                    "Google Books request failed, retrying in {delay:?}: {e}"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
    f().await
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub query: String,
    pub total_results: usize,
    pub results: Vec<NewBook>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeList {
    #[serde(default)]
    items: Vec<Volume>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Volume {
    id: Option<String>,
    #[serde(default)]
    volume_info: VolumeInfo,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct VolumeInfo {
    title: Option<String>,
    authors: Vec<String>,
    description: Option<String>,
    published_date: Option<String>,
    page_count: Option<i64>,
    categories: Vec<String>,
    average_rating: Option<f64>,
    industry_identifiers: Vec<IndustryIdentifier>,
    image_links: ImageLinks,
}

#[derive(Deserialize)]
struct IndustryIdentifier {
    #[serde(rename = "type")]
    kind: String,
    identifier: String,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ImageLinks {
    extra_large: Option<String>,
    large: Option<String>,
    medium: Option<String>,
    small: Option<String>,
    thumbnail: Option<String>,
    small_thumbnail: Option<String>,
}

impl Volume {
    fn into_new_book(self) -> Option<NewBook> {
        let google_books_id = self.id?;
        let info = self.volume_info;
        let isbn = info
            .industry_identifiers
            .into_iter()
            .find(|i| i.kind == "ISBN_13" || i.kind == "ISBN_10")
            .map(|i| i.identifier);
        let links = info.image_links;
        let cover_image = links
            .extra_large
            .or(links.large)
            .or(links.medium)
            .or(links.small)
            .or(links.thumbnail)
            .or(links.small_thumbnail);
        let author = if info.authors.is_empty() {
            "Unknown Author".to_string()
        } else {
            info.authors.join(", ")
        };
        Some(NewBook {
            google_books_id,
            title: info.title.unwrap_or_else(|| "Unknown Title".to_string()),
            author,
            isbn,
            description: info.description,
            cover_image,
            published_date: info.published_date,
            page_count: info.page_count,
            genres: info.categories,
            average_rating: info.average_rating.unwrap_or(0.0),
        })
    }
}

pub struct GoogleBooksClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    cache: Cache<String, NewBook>,
}

impl GoogleBooksClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
        cache_ttl: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            cache: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(cache_ttl)
                .build(),
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(
            &config.google_books_base_url,
            config.google_books_api_key.clone(),
            Duration::from_secs(config.google_books_timeout_secs),
            Duration::from_secs(config.google_books_cache_ttl_secs),
        )
    }

    async fn get(&self, url: &str, params: &[(&str, String)]) -> Result<reqwest::Response> {
        let mut params = params.to_vec();
        if let Some(key) = &self.api_key {
            params.push(("key", key.clone()));
        }
        retry_send(|| self.http.get(url).query(&params).send())
            .await
            .map_err(|e| Error::Upstream(e.to_string()))
    }

    pub async fn search(
        &self,
        query: &str,
        max_results: u32,
        start_index: u32,
    ) -> Result<SearchResults> {
        let url = format!("{}/volumes", self.base_url);
        let params = [
            ("q", query.to_string()),
            ("maxResults", max_results.clamp(1, MAX_SEARCH_RESULTS).to_string()),
            ("startIndex", start_index.to_string()),
        ];
        let response = self.get(&url, &params).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Upstream(format!("search returned {status}")));
        }
        let list: VolumeList = response
            .json()
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;
        let results: Vec<NewBook> = list
            .items
            .into_iter()
            .filter_map(Volume::into_new_book)
            .collect();
        info!("Found {} books for query: {query}", results.len());
        Ok(SearchResults {
            query: query.to_string(),
            total_results: results.len(),
            results,
        })
    }

    /// Look up one volume; `None` when Google does not know the id.
    pub async fn get_volume(&self, google_books_id: &str) -> Result<Option<NewBook>> {
        if let Some(book) = self.cache.get(google_books_id).await {
            return Ok(Some(book));
        }
        let url = format!("{}/volumes/{google_books_id}", self.base_url);
        let response = self.get(&url, &[]).await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Error::Upstream(format!(
                "volume {google_books_id} returned {status}"
            )));
        }
        let volume: Volume = response
            .json()
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;
        let book = volume.into_new_book();
        if let Some(book) = &book {
            self.cache
                .insert(google_books_id.to_string(), book.clone())
                .await;
        }
        Ok(book)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path, query_param},
    };

    fn client(server: &MockServer, api_key: Option<&str>) -> GoogleBooksClient {
        GoogleBooksClient::new(
            &server.uri(),
            api_key.map(str::to_string),
            Duration::from_secs(2),
            Duration::from_secs(60),
        )
        .unwrap()
    }

    fn dune() -> serde_json::Value {
        json!({
            "id": "dune-1",
            "volumeInfo": {
                "title": "Dune",
                "authors": ["Frank Herbert"],
                "pageCount": 412,
                "categories": ["Fiction"],
                "industryIdentifiers": [
                    {"type": "OTHER", "identifier": "X1"},
                    {"type": "ISBN_10", "identifier": "0441013597"},
                    {"type": "ISBN_13", "identifier": "9780441013593"}
                ],
                "imageLinks": {"thumbnail": "http://t", "medium": "http://m"}
            }
        })
    }

    #[tokio::test]
    async fn search_parses_volumes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/volumes"))
            .and(query_param("q", "dune"))
            .and(query_param("maxResults", "40"))
            .and(query_param("key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "totalItems": 2,
                "items": [dune(), {"id": "bare"}, {"volumeInfo": {"title": "no id"}}]
            })))
            .mount(&server)
            .await;

        let results = client(&server, Some("secret"))
            .search("dune", 100, 0)
            .await
            .unwrap();
        assert_eq!(results.total_results, 2);
        let dune = &results.results[0];
        assert_eq!(dune.google_books_id, "dune-1");
        assert_eq!(dune.author, "Frank Herbert");
        assert_eq!(dune.isbn.as_deref(), Some("0441013597"));
        assert_eq!(dune.cover_image.as_deref(), Some("http://m"));
        assert_eq!(dune.genres, vec!["Fiction".to_string()]);
        assert_eq!(dune.average_rating, 0.0);

        let bare = &results.results[1];
        assert_eq!(bare.title, "Unknown Title");
        assert_eq!(bare.author, "Unknown Author");
        assert_eq!(bare.page_count, None);
    }

    #[tokio::test]
    async fn missing_volume_is_none_and_hits_are_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/volumes/dune-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(dune()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/volumes/nope"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client(&server, None);
        assert!(client.get_volume("nope").await.unwrap().is_none());
        let first = client.get_volume("dune-1").await.unwrap().unwrap();
        let second = client.get_volume("dune-1").await.unwrap().unwrap();
        assert_eq!(first.page_count, Some(412));
        assert_eq!(first.title, second.title);
    }

    #[tokio::test]
    async fn server_errors_are_upstream_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let err = client(&server, None).search("dune", 10, 0).await.unwrap_err();
        assert!(matches!(err, Error::Upstream(_)));
    }
}
