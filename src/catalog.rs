//! Typed client for the wallpaper catalog backend.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::ApiConfig;
use crate::error::{Error, Result};

/// One wallpaper in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    /// Opaque identifier, unique within a listing.
    #[serde(alias = "_id")]
    pub id: String,
    /// Display name.
    #[serde(alias = "imageName", default)]
    pub name: String,
    /// Absolute URL of the viewable rendition.
    pub image_url: String,
    /// Absolute URL of the downloadable asset.
    pub download_url: String,
    /// Category the record belongs to.
    #[serde(default)]
    pub category: String,
}

impl ImageRecord {
    /// Checks that both URLs are absolute http(s) URLs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] naming the record and the bad field.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("imageUrl", &self.image_url),
            ("downloadUrl", &self.download_url),
        ] {
            if parse_absolute(value).is_none() {
                return Err(Error::Decode(format!(
                    "record {} has non-absolute {field}: {value:?}",
                    self.id
                )));
            }
        }
        Ok(())
    }
}

/// Payload for creating a record through `POST /images`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewImage {
    /// Display name.
    pub image_name: String,
    /// Viewable rendition URL.
    pub image_url: String,
    /// Downloadable asset URL.
    pub download_url: String,
    /// Target category.
    pub category: String,
}

impl NewImage {
    /// Validates the form before anything is sent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for empty fields or non-absolute URLs.
    pub fn validate(&self) -> Result<()> {
        if self.image_name.trim().is_empty() {
            return Err(Error::validation("imageName", "must not be empty"));
        }
        if self.category.trim().is_empty() {
            return Err(Error::validation("category", "must not be empty"));
        }
        if parse_absolute(&self.image_url).is_none() {
            return Err(Error::validation("imageUrl", "must be an absolute URL"));
        }
        if parse_absolute(&self.download_url).is_none() {
            return Err(Error::validation("downloadUrl", "must be an absolute URL"));
        }
        Ok(())
    }
}

/// Parses `value` as an absolute http or https URL.
pub(crate) fn parse_absolute(value: &str) -> Option<Url> {
    Url::parse(value)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
}

#[derive(Deserialize)]
struct CategoriesBody {
    categories: Vec<String>,
}

#[derive(Deserialize)]
struct DataBody {
    data: Vec<ImageRecord>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Read access to the catalog.
///
/// Single attempt per call: no caching, no retries.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Lists every category name, in backend order.
    async fn list_categories(&self) -> Result<Vec<String>>;

    /// Returns one representative image of `category`, if it has any.
    async fn category_thumbnail(&self, category: &str) -> Result<Option<ImageRecord>>;

    /// Lists every image in `category`.
    async fn images_in_category(&self, category: &str) -> Result<Vec<ImageRecord>>;

    /// Lists every image in the catalog.
    async fn all_images(&self) -> Result<Vec<ImageRecord>>;

    /// Fetches the binary payload behind an absolute URL.
    async fn fetch_bytes(&self, url: &str) -> Result<Bytes>;
}

/// Builds the HTTP client used for catalog requests.
fn build_http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .pool_idle_timeout(Duration::from_secs(60))
        .tcp_keepalive(Duration::from_secs(30))
        .user_agent(concat!("wallpaper-dl/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// [`CatalogClient`] over the backend's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    http: reqwest::Client,
    base: Url,
}

impl HttpCatalog {
    /// Creates a client for the backend at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `base_url` is not an absolute URL.
    pub fn new(http: reqwest::Client, base_url: &str) -> Result<Self> {
        let base = parse_absolute(base_url)
            .ok_or_else(|| Error::Config(format!("invalid API base URL: {base_url}")))?;
        Ok(Self { http, base })
    }

    /// Creates a client from API configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client cannot
    /// be built.
    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        Self::new(build_http_client(config.timeout())?, &config.base_url)
    }

    /// Resolves path segments against the base URL, percent-encoding each.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| Error::Config(format!("API base URL cannot have a path: {}", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        log::debug!("GET {url}");
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                url: url.to_string(),
                status,
            });
        }
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| Error::Decode(format!("{url}: {e}")))
    }

    /// Sends a JSON POST. Non-2xx answers become [`Error::Rejected`] carrying
    /// the backend's `error` message, or `fallback` when it has none.
    pub(crate) async fn post_json<B, T>(&self, url: Url, body: &B, fallback: &str) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        log::debug!("POST {url}");
        let response = self.http.post(url.clone()).json(body).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorBody>(&bytes)
                .ok()
                .and_then(|b| b.error)
                .unwrap_or_else(|| fallback.to_string());
            log::warn!("{url} rejected with {status}: {message}");
            return Err(Error::Rejected(message));
        }
        serde_json::from_slice(&bytes).map_err(|e| Error::Decode(format!("{url}: {e}")))
    }

    async fn get_records(&self, url: Url) -> Result<Vec<ImageRecord>> {
        let DataBody { data } = self.get_json(url).await?;
        data.iter().try_for_each(ImageRecord::validate)?;
        Ok(data)
    }

    /// Lists categories through the legacy `/wallpapers/categories` endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-success status or an
    /// unexpected body.
    pub async fn legacy_categories(&self) -> Result<Vec<String>> {
        self.get_json(self.endpoint(&["wallpapers", "categories"])?)
            .await
    }

    /// Creates records remotely. A single item is sent as an object, several
    /// as an array.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] before sending if any item is invalid,
    /// or [`Error::Rejected`] if the backend refuses.
    pub async fn create_images(&self, images: &[NewImage]) -> Result<()> {
        if images.is_empty() {
            return Err(Error::validation("images", "nothing to upload"));
        }
        images.iter().try_for_each(NewImage::validate)?;

        let url = self.endpoint(&["images"])?;
        let fallback = "Failed to add image";
        let _: serde_json::Value = match images {
            [single] => self.post_json(url, single, fallback).await?,
            many => self.post_json(url, many, fallback).await?,
        };
        log::info!("Uploaded {} image record(s)", images.len());
        Ok(())
    }
}

#[async_trait]
impl CatalogClient for HttpCatalog {
    async fn list_categories(&self) -> Result<Vec<String>> {
        let CategoriesBody { categories } = self
            .get_json(self.endpoint(&["images", "categories"])?)
            .await?;
        Ok(categories)
    }

    async fn category_thumbnail(&self, category: &str) -> Result<Option<ImageRecord>> {
        let mut url = self.endpoint(&["images", "category", category])?;
        url.query_pairs_mut().append_pair("limit", "1");
        Ok(self.get_records(url).await?.into_iter().next())
    }

    async fn images_in_category(&self, category: &str) -> Result<Vec<ImageRecord>> {
        self.get_records(self.endpoint(&["images", "category", category])?)
            .await
    }

    async fn all_images(&self) -> Result<Vec<ImageRecord>> {
        self.get_records(self.endpoint(&["images"])?).await
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Bytes> {
        let parsed =
            parse_absolute(url).ok_or_else(|| Error::Decode(format!("not an absolute URL: {url}")))?;
        log::debug!("GET {parsed} (binary)");
        let response = self.http.get(parsed).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                url: url.to_string(),
                status,
            });
        }
        Ok(response.bytes().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::MockServer;
    use httpmock::prelude::*;
    use serde_json::json;

    fn catalog(server: &MockServer) -> HttpCatalog {
        HttpCatalog::new(reqwest::Client::new(), &server.base_url()).unwrap()
    }

    fn record_json(id: &str, server: &MockServer) -> serde_json::Value {
        json!({
            "_id": id,
            "imageName": format!("Wallpaper {id}"),
            "imageUrl": server.url(format!("/img/{id}.jpg")),
            "downloadUrl": server.url(format!("/dl/{id}.jpg")),
            "category": "Nature",
        })
    }

    #[test]
    fn record_accepts_backend_field_names() {
        let record: ImageRecord = serde_json::from_value(json!({
            "_id": "66f",
            "imageName": "Lake",
            "imageUrl": "https://cdn.example.com/lake.jpg",
            "downloadUrl": "https://cdn.example.com/lake-full.jpg",
            "category": "Nature",
        }))
        .unwrap();
        assert_eq!(record.id, "66f");
        assert_eq!(record.name, "Lake");
        assert!(record.validate().is_ok());
    }

    #[test]
    fn record_with_relative_url_fails_validation() {
        let record = ImageRecord {
            id: "1".into(),
            name: "x".into(),
            image_url: "/relative.jpg".into(),
            download_url: "https://cdn.example.com/a.jpg".into(),
            category: "Nature".into(),
        };
        assert!(matches!(record.validate(), Err(Error::Decode(_))));
    }

    #[test]
    fn endpoint_percent_encodes_category() {
        let client = HttpCatalog::new(reqwest::Client::new(), "https://api.example.com/v1/").unwrap();
        let url = client
            .endpoint(&["images", "category", "Sci Fi/Space"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/v1/images/category/Sci%20Fi%2FSpace"
        );
    }

    #[test]
    fn invalid_base_url_is_config_error() {
        assert!(matches!(
            HttpCatalog::new(reqwest::Client::new(), "not a url"),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn list_categories_reads_envelope() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET).path("/images/categories");
            then.status(200)
                .json_body(json!({ "categories": ["Nature", "Anime"] }));
        });

        let categories = catalog(&server).list_categories().await.unwrap();
        mock.assert();
        assert_eq!(categories, ["Nature", "Anime"]);
    }

    #[tokio::test]
    async fn non_success_status_is_status_error() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/images/categories");
            then.status(503);
        });

        let err = catalog(&server).list_categories().await.unwrap_err();
        assert!(matches!(err, Error::Status { status, .. } if status.as_u16() == 503));
    }

    #[tokio::test]
    async fn thumbnail_requests_one_image() {
        let server = MockServer::start_async().await;
        let body = json!({ "data": [record_json("a", &server)] });
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/images/category/Nature")
                .query_param("limit", "1");
            then.status(200).json_body(body);
        });

        let thumb = catalog(&server)
            .category_thumbnail("Nature")
            .await
            .unwrap()
            .unwrap();
        mock.assert();
        assert_eq!(thumb.id, "a");
    }

    #[tokio::test]
    async fn thumbnail_of_empty_category_is_none() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/images/category/Empty");
            then.status(200).json_body(json!({ "data": [] }));
        });

        assert!(
            catalog(&server)
                .category_thumbnail("Empty")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn all_images_preserves_backend_order() {
        let server = MockServer::start_async().await;
        let body = json!({ "data": [record_json("b", &server), record_json("a", &server)] });
        server.mock(|when, then| {
            when.method(GET).path("/images");
            then.status(200).json_body(body);
        });

        let images = catalog(&server).all_images().await.unwrap();
        let ids: Vec<_> = images.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
    }

    #[tokio::test]
    async fn malformed_listing_is_decode_error() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/images/category/Nature");
            then.status(200).json_body(json!({ "items": [] }));
        });

        let err = catalog(&server)
            .images_in_category("Nature")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[tokio::test]
    async fn legacy_categories_reads_bare_array() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/wallpapers/categories");
            then.status(200).json_body(json!(["Cars", "Space"]));
        });

        assert_eq!(
            catalog(&server).legacy_categories().await.unwrap(),
            ["Cars", "Space"]
        );
    }

    #[tokio::test]
    async fn fetch_bytes_returns_payload() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/dl/a.jpg");
            then.status(200).body("JPEGDATA");
        });

        let bytes = catalog(&server)
            .fetch_bytes(&server.url("/dl/a.jpg"))
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"JPEGDATA");
    }

    #[tokio::test]
    async fn create_single_image_posts_object() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST).path("/images").json_body(json!({
                "imageName": "Dune",
                "imageUrl": "https://cdn.example.com/dune.jpg",
                "downloadUrl": "https://cdn.example.com/dune-full.jpg",
                "category": "Nature",
            }));
            then.status(201).json_body(json!({ "message": "created" }));
        });

        catalog(&server)
            .create_images(&[NewImage {
                image_name: "Dune".into(),
                image_url: "https://cdn.example.com/dune.jpg".into(),
                download_url: "https://cdn.example.com/dune-full.jpg".into(),
                category: "Nature".into(),
            }])
            .await
            .unwrap();
        mock.assert();
    }

    #[tokio::test]
    async fn create_several_images_posts_array() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST).path("/images").json_body(json!([
                {
                    "imageName": "Dune",
                    "imageUrl": "https://cdn.example.com/dune.jpg",
                    "downloadUrl": "https://cdn.example.com/dune-full.jpg",
                    "category": "Nature",
                },
                {
                    "imageName": "Reef",
                    "imageUrl": "https://cdn.example.com/reef.jpg",
                    "downloadUrl": "https://cdn.example.com/reef-full.jpg",
                    "category": "Ocean",
                },
            ]));
            then.status(201).json_body(json!({ "message": "created" }));
        });

        let images = [
            NewImage {
                image_name: "Dune".into(),
                image_url: "https://cdn.example.com/dune.jpg".into(),
                download_url: "https://cdn.example.com/dune-full.jpg".into(),
                category: "Nature".into(),
            },
            NewImage {
                image_name: "Reef".into(),
                image_url: "https://cdn.example.com/reef.jpg".into(),
                download_url: "https://cdn.example.com/reef-full.jpg".into(),
                category: "Ocean".into(),
            },
        ];
        catalog(&server).create_images(&images).await.unwrap();
        mock.assert();
    }

    #[tokio::test]
    async fn create_invalid_image_sends_nothing() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST).path("/images");
            then.status(201);
        });

        let err = catalog(&server)
            .create_images(&[NewImage {
                image_name: "Dune".into(),
                image_url: "dune.jpg".into(),
                download_url: "https://cdn.example.com/dune-full.jpg".into(),
                category: "Nature".into(),
            }])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { field: "imageUrl", .. }));
        mock.assert_calls(0);
    }
}
