//! Category browser with a persisted thumbnail cache.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::catalog::CatalogClient;
use crate::error::Result;
use crate::fanout::settle_all;
use crate::storage::{KeyValueStore, keys, read_json, write_json};

/// Category name to representative image URL (`None` when the category has
/// no image or its thumbnail could not be fetched).
pub type CategoryThumbnailMap = BTreeMap<String, Option<String>>;

/// Where a listing came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingSource {
    /// Served from the persisted cache without network calls.
    Cache,
    /// Freshly fetched from the catalog.
    Network,
}

/// Sorted categories with one thumbnail each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryListing {
    /// Category names in display order.
    pub categories: Vec<String>,
    /// Thumbnail per category.
    pub thumbnails: CategoryThumbnailMap,
    /// Origin of this listing.
    pub source: ListingSource,
}

impl CategoryListing {
    /// Returns the thumbnail URL for `category`, if any.
    #[must_use]
    pub fn thumbnail(&self, category: &str) -> Option<&str> {
        self.thumbnails.get(category)?.as_deref()
    }
}

/// Case- and accent-folded sort key: decomposed, combining marks dropped,
/// lowercased.
fn primary_key(s: &str) -> String {
    s.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Human-friendly ordering in the manner of a root-locale collation.
///
/// Base letters decide first (`É` sorts with `E`), then unaccented before
/// accented, then lowercase before uppercase, then code point order.
#[must_use]
pub fn locale_cmp(a: &str, b: &str) -> Ordering {
    primary_key(a)
        .cmp(&primary_key(b))
        .then_with(|| {
            let accented = |s: &str| s.nfd().flat_map(char::to_lowercase).collect::<String>();
            accented(a).cmp(&accented(b))
        })
        .then_with(|| {
            a.chars()
                .zip(b.chars())
                .find(|(x, y)| x != y)
                .map_or(Ordering::Equal, |(x, y)| {
                    match (x.is_lowercase(), y.is_lowercase()) {
                        (true, false) => Ordering::Less,
                        (false, true) => Ordering::Greater,
                        _ => Ordering::Equal,
                    }
                })
        })
        .then_with(|| a.cmp(b))
}

/// Loads categories and their thumbnails, preferring a fresh cache.
pub struct CategoryBrowser<'a, C: ?Sized, S: ?Sized> {
    client: &'a C,
    store: &'a S,
    ttl: Duration,
}

impl<'a, C, S> CategoryBrowser<'a, C, S>
where
    C: CatalogClient + ?Sized,
    S: KeyValueStore + ?Sized,
{
    /// Creates a browser whose cache expires after `ttl`.
    pub const fn new(client: &'a C, store: &'a S, ttl: Duration) -> Self {
        Self { client, store, ttl }
    }

    /// Returns the cached listing if it is complete and younger than the TTL.
    pub fn cached(&self, now: DateTime<Utc>) -> Option<CategoryListing> {
        let written = self
            .store
            .get(keys::CATEGORIES_CACHED_AT)
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())?
            .with_timezone(&Utc);
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        if written > now {
            log::debug!("Category cache written at {written} is in the future, refetching");
            return None;
        }
        if now.signed_duration_since(written) > ttl {
            log::debug!("Category cache written at {written} is stale");
            return None;
        }

        Some(CategoryListing {
            categories: read_json(self.store, keys::CATEGORIES)?,
            thumbnails: read_json(self.store, keys::CATEGORY_IMAGES)?,
            source: ListingSource::Cache,
        })
    }

    /// Returns the category listing, from cache when fresh.
    ///
    /// On a miss the category list is fetched and sorted, then one thumbnail
    /// per category is fetched concurrently. A failed thumbnail degrades
    /// that category to "no image"; only a failed category list is an error.
    ///
    /// # Errors
    ///
    /// Returns the catalog error if the category list cannot be fetched.
    pub async fn load(&self) -> Result<CategoryListing> {
        let now = Utc::now();
        if let Some(listing) = self.cached(now) {
            log::debug!("Serving {} categories from cache", listing.categories.len());
            return Ok(listing);
        }

        let mut categories = self.client.list_categories().await?;
        categories.sort_by(|a, b| locale_cmp(a, b));

        let results = settle_all(
            categories
                .iter()
                .map(|category| self.client.category_thumbnail(category)),
        )
        .await;

        let thumbnails: CategoryThumbnailMap = categories
            .iter()
            .zip(results)
            .map(|(category, result)| {
                let url = match result {
                    Ok(record) => record.map(|r| r.image_url),
                    Err(e) => {
                        log::warn!("Thumbnail for {category} unavailable: {e}");
                        None
                    }
                };
                (category.clone(), url)
            })
            .collect();

        let listing = CategoryListing {
            categories,
            thumbnails,
            source: ListingSource::Network,
        };
        if let Err(e) = self.write_cache(&listing, now) {
            log::warn!("Failed to cache categories: {e}");
        }
        Ok(listing)
    }

    fn write_cache(&self, listing: &CategoryListing, now: DateTime<Utc>) -> Result<()> {
        write_json(self.store, keys::CATEGORIES, &listing.categories)?;
        write_json(self.store, keys::CATEGORY_IMAGES, &listing.thumbnails)?;
        self.store
            .set(keys::CATEGORIES_CACHED_AT, &now.to_rfc3339())
    }

    /// Drops the cached listing so the next [`load`](Self::load) refetches.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub fn invalidate(&self) -> Result<()> {
        self.store.remove(keys::CATEGORIES)?;
        self.store.remove(keys::CATEGORY_IMAGES)?;
        self.store.remove(keys::CATEGORIES_CACHED_AT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ImageRecord;
    use crate::error::Error;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    const DAY: Duration = Duration::from_secs(86_400);

    /// Catalog double with scripted categories and per-category thumbnails.
    struct ScriptedCatalog {
        categories: Vec<&'static str>,
        failing: Vec<&'static str>,
        empty: Vec<&'static str>,
        list_calls: AtomicUsize,
        thumbnail_calls: AtomicUsize,
    }

    impl ScriptedCatalog {
        fn new(categories: Vec<&'static str>) -> Self {
            Self {
                categories,
                failing: Vec::new(),
                empty: Vec::new(),
                list_calls: AtomicUsize::new(0),
                thumbnail_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CatalogClient for ScriptedCatalog {
        async fn list_categories(&self) -> Result<Vec<String>> {
            self.list_calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(self.categories.iter().map(ToString::to_string).collect())
        }

        async fn category_thumbnail(&self, category: &str) -> Result<Option<ImageRecord>> {
            self.thumbnail_calls.fetch_add(1, AtomicOrdering::SeqCst);
            if self.failing.iter().any(|f| *f == category) {
                return Err(Error::Decode(format!("{category} exploded")));
            }
            if self.empty.iter().any(|e| *e == category) {
                return Ok(None);
            }
            Ok(Some(ImageRecord {
                id: format!("{category}-1"),
                name: category.to_string(),
                image_url: format!("https://cdn.example.com/{category}.jpg"),
                download_url: format!("https://cdn.example.com/{category}.jpg"),
                category: category.to_string(),
            }))
        }

        async fn images_in_category(&self, _category: &str) -> Result<Vec<ImageRecord>> {
            Ok(Vec::new())
        }

        async fn all_images(&self) -> Result<Vec<ImageRecord>> {
            Ok(Vec::new())
        }

        async fn fetch_bytes(&self, _url: &str) -> Result<Bytes> {
            Ok(Bytes::new())
        }
    }

    #[test]
    fn locale_cmp_ignores_case_first() {
        let mut names = vec!["nature", "Anime", "cars", "Abstract", "anime"];
        names.sort_by(|a, b| locale_cmp(a, b));
        assert_eq!(names, ["Abstract", "anime", "Anime", "cars", "nature"]);
    }

    #[test]
    fn locale_cmp_sorts_accents_with_their_base_letter() {
        let mut names = vec!["Fantasy", "Émotions", "Zen", "Abstract"];
        names.sort_by(|a, b| locale_cmp(a, b));
        assert_eq!(names, ["Abstract", "Émotions", "Fantasy", "Zen"]);

        let mut names = vec!["résumé", "Resume", "resume", "rester"];
        names.sort_by(|a, b| locale_cmp(a, b));
        assert_eq!(names, ["rester", "resume", "Resume", "résumé"]);
    }

    #[tokio::test]
    async fn failed_thumbnail_degrades_to_no_image() {
        let mut catalog = ScriptedCatalog::new(vec!["C", "A", "B"]);
        catalog.failing.push("B");
        let store = MemoryStore::new();

        let listing = CategoryBrowser::new(&catalog, &store, DAY)
            .load()
            .await
            .unwrap();

        assert_eq!(listing.categories, ["A", "B", "C"]);
        assert_eq!(listing.thumbnail("A"), Some("https://cdn.example.com/A.jpg"));
        assert_eq!(listing.thumbnail("B"), None);
        assert!(listing.thumbnails.contains_key("B"));
        assert_eq!(listing.thumbnail("C"), Some("https://cdn.example.com/C.jpg"));
        assert_eq!(listing.source, ListingSource::Network);
    }

    #[tokio::test]
    async fn empty_category_has_no_thumbnail() {
        let mut catalog = ScriptedCatalog::new(vec!["Empty", "Full"]);
        catalog.empty.push("Empty");
        let store = MemoryStore::new();

        let listing = CategoryBrowser::new(&catalog, &store, DAY)
            .load()
            .await
            .unwrap();
        assert_eq!(listing.thumbnail("Empty"), None);
        assert!(listing.thumbnail("Full").is_some());
    }

    #[tokio::test]
    async fn fresh_cache_avoids_network() {
        let catalog = ScriptedCatalog::new(vec!["Nature", "Anime"]);
        let store = MemoryStore::new();
        let browser = CategoryBrowser::new(&catalog, &store, DAY);

        let first = browser.load().await.unwrap();
        let second = browser.load().await.unwrap();

        assert_eq!(second.source, ListingSource::Cache);
        assert_eq!(second.categories, first.categories);
        assert_eq!(second.thumbnails, first.thumbnails);
        assert_eq!(catalog.list_calls.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(catalog.thumbnail_calls.load(AtomicOrdering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stale_cache_is_refetched() {
        let catalog = ScriptedCatalog::new(vec!["Nature"]);
        let store = MemoryStore::new();
        let browser = CategoryBrowser::new(&catalog, &store, DAY);
        browser.load().await.unwrap();

        let old = Utc::now() - chrono::Duration::days(2);
        store
            .set(keys::CATEGORIES_CACHED_AT, &old.to_rfc3339())
            .unwrap();

        let listing = browser.load().await.unwrap();
        assert_eq!(listing.source, ListingSource::Network);
        assert_eq!(catalog.list_calls.load(AtomicOrdering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cache_written_in_the_future_is_stale() {
        let catalog = ScriptedCatalog::new(vec!["Nature"]);
        let store = MemoryStore::new();
        let browser = CategoryBrowser::new(&catalog, &store, DAY);
        browser.load().await.unwrap();

        let now = Utc::now();
        let ahead = now + chrono::Duration::days(365);
        store
            .set(keys::CATEGORIES_CACHED_AT, &ahead.to_rfc3339())
            .unwrap();

        assert!(browser.cached(now + chrono::Duration::days(100)).is_none());
        assert!(browser.cached(now).is_none());
        let listing = browser.load().await.unwrap();
        assert_eq!(listing.source, ListingSource::Network);
        assert_eq!(catalog.list_calls.load(AtomicOrdering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cache_without_timestamp_is_a_miss() {
        let catalog = ScriptedCatalog::new(vec!["Nature"]);
        let store = MemoryStore::new();
        write_json(&store, keys::CATEGORIES, &["Old"]).unwrap();
        write_json(&store, keys::CATEGORY_IMAGES, &CategoryThumbnailMap::new()).unwrap();

        let listing = CategoryBrowser::new(&catalog, &store, DAY)
            .load()
            .await
            .unwrap();
        assert_eq!(listing.categories, ["Nature"]);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let catalog = ScriptedCatalog::new(vec!["Nature"]);
        let store = MemoryStore::new();
        let browser = CategoryBrowser::new(&catalog, &store, DAY);
        browser.load().await.unwrap();
        browser.invalidate().unwrap();

        assert!(browser.cached(Utc::now()).is_none());
        browser.load().await.unwrap();
        assert_eq!(catalog.list_calls.load(AtomicOrdering::SeqCst), 2);
    }
}
