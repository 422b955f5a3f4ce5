//! Cached entry resolution.
//!
//! Resolution of one locator happens at most once per process: the first
//! caller installs a shared in-flight future and every later caller (and
//! every later activation of the same application) awaits the same outcome,
//! failures included. External script and style bodies get the same
//! treatment in per-address caches, which is what makes prefetching free.

use dashmap::DashMap;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared, try_join_all};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use atrium_core::EntrySource;

use crate::error::EntryResult;
use crate::fetch::Fetcher;
use crate::template::{ScriptRef, process_markup, public_path, resolve_ref, style_placeholder};

/// A fully resolved application entry.
#[derive(Debug, Clone)]
pub struct ResolvedEntry {
    /// The wrapper template with external stylesheets embedded back in place.
    pub template: String,
    /// Base address the application's relative assets resolve against.
    pub asset_public_path: String,
    /// Script references in execution order.
    pub scripts: Vec<ScriptRef>,
    /// External stylesheet addresses, already embedded in `template`.
    pub styles: Vec<String>,
    /// The entry script's reference identity.
    pub entry: Option<String>,
}

type SharedOutcome<T> = Shared<BoxFuture<'static, EntryResult<T>>>;

/// Resolves entries through a [`Fetcher`], caching every outcome.
pub struct EntryResolver {
    fetcher: Arc<dyn Fetcher>,
    entries: DashMap<String, SharedOutcome<Arc<ResolvedEntry>>>,
    assets: DashMap<String, SharedOutcome<Arc<String>>>,
}

impl EntryResolver {
    /// Resolver over `fetcher`.
    #[must_use]
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Arc<Self> {
        Arc::new(Self {
            fetcher,
            entries: DashMap::new(),
            assets: DashMap::new(),
        })
    }

    /// Resolve `source`, reusing any earlier outcome for the same locator.
    ///
    /// # Errors
    ///
    /// Returns the (possibly cached) [`EntryError`] when the markup cannot be
    /// fetched or processed, or when any referenced stylesheet fails to
    /// fetch. No partial entry is ever produced.
    pub async fn resolve(self: &Arc<Self>, source: &EntrySource) -> EntryResult<Arc<ResolvedEntry>> {
        let key = source.cache_key();
        let fut = {
            let entry = self.entries.entry(key).or_insert_with(|| {
                let this = Arc::clone(self);
                let source = source.clone();
                async move { this.resolve_uncached(&source).await }
                    .boxed()
                    .shared()
            });
            entry.clone()
        };
        fut.await
    }

    /// Fetch an external script body, reusing any earlier fetch of the same
    /// address.
    pub async fn external_script(self: &Arc<Self>, url: &str) -> EntryResult<Arc<String>> {
        self.asset(url).await
    }

    /// Fetch an external stylesheet body, reusing any earlier fetch of the
    /// same address.
    pub async fn external_style(self: &Arc<Self>, url: &str) -> EntryResult<Arc<String>> {
        self.asset(url).await
    }

    /// Warm every cache an entry depends on without executing anything:
    /// the markup, its stylesheets, and its external scripts.
    pub async fn warm(self: &Arc<Self>, source: &EntrySource) -> EntryResult<()> {
        let resolved = self.resolve(source).await?;
        let scripts = resolved
            .scripts
            .iter()
            .filter(|s| !s.is_inline())
            .map(|s| self.external_script(s.id()));
        try_join_all(scripts).await?;
        Ok(())
    }

    async fn asset(self: &Arc<Self>, url: &str) -> EntryResult<Arc<String>> {
        let fut = {
            let entry = self.assets.entry(url.to_string()).or_insert_with(|| {
                let this = Arc::clone(self);
                let url = url.to_string();
                async move {
                    let body = this.fetcher.fetch(&url).await?;
                    Ok(Arc::new(body))
                }
                .boxed()
                .shared()
            });
            entry.clone()
        };
        fut.await
    }

    async fn resolve_uncached(self: &Arc<Self>, source: &EntrySource) -> EntryResult<Arc<ResolvedEntry>> {
        match source {
            EntrySource::Remote(locator) => {
                debug!(locator, "resolving remote entry");
                let base = public_path(locator)?;
                let markup = self.fetcher.fetch(locator).await?;
                let assets = process_markup(&markup, Some(&base), locator)?;
                let template = self.embed_styles(assets.template, &assets.styles).await?;
                info!(
                    locator,
                    scripts = assets.scripts.len(),
                    styles = assets.styles.len(),
                    "entry resolved"
                );
                Ok(Arc::new(ResolvedEntry {
                    template,
                    asset_public_path: base.to_string(),
                    scripts: assets.scripts,
                    styles: assets.styles,
                    entry: assets.entry,
                }))
            }
            EntrySource::Manifest {
                scripts,
                styles,
                markup,
            } => {
                debug!("resolving manifest entry");
                let mut template = markup.clone();
                for url in styles {
                    let body = self.external_style(url).await?;
                    template.push_str(&embedded_style(url, &body));
                }
                let scripts: Vec<ScriptRef> = scripts
                    .iter()
                    .map(|s| ScriptRef::External {
                        url: resolve_ref(None, s),
                    })
                    .collect();
                let entry = scripts.last().map(|s| s.id().to_string());
                Ok(Arc::new(ResolvedEntry {
                    template,
                    asset_public_path: String::new(),
                    scripts,
                    styles: styles.clone(),
                    entry,
                }))
            }
        }
    }

    /// Replace each stylesheet placeholder with the fetched sheet, inline.
    async fn embed_styles(self: &Arc<Self>, template: String, styles: &[String]) -> EntryResult<String> {
        let bodies = try_join_all(styles.iter().map(|url| self.external_style(url))).await?;
        let mut template = template;
        for (url, body) in styles.iter().zip(bodies) {
            template = template.replace(&style_placeholder(url), &embedded_style(url, &body));
        }
        Ok(template)
    }
}

impl std::fmt::Debug for EntryResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryResolver")
            .field("entries", &self.entries.len())
            .field("assets", &self.assets.len())
            .finish_non_exhaustive()
    }
}

fn embedded_style(url: &str, body: &str) -> String {
    format!("<style data-source=\"{url}\">{body}</style>")
}

/// The base address for assets of `locator`, as a plain string.
pub fn asset_public_path(locator: &str) -> EntryResult<String> {
    public_path(locator).map(|u: Url| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EntryError, FetchError};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFetcher {
        bodies: Mutex<HashMap<String, String>>,
        calls: AtomicUsize,
    }

    impl CountingFetcher {
        fn new(bodies: &[(&str, &str)]) -> Arc<Self> {
            Arc::new(Self {
                bodies: Mutex::new(
                    bodies
                        .iter()
                        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                        .collect(),
                ),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetcher for CountingFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let bodies = self.bodies.lock().unwrap();
            bodies.get(url).cloned().ok_or(FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    const ENTRY_URL: &str = "https://cdn.example.com/shop/index.html";

    fn shop_markup() -> &'static str {
        r#"<html><head>
            <link rel="stylesheet" href="theme.css">
        </head><body>
            <div id="root"></div>
            <script src="main.js"></script>
        </body></html>"#
    }

    #[tokio::test]
    async fn test_remote_entry_resolution_embeds_styles() {
        let fetcher = CountingFetcher::new(&[
            (ENTRY_URL, shop_markup()),
            ("https://cdn.example.com/shop/theme.css", ".root { margin: 0; }"),
        ]);
        let resolver = EntryResolver::new(fetcher);
        let resolved = resolver
            .resolve(&EntrySource::Remote(ENTRY_URL.to_string()))
            .await
            .unwrap();

        assert_eq!(resolved.asset_public_path, "https://cdn.example.com/shop/");
        assert_eq!(
            resolved.entry.as_deref(),
            Some("https://cdn.example.com/shop/main.js")
        );
        assert!(resolved.template.contains(".root { margin: 0; }"));
        assert!(!resolved.template.contains("<link"));
        assert!(!resolved.template.contains("<script src"));
    }

    #[tokio::test]
    async fn test_resolution_happens_at_most_once_per_locator() {
        let fetcher = CountingFetcher::new(&[(ENTRY_URL, "<script src=\"main.js\"></script>")]);
        let resolver = EntryResolver::new(Arc::clone(&fetcher) as Arc<dyn Fetcher>);
        let source = EntrySource::Remote(ENTRY_URL.to_string());

        let (a, b) = tokio::join!(resolver.resolve(&source), resolver.resolve(&source));
        resolver.resolve(&source).await.unwrap();
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_cached_too() {
        let fetcher = CountingFetcher::new(&[]);
        let resolver = EntryResolver::new(Arc::clone(&fetcher) as Arc<dyn Fetcher>);
        let source = EntrySource::Remote(ENTRY_URL.to_string());

        assert!(resolver.resolve(&source).await.is_err());
        let err = resolver.resolve(&source).await.unwrap_err();
        assert!(matches!(
            err,
            EntryError::Fetch(FetchError::Status { status: 404, .. })
        ));
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_manifest_entry_skips_markup_fetch() {
        let fetcher = CountingFetcher::new(&[(
            "https://cdn.example.com/shop/theme.css",
            ".x {}",
        )]);
        let resolver = EntryResolver::new(Arc::clone(&fetcher) as Arc<dyn Fetcher>);
        let source = EntrySource::Manifest {
            scripts: vec![
                "https://cdn.example.com/shop/vendor.js".to_string(),
                "https://cdn.example.com/shop/main.js".to_string(),
            ],
            styles: vec!["https://cdn.example.com/shop/theme.css".to_string()],
            markup: "<div id=\"root\"></div>".to_string(),
        };

        let resolved = resolver.resolve(&source).await.unwrap();
        assert_eq!(
            resolved.entry.as_deref(),
            Some("https://cdn.example.com/shop/main.js")
        );
        assert!(resolved.template.contains(".x {}"));
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_warm_fetches_scripts_through_the_asset_cache() {
        let fetcher = CountingFetcher::new(&[
            (ENTRY_URL, "<script src=\"main.js\"></script>"),
            ("https://cdn.example.com/shop/main.js", "boot();"),
        ]);
        let resolver = EntryResolver::new(Arc::clone(&fetcher) as Arc<dyn Fetcher>);
        let source = EntrySource::Remote(ENTRY_URL.to_string());

        resolver.warm(&source).await.unwrap();
        // markup + script
        assert_eq!(fetcher.calls(), 2);

        let body = resolver
            .external_script("https://cdn.example.com/shop/main.js")
            .await
            .unwrap();
        assert_eq!(body.as_str(), "boot();");
        assert_eq!(fetcher.calls(), 2);
    }
}
