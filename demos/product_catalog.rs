//! A product catalog front end built on swr-query sessions.
//!
//! A fake in-process catalog stands in for the REST API. The demo pages through
//! products with a signal-driven key, runs a debounced search, revalidates on
//! focus, and prints cache stats along the way.
//!
//! Run with `RUST_LOG=swr_query=debug cargo run --example product_catalog` to
//! watch fetches join, hit and revalidate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use swr_query::{
    FocusEvents, Hydration, KeySource, MetricsStore, MokaStore, MokaStoreConfig, Signal, Status,
    Store, SwrConfig, SwrContext, SwrHandle, TracingSink,
};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Product {
    id: u64,
    title: String,
    category: String,
    price: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ProductsResponse {
    products: Vec<Product>,
    total: usize,
    skip: usize,
    limit: usize,
}

/// Stand-in for the remote product API.
#[derive(Clone)]
struct CatalogService {
    products: Arc<BTreeMap<u64, Product>>,
    requests: Arc<AtomicUsize>,
    latency: Duration,
}

impl CatalogService {
    fn new(latency: Duration) -> Self {
        let titles = [
            ("iPhone 9", "smartphones", 549),
            ("iPhone X", "smartphones", 899),
            ("Samsung Universe 9", "smartphones", 1249),
            ("MacBook Pro", "laptops", 1749),
            ("Surface Laptop 4", "laptops", 1499),
            ("Perfume Oil", "fragrances", 13),
            ("Brown Perfume", "fragrances", 40),
        ];
        let products = titles
            .iter()
            .enumerate()
            .map(|(i, (title, category, price))| {
                let id = i as u64 + 1;
                let product = Product {
                    id,
                    title: title.to_string(),
                    category: category.to_string(),
                    price: *price,
                };
                (id, product)
            })
            .collect();

        CatalogService {
            products: Arc::new(products),
            requests: Arc::new(AtomicUsize::new(0)),
            latency,
        }
    }

    async fn list(&self, skip: usize, limit: usize) -> Result<ProductsResponse, String> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(self.latency).await;
        Ok(ProductsResponse {
            products: self.products.values().skip(skip).take(limit).cloned().collect(),
            total: self.products.len(),
            skip,
            limit,
        })
    }

    async fn get(&self, id: u64) -> Result<Product, String> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(self.latency).await;
        self.products
            .get(&id)
            .cloned()
            .ok_or_else(|| format!("Product with id '{}' not found", id))
    }

    async fn search(&self, q: &str) -> Result<ProductsResponse, String> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(self.latency).await;
        let q = q.to_lowercase();
        let products: Vec<Product> = self
            .products
            .values()
            .filter(|p| p.title.to_lowercase().contains(&q))
            .cloned()
            .collect();
        Ok(ProductsResponse {
            total: products.len(),
            limit: products.len(),
            skip: 0,
            products,
        })
    }
}

/// Call-site helpers, one session per query.
struct Products {
    ctx: SwrContext,
    service: CatalogService,
}

impl Products {
    async fn list(&self, page: &Signal<usize>, limit: usize) -> SwrHandle<ProductsResponse> {
        let key = {
            let current = page.clone();
            KeySource::computed(
                move || format!("products-page-{}-{}", current.get(), limit),
                [page.watch()],
            )
        };
        let service = self.service.clone();
        let page = page.clone();
        self.ctx
            .run(
                key,
                move || {
                    let service = service.clone();
                    let skip = page.get() * limit;
                    async move { service.list(skip, limit).await }
                },
                self.ctx.options().revalidate_on_focus(true),
            )
            .await
            .expect("demo runs inside tokio")
    }

    async fn get(&self, id: u64) -> SwrHandle<Product> {
        let service = self.service.clone();
        self.ctx
            .run(
                format!("product-{}", id),
                move || {
                    let service = service.clone();
                    async move { service.get(id).await }
                },
                self.ctx.options(),
            )
            .await
            .expect("demo runs inside tokio")
    }

    async fn search(&self, query: &Signal<String>) -> SwrHandle<ProductsResponse> {
        let key = {
            let q = query.clone();
            KeySource::computed(move || format!("products-search-{}", q.get()), [query.watch()])
        };
        let service = self.service.clone();
        let query = query.clone();
        self.ctx
            .run(
                key,
                move || {
                    let service = service.clone();
                    let q = query.get();
                    async move { service.search(&q).await }
                },
                self.ctx.options(),
            )
            .await
            .expect("demo runs inside tokio")
    }
}

fn titles(response: &Option<ProductsResponse>) -> Vec<&str> {
    response
        .iter()
        .flat_map(|r| r.products.iter().map(|p| p.title.as_str()))
        .collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config: SwrConfig = serde_json::from_str(r#"{ "stale_time": "500ms" }"#)?;
    let moka: Arc<dyn Store> = Arc::new(MokaStore::new(MokaStoreConfig::default()));
    let store = Arc::new(MetricsStore::new(
        moka,
        Arc::new(TracingSink),
        swr_query::freshness::window_ms(config.stale_time),
    ));

    let hydration = Hydration::pending();
    let focus = FocusEvents::new();
    let ctx = SwrContext::builder()
        .store(store)
        .hydration(hydration.clone())
        .focus(focus.clone())
        .config(config)
        .build()?;

    let service = CatalogService::new(Duration::from_millis(80));
    let products = Products {
        ctx: ctx.clone(),
        service: service.clone(),
    };

    // Two widgets showing the same product share one request.
    let header = products.get(1).await;
    let sidebar = products.get(1).await;
    let (header, _) = tokio::join!(
        header.wait_for(|s| s.status == Status::Success),
        sidebar.wait_for(|s| s.status == Status::Success),
    );
    println!("product-1: {:?} ({} request)", header.data.map(|p| p.title), service.requests.load(Ordering::Relaxed));

    // Paging re-resolves the key.
    let page = Signal::new(0_usize);
    let list = products.list(&page, 3).await;
    let first = list.wait_for(|s| s.status == Status::Success).await;
    println!("page 0: {:?}", titles(&first.data));

    page.set(1);
    let second = list
        .wait_for(|s| s.key == "products-page-1-3" && s.status == Status::Success)
        .await;
    println!("page 1: {:?}", titles(&second.data));

    hydration.complete();

    // Typing into the search box only queries the final term.
    let query = Signal::new("phone".to_string());
    let results = products.search(&query).await;
    results.wait_for(|s| s.status == Status::Success).await;
    let mut search_box = query.debounced(Duration::from_millis(300));
    for partial in ["l", "la", "lap", "laptop"] {
        search_box.set(partial.to_string());
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let found = results
        .wait_for(|s| s.key == "products-search-laptop" && s.status == Status::Success)
        .await;
    println!("search 'laptop': {:?}", titles(&found.data));

    // Coming back to the tab after the data went stale refreshes it quietly.
    tokio::time::sleep(Duration::from_millis(600)).await;
    let before = service.requests.load(Ordering::Relaxed);
    focus.notify();
    list.wait_for(|s| service.requests.load(Ordering::Relaxed) > before && !s.pending)
        .await;
    println!("focus revalidation: pending stayed {}", list.pending());

    // A missing product reports its error without throwing.
    let missing = products.get(42).await;
    let failed = missing.wait_for(|s| s.status == Status::Error).await;
    println!("product-42: {}", failed.error.map(|e| e.to_string()).unwrap_or_default());

    let stats = ctx.admin().stats(None).await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);

    let removed = ctx.admin().invalidate_all(None).await?;
    println!("invalidated {} entries, {} requests total", removed, service.requests.load(Ordering::Relaxed));

    Ok(())
}
