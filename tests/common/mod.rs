//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which wires an [`AppContext`] over a seedable
//! [`MemoryStore`] and a fresh cache, and starts Axum on a random port for
//! HTTP-level testing. The memory store uses a deliberately small page size
//! so multi-page listings are exercised.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use albumgate::albums::AlbumCache;
use albumgate::server::{create_router, AppContext};
use albumgate::store::{MemoryStore, StoreClient};

pub struct TestHarness {
    pub ctx: AppContext,
    pub store: Arc<MemoryStore>,
}

impl TestHarness {
    /// Harness with the default five-minute cache TTL.
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(300))
    }

    /// Harness with a custom cache TTL, for expiry tests.
    pub fn with_ttl(ttl: Duration) -> Self {
        let store = Arc::new(MemoryStore::with_page_size(2));
        let cache = Arc::new(AlbumCache::new(64, ttl));
        let client: Arc<dyn StoreClient> = Arc::clone(&store) as Arc<dyn StoreClient>;
        let ctx = AppContext::new(client, cache);
        Self { ctx, store }
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        Self::start(Self::new()).await
    }

    pub async fn with_server_ttl(ttl: Duration) -> (Self, SocketAddr) {
        Self::start(Self::with_ttl(ttl)).await
    }

    async fn start(harness: Self) -> (Self, SocketAddr) {
        let app = create_router(harness.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (harness, addr)
    }
}
