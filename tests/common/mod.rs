//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which builds a full [`AppContext`] around a fake
//! transcoder and starts Axum on a random port for HTTP-level testing.

use std::net::SocketAddr;
use std::sync::Arc;

use af_av::Transcoder;
use af_core::config::Config;
use af_server::context::AppContext;
use af_server::router::build_router;

/// Test harness wrapping a fully-constructed [`AppContext`] backed by an
/// in-memory transcoder.
pub struct TestHarness {
    pub ctx: AppContext,
    pub addr: SocketAddr,
    pub client: reqwest::Client,
}

impl TestHarness {
    /// Start an Axum server with the given transcoder and default config on
    /// a random port.
    pub async fn with_server(transcoder: Arc<dyn Transcoder>) -> Self {
        Self::with_server_config(transcoder, Config::default()).await
    }

    /// Start an Axum server with a custom configuration on a random port.
    pub async fn with_server_config(transcoder: Arc<dyn Transcoder>, config: Config) -> Self {
        let ctx = AppContext::new(config, transcoder);
        let app = build_router(ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            ctx,
            addr,
            client: reqwest::Client::new(),
        }
    }

    /// Absolute URL for `path` on the test server.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}
