use async_trait::async_trait;
use reqwest::{Request, Response};

/// Seam between the fetcher and the network, so requests can be decorated
/// (see [`crate::fetch::auth`]) or answered by a fake in tests.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
