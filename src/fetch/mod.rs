mod client;
mod basic;
pub mod auth;
pub mod scorecard;

pub use client::HttpClient;
pub use basic::BasicClient;

use anyhow::Result;

/// Issues a GET for `url` and returns the body. Non-2xx statuses are errors.
pub async fn fetch_bytes<C: HttpClient>(
    client: &C,
    url: reqwest::Url,
) -> Result<Vec<u8>> {
    let req = reqwest::Request::new(reqwest::Method::GET, url);

    let resp = client.execute(req).await?.error_for_status()?;
    Ok(resp.bytes().await?.to_vec())
}
