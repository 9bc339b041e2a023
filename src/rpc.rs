use anyhow::{Context, Result, bail};
use reqwest::Client;
use serde::Serialize;

pub fn http_client() -> Client {
  Client::new()
}

/// POST a JSON body and treat any non-2xx status as an error. Callers decide
/// whether a failure is fatal; most of them just log it and move on.
pub async fn post_json<T: Serialize + ?Sized>(client: &Client, url: &str, body: &T) -> Result<()> {
  let response = client
    .post(url)
    .json(body)
    .send()
    .await
    .with_context(|| format!("request to {} failed", url))?;
  if !response.status().is_success() {
    bail!("{} returned {}", url, response.status());
  }
  Ok(())
}
