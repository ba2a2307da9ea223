use anyhow::{Context, Result};
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::info;

/// Build the shared HTTP client used for every upstream call.
pub fn build_client(user_agent: &str, timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(user_agent)
        .build()
        .context("failed to build reqwest client")
}

/// GET a URL with bounded retries and linear backoff between attempts.
///
/// The response is returned whatever its status; callers decide what a
/// non-200 means for their source. Only transport-level failures (timeouts,
/// connection errors) are retried, and after the retry budget the last error
/// is returned.
pub async fn http_get(
    client: &Client,
    url: &str,
    max_retries: u32,
    backoff_ms: u64,
) -> Result<Response> {
    let mut last_error = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let backoff = Duration::from_millis(backoff_ms * u64::from(attempt));
            info!(
                "retrying GET {} (attempt {}/{}) after {:?}",
                url,
                attempt + 1,
                max_retries + 1,
                backoff
            );
            tokio::time::sleep(backoff).await;
        }

        match client.get(url).send().await {
            Ok(response) => return Ok(response),
            Err(e) => {
                last_error = Some(anyhow::Error::new(e).context(format!("GET {} failed", url)));
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("unknown error after retries")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_response_for_any_status() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/gone")
            .with_status(404)
            .with_body("missing")
            .create_async()
            .await;

        let client = build_client("prefnews-test", 5).expect("client");
        let resp = http_get(&client, &format!("{}/gone", server.url()), 2, 1)
            .await
            .expect("non-200 is not a transport failure");
        assert_eq!(resp.status().as_u16(), 404);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn errors_after_retry_budget_when_unreachable() {
        // Nothing listens on the discard port; connections are refused
        // immediately, so three attempts complete quickly.
        let client = build_client("prefnews-test", 1).expect("client");
        let result = http_get(&client, "http://127.0.0.1:9/feed", 2, 1).await;
        assert!(result.is_err());
    }
}
