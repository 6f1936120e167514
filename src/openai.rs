//! OpenAI client configuration.

use crate::error::{Result, VidlensError};
use async_openai::{config::OpenAIConfig, Client};
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::time::Duration;

/// Create an OpenAI client whose requests are bounded by `timeout`.
///
/// The client makes a single attempt per request; retries belong to
/// [`crate::analysis::RetryPolicy`].
pub fn create_client_with_timeout(timeout: Duration) -> Result<Client<OpenAIConfig>> {
    let http_client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| VidlensError::Config(format!("Failed to create HTTP client: {}", e)))?;

    Ok(Client::with_config(OpenAIConfig::default())
        .with_http_client(http_client)
        .with_backoff(single_attempt()))
}

/// A backoff that gives up on the first transient failure.
fn single_attempt() -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_max_elapsed_time(Some(Duration::ZERO))
        .build()
}

/// Check if the OpenAI API key is configured.
pub fn is_api_key_configured() -> bool {
    std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use backoff::backoff::Backoff;

    #[test]
    fn test_client_does_not_retry_on_its_own() {
        let mut backoff = single_attempt();
        assert!(backoff.next_backoff().is_none());
        assert!(create_client_with_timeout(Duration::from_secs(5)).is_ok());
    }
}
