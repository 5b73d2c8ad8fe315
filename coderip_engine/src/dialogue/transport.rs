//! Chat-completions transport and the retry loop around it.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::ChatRequest;
use crate::config::AgentConfig;
use crate::error::TransportError;

/// One attempt at a completion call.
#[async_trait(?Send)]
pub trait ChatTransport {
    async fn complete(&self, request: &ChatRequest) -> Result<String, TransportError>;
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: String,
}

/// Posts OpenAI-style chat requests with a bearer token.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    api_key: String,
    timeout_secs: u64,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            api_key: api_key.into(),
            timeout_secs,
        }
    }

    /// Build from configuration; `None` when no key is set.
    pub fn from_config(config: &AgentConfig) -> Option<Self> {
        let key = config.api_key()?;
        Some(Self::new(
            config.api_url.clone(),
            key,
            config.request_timeout_secs,
        ))
    }
}

#[async_trait(?Send)]
impl ChatTransport for HttpTransport {
    async fn complete(&self, request: &ChatRequest) -> Result<String, TransportError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(request)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    TransportError::Timeout(self.timeout_secs)
                } else {
                    TransportError::Connection(err.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|err| TransportError::Decode(err.to_string()))?;
        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| TransportError::Decode("response carried no choices".into()))
    }
}

/// Attempt limits for [`send_with_retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub timeout: Duration,
}

impl From<&AgentConfig> for RetryPolicy {
    fn from(config: &AgentConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: Duration::from_millis(config.retry_delay_ms),
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

/// Call `transport` until it answers, a permanent error comes back, or the
/// attempts run out. Each attempt is bounded by the policy timeout.
pub async fn send_with_retry<T>(
    transport: &T,
    request: &ChatRequest,
    policy: RetryPolicy,
) -> Result<String, TransportError>
where
    T: ChatTransport + ?Sized,
{
    let mut attempt = 1;
    loop {
        let result = match tokio::time::timeout(policy.timeout, transport.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(policy.timeout.as_secs())),
        };
        match result {
            Ok(reply) => return Ok(reply),
            Err(error) if error.is_transient() && attempt < policy.max_attempts => {
                log::warn!(
                    "attempt {attempt}/{} failed: {error}; retrying",
                    policy.max_attempts
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    struct Scripted(RefCell<VecDeque<Result<String, TransportError>>>);

    #[async_trait(?Send)]
    impl ChatTransport for Scripted {
        async fn complete(&self, _: &ChatRequest) -> Result<String, TransportError> {
            self.0
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Connection("exhausted".into())))
        }
    }

    fn request() -> ChatRequest {
        ChatRequest {
            model: "m".into(),
            messages: Vec::new(),
            temperature: 0.7,
            max_tokens: 10,
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(1000),
            timeout: Duration::from_secs(30),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let transport = Scripted(RefCell::new(VecDeque::from([
            Err(TransportError::Timeout(30)),
            Err(TransportError::Connection("reset".into())),
            Ok("done".into()),
        ])));
        assert_eq!(
            send_with_retry(&transport, &request(), policy()).await,
            Ok("done".into())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_stops_immediately() {
        let transport = Scripted(RefCell::new(VecDeque::from([
            Err(TransportError::Status(401)),
            Ok("never".into()),
        ])));
        assert_eq!(
            send_with_retry(&transport, &request(), policy()).await,
            Err(TransportError::Status(401))
        );
        assert_eq!(transport.0.borrow().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let transport = Scripted(RefCell::new(VecDeque::from([
            Err(TransportError::Connection("reset".into())),
            Err(TransportError::Connection("reset".into())),
            Err(TransportError::Connection("refused".into())),
            Ok("too late".into()),
        ])));
        assert_eq!(
            send_with_retry(&transport, &request(), policy()).await,
            Err(TransportError::Connection("refused".into()))
        );
        assert_eq!(transport.0.borrow().len(), 1);
    }
}
