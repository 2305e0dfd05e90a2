use crate::rpc::options::DEFAULT_HTTP_BODY_LIMIT_BYTES;
use crate::rpc::payload::decode_fixed_hex;
use crate::rpc::retry::{RetryPolicy, DEFAULT_RETRY_DELAY, DEFAULT_RETRY_MAX_ATTEMPTS};
use crate::runtime::telemetry;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_STATE_PATH: &str = "data/checkpoint.json";
const DEFAULT_RPC_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CONFIRM_MAX_ATTEMPTS: usize = 30;
const DEFAULT_BLOCK_PACING_MS: u64 = 1_000;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 12;

const ADDRESS_BYTES: usize = 20;
const TOPIC_BYTES: usize = 32;
const SELECTOR_BYTES: usize = 4;

/// Runtime configuration for the relay pipeline.
///
/// All instances must be constructed via [`RelayConfig::builder`],
/// [`RelayConfig::new`], or [`RelayConfig::from_env`] so invariants are
/// validated before any consumer observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    rpc_url: String,
    contract_address: String,
    from_address: String,
    ping_topic: String,
    pong_selector: String,
    state_path: PathBuf,
    rpc_timeout: Duration,
    retry_policy: RetryPolicy,
    confirmation_policy: RetryPolicy,
    block_pacing: Duration,
    poll_interval: Duration,
    metrics_interval: Duration,
    max_request_body_bytes: usize,
    max_response_body_bytes: usize,
}

pub struct RelayConfigParams {
    pub rpc_url: String,
    pub contract_address: String,
    pub from_address: String,
    pub ping_topic: String,
    pub pong_selector: String,
    pub state_path: PathBuf,
    pub rpc_timeout: Duration,
    pub retry_policy: RetryPolicy,
    pub confirmation_policy: RetryPolicy,
    pub block_pacing: Duration,
    pub poll_interval: Duration,
    pub metrics_interval: Duration,
    pub max_request_body_bytes: usize,
    pub max_response_body_bytes: usize,
}

impl RelayConfig {
    /// Returns a builder to incrementally construct and validate a
    /// configuration.
    pub fn builder() -> RelayConfigBuilder {
        RelayConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    ///
    /// Prefer [`RelayConfig::builder`] when many values use defaults.
    pub fn new(params: RelayConfigParams) -> Result<Self> {
        let RelayConfigParams {
            rpc_url,
            contract_address,
            from_address,
            ping_topic,
            pong_selector,
            state_path,
            rpc_timeout,
            retry_policy,
            confirmation_policy,
            block_pacing,
            poll_interval,
            metrics_interval,
            max_request_body_bytes,
            max_response_body_bytes,
        } = params;

        let config = Self {
            rpc_url: trimmed_string(rpc_url),
            contract_address: trimmed_string(contract_address),
            from_address: trimmed_string(from_address),
            ping_topic: trimmed_string(ping_topic),
            pong_selector: trimmed_string(pong_selector),
            state_path,
            rpc_timeout,
            retry_policy,
            confirmation_policy,
            block_pacing,
            poll_interval,
            metrics_interval,
            max_request_body_bytes,
            max_response_body_bytes,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reads configuration from `PONGRELAY_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut builder = Self::builder()
            .rpc_url(require_env("PONGRELAY_RPC_URL")?)
            .contract_address(require_env("PONGRELAY_CONTRACT_ADDRESS")?)
            .from_address(require_env("PONGRELAY_FROM_ADDRESS")?)
            .ping_topic(require_env("PONGRELAY_PING_TOPIC")?)
            .pong_selector(require_env("PONGRELAY_PONG_SELECTOR")?);

        if let Some(path) = optional_env("PONGRELAY_STATE_PATH") {
            builder = builder.state_path(path);
        }
        if let Some(secs) = parse_env_u64("PONGRELAY_RPC_TIMEOUT_SECS")? {
            builder = builder.rpc_timeout(Duration::from_secs(secs));
        }
        if let Some(attempts) = parse_env_u64("PONGRELAY_RETRY_MAX_ATTEMPTS")? {
            builder = builder.retry_max_attempts(attempts as usize);
        }
        if let Some(millis) = parse_env_u64("PONGRELAY_RETRY_DELAY_MS")? {
            builder = builder.retry_delay(Duration::from_millis(millis));
        }
        if let Some(attempts) = parse_env_u64("PONGRELAY_CONFIRM_MAX_ATTEMPTS")? {
            builder = builder.confirm_max_attempts(attempts as usize);
        }
        if let Some(millis) = parse_env_u64("PONGRELAY_CONFIRM_DELAY_MS")? {
            builder = builder.confirm_delay(Duration::from_millis(millis));
        }
        if let Some(millis) = parse_env_u64("PONGRELAY_BLOCK_PACING_MS")? {
            builder = builder.block_pacing(Duration::from_millis(millis));
        }
        if let Some(secs) = parse_env_u64("PONGRELAY_POLL_INTERVAL_SECS")? {
            builder = builder.poll_interval(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_env_u64("PONGRELAY_METRICS_INTERVAL_SECS")? {
            builder = builder.metrics_interval(Duration::from_secs(secs));
        }

        builder.build()
    }

    /// Full RPC URL (including scheme) of the chain endpoint.
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Contract emitting notifications and accepting responses.
    pub fn contract_address(&self) -> &str {
        &self.contract_address
    }

    /// Account responses are sent from.
    pub fn from_address(&self) -> &str {
        &self.from_address
    }

    /// topic0 of the notification event.
    pub fn ping_topic(&self) -> &str {
        &self.ping_topic
    }

    /// 4-byte selector of the response function.
    pub fn pong_selector(&self) -> &str {
        &self.pong_selector
    }

    /// Location of the durable checkpoint snapshot.
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Per-request timeout applied to the JSON-RPC client.
    pub fn rpc_timeout(&self) -> Duration {
        self.rpc_timeout
    }

    /// Policy for height queries, event scans, and submission.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
    }

    /// Policy for the confirmation wait.
    pub fn confirmation_policy(&self) -> RetryPolicy {
        self.confirmation_policy
    }

    /// Fixed delay between consecutive block scans.
    pub fn block_pacing(&self) -> Duration {
        self.block_pacing
    }

    /// Interval between chain-height polls feeding the queue.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Interval used by the telemetry reporter.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    /// Maximum allowed HTTP request body bytes for RPC calls.
    pub fn max_request_body_bytes(&self) -> usize {
        self.max_request_body_bytes
    }

    /// Maximum allowed HTTP response body bytes for RPC calls.
    pub fn max_response_body_bytes(&self) -> usize {
        self.max_response_body_bytes
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        validate_url(&self.rpc_url)?;
        decode_fixed_hex(&self.contract_address, ADDRESS_BYTES)
            .context("contract_address must be a 20-byte hex address")?;
        decode_fixed_hex(&self.from_address, ADDRESS_BYTES)
            .context("from_address must be a 20-byte hex address")?;
        decode_fixed_hex(&self.ping_topic, TOPIC_BYTES)
            .context("ping_topic must be a 32-byte hex topic")?;
        decode_fixed_hex(&self.pong_selector, SELECTOR_BYTES)
            .context("pong_selector must be a 4-byte hex selector")?;

        if self.state_path.as_os_str().is_empty() {
            bail!("state_path cannot be empty");
        }

        if self.rpc_timeout.is_zero() {
            bail!("rpc_timeout must be greater than 0");
        }

        if self.retry_policy.max_attempts == 0 {
            bail!("retry max_attempts must be greater than 0");
        }

        if self.retry_policy.delay.is_zero() {
            bail!("retry delay must be greater than 0");
        }

        if self.confirmation_policy.max_attempts == 0 {
            bail!("confirmation max_attempts must be greater than 0");
        }

        if self.confirmation_policy.delay.is_zero() {
            bail!("confirmation delay must be greater than 0");
        }

        if self.block_pacing.is_zero() {
            bail!("block_pacing must be greater than 0");
        }

        if self.poll_interval.is_zero() {
            bail!("poll_interval must be greater than 0");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        if self.max_request_body_bytes == 0 {
            bail!("max_request_body_bytes must be greater than 0");
        }

        if self.max_response_body_bytes == 0 {
            bail!("max_response_body_bytes must be greater than 0");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct RelayConfigBuilder {
    rpc_url: Option<String>,
    contract_address: Option<String>,
    from_address: Option<String>,
    ping_topic: Option<String>,
    pong_selector: Option<String>,
    state_path: Option<PathBuf>,
    rpc_timeout: Option<Duration>,
    retry_max_attempts: Option<usize>,
    retry_delay: Option<Duration>,
    confirm_max_attempts: Option<usize>,
    confirm_delay: Option<Duration>,
    block_pacing: Option<Duration>,
    poll_interval: Option<Duration>,
    metrics_interval: Option<Duration>,
    max_request_body_bytes: Option<usize>,
    max_response_body_bytes: Option<usize>,
}

impl RelayConfigBuilder {
    pub fn rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = Some(url.into());
        self
    }

    pub fn contract_address(mut self, address: impl Into<String>) -> Self {
        self.contract_address = Some(address.into());
        self
    }

    pub fn from_address(mut self, address: impl Into<String>) -> Self {
        self.from_address = Some(address.into());
        self
    }

    pub fn ping_topic(mut self, topic: impl Into<String>) -> Self {
        self.ping_topic = Some(topic.into());
        self
    }

    pub fn pong_selector(mut self, selector: impl Into<String>) -> Self {
        self.pong_selector = Some(selector.into());
        self
    }

    pub fn state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = Some(path.into());
        self
    }

    pub fn rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = Some(timeout);
        self
    }

    pub fn retry_max_attempts(mut self, attempts: usize) -> Self {
        self.retry_max_attempts = Some(attempts);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    pub fn confirm_max_attempts(mut self, attempts: usize) -> Self {
        self.confirm_max_attempts = Some(attempts);
        self
    }

    pub fn confirm_delay(mut self, delay: Duration) -> Self {
        self.confirm_delay = Some(delay);
        self
    }

    pub fn block_pacing(mut self, pacing: Duration) -> Self {
        self.block_pacing = Some(pacing);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn max_request_body_bytes(mut self, bytes: usize) -> Self {
        self.max_request_body_bytes = Some(bytes);
        self
    }

    pub fn max_response_body_bytes(mut self, bytes: usize) -> Self {
        self.max_response_body_bytes = Some(bytes);
        self
    }

    pub fn build(self) -> Result<RelayConfig> {
        let params = RelayConfigParams {
            rpc_url: self.rpc_url.context("rpc_url is required")?,
            contract_address: self
                .contract_address
                .context("contract_address is required")?,
            from_address: self.from_address.context("from_address is required")?,
            ping_topic: self.ping_topic.context("ping_topic is required")?,
            pong_selector: self.pong_selector.context("pong_selector is required")?,
            state_path: self
                .state_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_PATH)),
            rpc_timeout: self
                .rpc_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_RPC_TIMEOUT_SECS)),
            retry_policy: RetryPolicy::new(
                self.retry_max_attempts.unwrap_or(DEFAULT_RETRY_MAX_ATTEMPTS),
                self.retry_delay.unwrap_or(DEFAULT_RETRY_DELAY),
            ),
            confirmation_policy: RetryPolicy::new(
                self.confirm_max_attempts
                    .unwrap_or(DEFAULT_CONFIRM_MAX_ATTEMPTS),
                self.confirm_delay.unwrap_or(DEFAULT_RETRY_DELAY),
            ),
            block_pacing: self
                .block_pacing
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_BLOCK_PACING_MS)),
            poll_interval: self
                .poll_interval
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS)),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
            max_request_body_bytes: self
                .max_request_body_bytes
                .unwrap_or(DEFAULT_HTTP_BODY_LIMIT_BYTES),
            max_response_body_bytes: self
                .max_response_body_bytes
                .unwrap_or(DEFAULT_HTTP_BODY_LIMIT_BYTES),
        };

        RelayConfig::new(params)
    }
}

fn trimmed_string(value: String) -> String {
    value.trim().to_owned()
}

fn validate_url(url: &str) -> Result<()> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("rpc_url must start with http:// or https://");
    }
    Ok(())
}

fn require_env(name: &'static str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{name} must be set"))
}

fn optional_env(name: &'static str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn parse_env_u64(name: &'static str) -> Result<Option<u64>> {
    match optional_env(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .with_context(|| format!("{name} must be a positive integer")),
    }
}
