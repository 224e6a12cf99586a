// ABOUTME: Environment configuration for the trust fabric server and its components
// ABOUTME: Parses agent, security, OAuth, certificate, crypto and transport settings
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Environment-based configuration
//!
//! Every setting has a default except the secrets, which fall back to random
//! development keys with a warning. Malformed values are rejected with
//! [`ErrorCode::ConfigInvalid`](a2a_trust_core::ErrorCode::ConfigInvalid).

use std::env;
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tracing::{info, warn};
use url::Url;

use crate::a2a::{ChannelConfig, SecurityLevel};
use crate::certificates::{is_valid_agent_id, CertificateAuthorityConfig};
use crate::crypto::{random_hex, EnvelopeKeys};
use crate::oauth2_server::TokenServiceConfig;
use a2a_trust_core::constants::defaults;
use a2a_trust_core::{AppError, AppResult};

/// Minimum RSA modulus accepted for any key
const MIN_RSA_KEY_SIZE: usize = 2048;

/// Longest configurable lifetime for tokens, sessions and the replay window (ten years)
const MAX_DURATION_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Longest configurable certificate validity (one hundred years)
const MAX_VALIDITY_DAYS: i64 = 100 * 365;

/// Identity of the local agent and where it listens
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Agent id used as envelope sender and certificate common name
    pub agent_id: String,
    /// Display name of the agent's OAuth client
    pub agent_name: String,
    /// Public base URL; also the token issuer
    pub base_url: Url,
    /// HTTP listen port
    pub http_port: u16,
}

/// Security policy applied by the orchestrator
#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    /// Default security level for channels
    pub security_level: SecurityLevel,
    /// Requests per agent per minute
    pub rate_limit_per_minute: u32,
    /// Session lifetime
    pub max_session_duration: Duration,
    /// Permitted client addresses; empty allows all
    pub allowed_ips: Vec<IpAddr>,
    /// Permitted user-agent fragments; empty allows all
    pub allowed_user_agents: Vec<String>,
    /// Whether the certificate authority is enabled
    pub enable_certificates: bool,
    /// Whether audit entries are retained
    pub audit_logging: bool,
    /// Audit buffer capacity
    pub audit_capacity: usize,
    /// Replay retention window
    pub replay_window: Duration,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            security_level: SecurityLevel::Standard,
            rate_limit_per_minute: defaults::RATE_LIMIT_PER_MINUTE,
            max_session_duration: Duration::seconds(defaults::MAX_SESSION_SECS),
            allowed_ips: Vec::new(),
            allowed_user_agents: Vec::new(),
            enable_certificates: true,
            audit_logging: true,
            audit_capacity: defaults::AUDIT_CAPACITY,
            replay_window: Duration::seconds(defaults::REPLAY_WINDOW_SECS),
        }
    }
}

impl SecurityPolicy {
    /// Whether `ip` passes the allow list
    #[must_use]
    pub fn allows_ip(&self, ip: Option<IpAddr>) -> bool {
        self.allowed_ips.is_empty() || ip.is_some_and(|ip| self.allowed_ips.contains(&ip))
    }

    /// Whether `user_agent` contains one of the allowed fragments
    #[must_use]
    pub fn allows_user_agent(&self, user_agent: Option<&str>) -> bool {
        self.allowed_user_agents.is_empty()
            || user_agent.is_some_and(|ua| {
                self.allowed_user_agents
                    .iter()
                    .any(|allowed| ua.contains(allowed.as_str()))
            })
    }
}

/// OAuth lifetimes
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// Access token lifetime
    pub access_token_ttl: Duration,
    /// Refresh token lifetime
    pub refresh_token_ttl: Duration,
    /// Authorization code lifetime
    pub authorization_code_expiry: Duration,
    /// Expiry sweep interval
    pub cleanup_interval: StdDuration,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            access_token_ttl: Duration::seconds(defaults::ACCESS_TOKEN_TTL_SECS),
            refresh_token_ttl: Duration::seconds(defaults::REFRESH_TOKEN_TTL_SECS),
            authorization_code_expiry: Duration::seconds(defaults::AUTHORIZATION_CODE_EXPIRY_SECS),
            cleanup_interval: StdDuration::from_secs(defaults::CLEANUP_INTERVAL_SECS),
        }
    }
}

/// Envelope secrets
#[derive(Clone)]
pub struct CryptoConfig {
    /// HMAC signing secret
    pub signing_key: String,
    /// AES key material
    pub encryption_key: String,
    /// Whether the secrets were generated for this process only
    pub generated: bool,
}

impl fmt::Debug for CryptoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoConfig")
            .field("signing_key", &"[REDACTED]")
            .field("encryption_key", &"[REDACTED]")
            .field("generated", &self.generated)
            .finish()
    }
}

impl CryptoConfig {
    /// Random secrets valid for this process only
    ///
    /// # Errors
    ///
    /// Returns an error if the system random source fails
    pub fn generate() -> AppResult<Self> {
        let secret = || random_hex(32).map_err(|e| AppError::internal(e.to_string()));
        Ok(Self {
            signing_key: secret()?,
            encryption_key: secret()?,
            generated: true,
        })
    }

    /// Keys derived from the secrets
    #[must_use]
    pub fn envelope_keys(&self) -> EnvelopeKeys {
        EnvelopeKeys::from_secrets(&self.signing_key, &self.encryption_key)
    }
}

/// Outbound delivery settings and the peer directory
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-attempt deadline
    pub request_timeout: StdDuration,
    /// Retries after a failed delivery
    pub retry_count: u32,
    /// Pause between retries
    pub retry_delay: StdDuration,
    /// Known peers and their base URLs
    pub peers: Vec<(String, Url)>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: StdDuration::from_millis(defaults::REQUEST_TIMEOUT_MS),
            retry_count: defaults::RETRY_COUNT,
            retry_delay: StdDuration::from_millis(defaults::RETRY_DELAY_MS),
            peers: Vec::new(),
        }
    }
}

/// Complete trust fabric configuration
#[derive(Debug, Clone)]
pub struct FabricConfig {
    /// Local agent
    pub agent: AgentConfig,
    /// Security policy
    pub security: SecurityPolicy,
    /// OAuth lifetimes
    pub oauth: OAuthConfig,
    /// Certificate authority settings
    pub certificates: CertificateAuthorityConfig,
    /// Envelope secrets
    pub crypto: CryptoConfig,
    /// Delivery settings
    pub transport: TransportConfig,
}

impl FabricConfig {
    /// Defaults for `agent_id` at `base_url` with fresh random secrets
    ///
    /// # Errors
    ///
    /// Returns an error if the agent id is invalid or random generation fails
    pub fn development(agent_id: &str, base_url: Url) -> AppResult<Self> {
        if !is_valid_agent_id(agent_id) {
            return Err(AppError::config_invalid(format!(
                "A2A_AGENT_ID '{agent_id}' is not a valid agent id"
            )));
        }
        Ok(Self {
            agent: AgentConfig {
                agent_id: agent_id.to_owned(),
                agent_name: agent_id.to_owned(),
                base_url,
                http_port: defaults::HTTP_PORT,
            },
            security: SecurityPolicy::default(),
            oauth: OAuthConfig::default(),
            certificates: CertificateAuthorityConfig::default(),
            crypto: CryptoConfig::generate()?,
            transport: TransportConfig::default(),
        })
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::ConfigInvalid`](a2a_trust_core::ErrorCode::ConfigInvalid)
    /// for malformed values
    pub fn from_env() -> AppResult<Self> {
        let http_port: u16 = env_parse("HTTP_PORT", defaults::HTTP_PORT)?;
        let agent_id = env_var_or("A2A_AGENT_ID", "a2a-agent");
        if !is_valid_agent_id(&agent_id) {
            return Err(AppError::config_invalid(format!(
                "A2A_AGENT_ID '{agent_id}' is not a valid agent id"
            )));
        }
        let base_url = parse_base_url(
            "A2A_BASE_URL",
            &env_var_or("A2A_BASE_URL", &format!("http://localhost:{http_port}")),
        )?;
        let agent = AgentConfig {
            agent_name: env_var_or("A2A_AGENT_NAME", &agent_id),
            agent_id,
            base_url,
            http_port,
        };

        let security = SecurityPolicy {
            security_level: env_parse("A2A_SECURITY_LEVEL", SecurityLevel::Standard)?,
            rate_limit_per_minute: positive(
                "A2A_RATE_LIMIT_PER_MINUTE",
                env_parse("A2A_RATE_LIMIT_PER_MINUTE", defaults::RATE_LIMIT_PER_MINUTE)?,
            )?,
            max_session_duration: seconds("A2A_MAX_SESSION_SECS", defaults::MAX_SESSION_SECS)?,
            allowed_ips: parse_list(&env_var_or("A2A_ALLOWED_IPS", ""))
                .iter()
                .map(|ip| {
                    ip.parse::<IpAddr>().map_err(|e| {
                        AppError::config_invalid(format!("A2A_ALLOWED_IPS entry '{ip}': {e}"))
                    })
                })
                .collect::<AppResult<_>>()?,
            allowed_user_agents: parse_list(&env_var_or("A2A_ALLOWED_USER_AGENTS", "")),
            enable_certificates: env_bool("A2A_ENABLE_CERTIFICATES", true)?,
            audit_logging: env_bool("A2A_AUDIT_LOGGING", true)?,
            audit_capacity: positive(
                "A2A_AUDIT_CAPACITY",
                env_parse("A2A_AUDIT_CAPACITY", defaults::AUDIT_CAPACITY)?,
            )?,
            replay_window: seconds("A2A_REPLAY_WINDOW_SECS", defaults::REPLAY_WINDOW_SECS)?,
        };

        let oauth = OAuthConfig {
            access_token_ttl: seconds(
                "OAUTH_ACCESS_TOKEN_TTL_SECS",
                defaults::ACCESS_TOKEN_TTL_SECS,
            )?,
            refresh_token_ttl: seconds(
                "OAUTH_REFRESH_TOKEN_TTL_SECS",
                defaults::REFRESH_TOKEN_TTL_SECS,
            )?,
            authorization_code_expiry: seconds(
                "OAUTH_AUTH_CODE_EXPIRY_SECS",
                defaults::AUTHORIZATION_CODE_EXPIRY_SECS,
            )?,
            cleanup_interval: StdDuration::from_secs(positive(
                "OAUTH_CLEANUP_INTERVAL_SECS",
                env_parse("OAUTH_CLEANUP_INTERVAL_SECS", defaults::CLEANUP_INTERVAL_SECS)?,
            )?),
        };

        let certificates = CertificateAuthorityConfig {
            storage_dir: env::var("A2A_CERT_DIR")
                .ok()
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from),
            validity_days: validity_days("A2A_CERT_VALIDITY_DAYS", defaults::CERT_VALIDITY_DAYS)?,
            key_size: key_size("A2A_CERT_KEY_SIZE", defaults::CERT_KEY_SIZE)?,
            ca_key_size: key_size("A2A_CA_KEY_SIZE", defaults::CA_KEY_SIZE)?,
            ca_validity_days: validity_days("A2A_CA_VALIDITY_DAYS", defaults::CA_VALIDITY_DAYS)?,
        };

        let crypto = match (env::var("A2A_SIGNING_KEY"), env::var("A2A_ENCRYPTION_KEY")) {
            (Ok(signing_key), Ok(encryption_key))
                if !signing_key.is_empty() && !encryption_key.is_empty() =>
            {
                CryptoConfig {
                    signing_key,
                    encryption_key,
                    generated: false,
                }
            }
            _ => {
                warn!("A2A_SIGNING_KEY or A2A_ENCRYPTION_KEY not set; using random development keys that peers cannot share");
                CryptoConfig::generate()?
            }
        };

        let transport = TransportConfig {
            request_timeout: StdDuration::from_millis(positive(
                "A2A_REQUEST_TIMEOUT_MS",
                env_parse("A2A_REQUEST_TIMEOUT_MS", defaults::REQUEST_TIMEOUT_MS)?,
            )?),
            retry_count: env_parse("A2A_RETRY_COUNT", defaults::RETRY_COUNT)?,
            retry_delay: StdDuration::from_millis(env_parse(
                "A2A_RETRY_DELAY_MS",
                defaults::RETRY_DELAY_MS,
            )?),
            peers: parse_peers(&env_var_or("A2A_PEERS", ""))?,
        };

        let config = Self {
            agent,
            security,
            oauth,
            certificates,
            crypto,
            transport,
        };
        config.log_summary();
        Ok(config)
    }

    /// Token service settings with the agent's base URL as issuer
    #[must_use]
    pub fn token_service_config(&self) -> TokenServiceConfig {
        TokenServiceConfig {
            issuer: self.agent.base_url.clone(),
            access_token_ttl: self.oauth.access_token_ttl,
            refresh_token_ttl: self.oauth.refresh_token_ttl,
            authorization_code_expiry: self.oauth.authorization_code_expiry,
            cleanup_interval: self.oauth.cleanup_interval,
        }
    }

    /// Channel delivery and replay settings
    #[must_use]
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            request_timeout: self.transport.request_timeout,
            retry_count: self.transport.retry_count,
            retry_delay: self.transport.retry_delay,
            replay_window: self.security.replay_window,
        }
    }

    fn log_summary(&self) {
        info!(
            agent_id = %self.agent.agent_id,
            base_url = %self.agent.base_url,
            http_port = self.agent.http_port,
            security_level = %self.security.security_level,
            certificates = self.security.enable_certificates,
            cert_dir = ?self.certificates.storage_dir,
            peers = self.transport.peers.len(),
            "Loaded trust fabric configuration"
        );
    }
}

/// Get environment variable or default value
fn env_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn env_parse<T>(key: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| AppError::config_invalid(format!("{key}='{raw}': {e}"))),
        _ => Ok(default),
    }
}

fn env_bool(key: &str, default: bool) -> AppResult<bool> {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "" => Ok(default),
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(AppError::config_invalid(format!(
                "{key}='{raw}' is not a boolean"
            ))),
        },
        Err(_) => Ok(default),
    }
}

fn positive<T: PartialOrd + Default + fmt::Display>(key: &str, value: T) -> AppResult<T> {
    if value > T::default() {
        Ok(value)
    } else {
        Err(AppError::config_invalid(format!(
            "{key} must be greater than zero, got {value}"
        )))
    }
}

fn at_most(key: &str, value: i64, max: i64) -> AppResult<i64> {
    if value > max {
        return Err(AppError::config_invalid(format!(
            "{key} must be at most {max}, got {value}"
        )));
    }
    Ok(value)
}

fn seconds(key: &str, default: i64) -> AppResult<Duration> {
    let secs = at_most(key, positive(key, env_parse(key, default)?)?, MAX_DURATION_SECS)?;
    Duration::try_seconds(secs)
        .ok_or_else(|| AppError::config_invalid(format!("{key}={secs} is out of range")))
}

fn validity_days(key: &str, default: i64) -> AppResult<i64> {
    at_most(key, positive(key, env_parse(key, default)?)?, MAX_VALIDITY_DAYS)
}

fn key_size(key: &str, default: usize) -> AppResult<usize> {
    let bits = env_parse(key, default)?;
    if bits < MIN_RSA_KEY_SIZE {
        return Err(AppError::config_invalid(format!(
            "{key} must be at least {MIN_RSA_KEY_SIZE} bits, got {bits}"
        )));
    }
    Ok(bits)
}

fn parse_base_url(key: &str, raw: &str) -> AppResult<Url> {
    let url = Url::parse(raw)
        .map_err(|e| AppError::config_invalid(format!("{key}='{raw}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AppError::config_invalid(format!(
            "{key}='{raw}' must be an http or https URL"
        )));
    }
    Ok(url)
}

/// Parse a comma-separated list, dropping empty items
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Parse `id=url` pairs
fn parse_peers(raw: &str) -> AppResult<Vec<(String, Url)>> {
    parse_list(raw)
        .into_iter()
        .map(|pair| {
            let (peer_id, url) = pair.split_once('=').ok_or_else(|| {
                AppError::config_invalid(format!("A2A_PEERS entry '{pair}' is not id=url"))
            })?;
            let peer_id = peer_id.trim();
            if !is_valid_agent_id(peer_id) {
                return Err(AppError::config_invalid(format!(
                    "A2A_PEERS entry '{pair}' has an invalid agent id"
                )));
            }
            Ok((peer_id.to_owned(), parse_base_url("A2A_PEERS", url.trim())?))
        })
        .collect()
}
