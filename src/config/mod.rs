use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

use crate::amount::parse_ether_amount;
use crate::dispenser::DispenseSettings;
use crate::poller::{DEFAULT_MAX_ATTEMPTS, PollSettings};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FaucetConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub signer: SignerConfig,
    #[serde(default)]
    pub dispense: DispenseConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub access: AccessConfig,
}

impl FaucetConfig {
    /// Reads `config/faucet.toml` (or `$FAUCET_CONFIG`), an optional
    /// `config/faucet.$FAUCET_ENV.toml` overlay and `FAUCET_*` variables, in
    /// that order of precedence from lowest to highest.
    pub fn load() -> Result<Self> {
        let configured_path =
            std::env::var("FAUCET_CONFIG").unwrap_or_else(|_| "config/faucet.toml".to_string());
        assert!(
            !configured_path.is_empty(),
            "Configuration path must be non-empty"
        );
        assert!(
            configured_path.len() < 4096,
            "Configuration path length exceeds hard limit"
        );

        let mut builder = Config::builder()
            .add_source(File::new(&configured_path, FileFormat::Toml).required(false));

        if let Ok(env_override) = std::env::var("FAUCET_ENV") {
            if !env_override.is_empty() {
                let env_file = format!("config/faucet.{}.toml", env_override);
                if Path::new(&env_file).exists() {
                    builder = builder.add_source(File::new(&env_file, FileFormat::Toml));
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("FAUCET")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .map_err(|err| map_config_error(err, &configured_path))?;
        Self::from_settings(settings)
    }

    fn from_settings(settings: Config) -> Result<Self> {
        let mut config: Self = settings
            .try_deserialize()
            .context("Failed to deserialize faucet configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&mut self) -> Result<()> {
        self.chain.rpc_url = self.chain.rpc_url.take().filter(|url| !url.trim().is_empty());
        self.signer.private_key = self.signer.private_key.take().filter(|key| !key.is_empty());
        self.access.password = self.access.password.take().filter(|pw| !pw.is_empty());

        assert!(
            self.server.port > 0,
            "Server port must be greater than zero"
        );
        self.chain.ensure_bounds()?;
        self.dispense.ensure_bounds()?;
        self.poll.ensure_bounds()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Option<IpAddr>,
    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,
}

impl ServerConfig {
    pub fn address(&self) -> SocketAddr {
        let host = self.host.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(self.port != 0, "HTTP port cannot be zero");
        assert!(self.port < 65535, "HTTP port must be below 65535");
        SocketAddr::new(host, self.port)
    }

    const fn default_port() -> u16 {
        8080
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: Self::default_port(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: Option<String>,
    pub request_timeout_ms: Option<u64>,
}

impl ChainConfig {
    pub fn request_timeout(&self) -> Duration {
        let millis = self.request_timeout_ms.unwrap_or(10_000);
        assert!(millis >= 100, "RPC timeout must be at least 100ms");
        assert!(millis <= 60_000, "RPC timeout cannot exceed 60 seconds");
        Duration::from_millis(millis)
    }

    fn ensure_bounds(&self) -> Result<()> {
        if let Some(millis) = self.request_timeout_ms {
            ensure!(
                (100..=60_000).contains(&millis),
                "chain.request_timeout_ms must be between 100 and 60000"
            );
        }
        if let Some(url) = &self.rpc_url {
            ensure!(
                url.starts_with("http://") || url.starts_with("https://"),
                "chain.rpc_url must be an http(s) URL"
            );
        }
        Ok(())
    }
}

#[derive(Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString(***)")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignerConfig {
    pub private_key: Option<SecretString>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispenseConfig {
    /// Decimal ether, e.g. `"0.05"`.
    #[serde(default = "DispenseConfig::default_amount")]
    pub amount: String,
    #[serde(default = "DispenseConfig::default_timeout_secs")]
    pub timeout_secs: u64,
    pub cooldown_minutes: Option<u64>,
}

impl DispenseConfig {
    pub fn settings(&self) -> Result<DispenseSettings> {
        let amount = parse_ether_amount(&self.amount)
            .with_context(|| format!("Invalid dispense.amount {:?}", self.amount))?;
        Ok(DispenseSettings {
            amount,
            timeout: Duration::from_secs(self.timeout_secs),
            cooldown: self
                .cooldown_minutes
                .filter(|minutes| *minutes > 0)
                .map(|minutes| Duration::from_secs(minutes * 60)),
        })
    }

    fn ensure_bounds(&self) -> Result<()> {
        ensure!(
            (1..=300).contains(&self.timeout_secs),
            "dispense.timeout_secs must be between 1 and 300"
        );
        if let Some(minutes) = self.cooldown_minutes {
            ensure!(
                minutes <= 60 * 24 * 30,
                "dispense.cooldown_minutes cannot exceed 30 days"
            );
        }
        self.settings().map(|_| ())
    }

    fn default_amount() -> String {
        "0.05".to_string()
    }

    const fn default_timeout_secs() -> u64 {
        30
    }
}

impl Default for DispenseConfig {
    fn default() -> Self {
        Self {
            amount: Self::default_amount(),
            timeout_secs: Self::default_timeout_secs(),
            cooldown_minutes: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    #[serde(default = "PollConfig::default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "PollConfig::default_interval_ms")]
    pub interval_ms: u64,
}

impl PollConfig {
    pub fn settings(&self) -> PollSettings {
        PollSettings::new(self.max_attempts, Duration::from_millis(self.interval_ms))
    }

    /// Configured polling with command-line values taking precedence.
    pub fn with_overrides(
        &self,
        max_attempts: Option<u32>,
        interval_ms: Option<u64>,
    ) -> Result<PollSettings> {
        let merged = Self {
            max_attempts: max_attempts.unwrap_or(self.max_attempts),
            interval_ms: interval_ms.unwrap_or(self.interval_ms),
        };
        merged.ensure_bounds()?;
        Ok(merged.settings())
    }

    fn ensure_bounds(&self) -> Result<()> {
        ensure!(
            (1..=1_000).contains(&self.max_attempts),
            "poll.max_attempts must be between 1 and 1000"
        );
        ensure!(
            (100..=600_000).contains(&self.interval_ms),
            "poll.interval_ms must be between 100 and 600000"
        );
        Ok(())
    }

    const fn default_max_attempts() -> u32 {
        DEFAULT_MAX_ATTEMPTS
    }

    const fn default_interval_ms() -> u64 {
        5_000
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: Self::default_max_attempts(),
            interval_ms: Self::default_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccessConfig {
    pub password: Option<SecretString>,
}

fn map_config_error(err: ConfigError, path: &str) -> ConfigError {
    match err {
        ConfigError::NotFound(_) => ConfigError::NotFound(path.to_string()),
        other => other,
    }
}
