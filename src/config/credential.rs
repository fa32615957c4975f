use chrono::{ Local, NaiveDateTime, TimeZone };
use log::{ debug, info };
use reqwest::header::{ HeaderName, HeaderValue, AUTHORIZATION };
use serde::Deserialize;
use std::fmt;
use std::time::{ SystemTime, UNIX_EPOCH };
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::RwLock;

pub const API_KEY_ENV: &str = "AZURE_AI_API_KEY";
pub const ACCESS_TOKEN_ENV: &str = "AZURE_ACCESS_TOKEN";
pub const COGNITIVE_SERVICES_RESOURCE: &str = "https://cognitiveservices.azure.com";
pub const MANAGEMENT_RESOURCE: &str = "https://management.azure.com";

/// Tokens closer than this to expiry are fetched again.
const REFRESH_MARGIN_SECS: u64 = 300;
const CLI_EXPIRES_ON_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error(
        "no credential available: set AZURE_AI_API_KEY or AZURE_ACCESS_TOKEN, or sign in with `az login` ({0})"
    )]
    Unavailable(String),
    #[error("credential contains characters not allowed in an HTTP header")]
    InvalidHeader,
    #[error("unexpected token output from az: {0}")]
    TokenFormat(String),
}

/// How requests to the hosted project are authenticated.
///
/// Resolved once at startup by trying, in order: an explicit API key, a
/// pre-issued bearer token, and a token from the Azure CLI. CLI tokens are
/// fetched again whenever the cached one is about to expire.
pub enum Credential {
    ApiKey(String),
    Bearer(String),
    AzureCli(AzureCliToken),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::ApiKey(_) => write!(f, "Credential::ApiKey(<redacted>)"),
            Credential::Bearer(_) => write!(f, "Credential::Bearer(<redacted>)"),
            Credential::AzureCli(cli) => write!(f, "Credential::AzureCli({})", cli.resource),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    /// Unix seconds.
    pub expires_on: u64,
}

impl AccessToken {
    fn is_fresh(&self, now: u64) -> bool {
        now + REFRESH_MARGIN_SECS < self.expires_on
    }
}

/// Token for one resource, obtained from `az account get-access-token` and
/// cached until shortly before it expires.
pub struct AzureCliToken {
    resource: String,
    cached: RwLock<Option<AccessToken>>,
}

impl AzureCliToken {
    pub fn new(resource: impl Into<String>) -> Self {
        Self { resource: resource.into(), cached: RwLock::new(None) }
    }

    pub fn with_token(resource: impl Into<String>, token: AccessToken) -> Self {
        Self { resource: resource.into(), cached: RwLock::new(Some(token)) }
    }

    pub async fn current(&self) -> Result<String, CredentialError> {
        let now = unix_now();
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(now)) {
                return Ok(token.token.clone());
            }
        }

        let mut cached = self.cached.write().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(now)) {
            return Ok(token.token.clone());
        }
        let token = azure_cli_token(&self.resource).await?;
        info!("Azure CLI token for {} refreshed, expires at {}", self.resource, token.expires_on);
        let value = token.token.clone();
        *cached = Some(token);
        Ok(value)
    }
}

impl Credential {
    /// Credential for calling `resource` (an Entra audience such as
    /// [`COGNITIVE_SERVICES_RESOURCE`]).
    pub async fn resolve(resource: &str) -> Result<Self, CredentialError> {
        Self::resolve_with(resource, |name| std::env::var(name).ok()).await
    }

    pub async fn resolve_with<F>(resource: &str, lookup: F) -> Result<Self, CredentialError>
        where F: Fn(&str) -> Option<String>
    {
        if let Some(credential) = Self::from_lookup(&lookup) {
            return Ok(credential);
        }
        Self::azure_cli(resource).await
    }

    /// Bearer-only credential, for APIs that do not accept model API keys.
    pub async fn resolve_token(resource: &str) -> Result<Self, CredentialError> {
        match non_empty_env(ACCESS_TOKEN_ENV) {
            Some(token) => {
                info!("Using bearer token from {} for {}", ACCESS_TOKEN_ENV, resource);
                Ok(Credential::Bearer(token))
            }
            None => Self::azure_cli(resource).await,
        }
    }

    /// API key or bearer token from the environment, if either is set.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(&|name: &str| std::env::var(name).ok())
    }

    async fn azure_cli(resource: &str) -> Result<Self, CredentialError> {
        debug!("No credential in environment, asking the Azure CLI for a token");
        let cli = AzureCliToken::new(resource);
        cli.current().await?;
        info!("Using Azure CLI token for {}", resource);
        Ok(Credential::AzureCli(cli))
    }

    fn from_lookup<F>(lookup: &F) -> Option<Self> where F: Fn(&str) -> Option<String> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty(API_KEY_ENV) {
            info!("Using API key from {} for authentication", API_KEY_ENV);
            return Some(Credential::ApiKey(key.trim().to_string()));
        }
        if let Some(token) = non_empty(ACCESS_TOKEN_ENV) {
            info!("Using bearer token from {} for authentication", ACCESS_TOKEN_ENV);
            return Some(Credential::Bearer(token.trim().to_string()));
        }
        None
    }

    /// Auth header for the next request. Refreshes a CLI token first when needed.
    pub async fn header(&self) -> Result<(HeaderName, HeaderValue), CredentialError> {
        let (name, raw) = match self {
            Credential::ApiKey(key) => (HeaderName::from_static("api-key"), key.clone()),
            Credential::Bearer(token) => (AUTHORIZATION, format!("Bearer {}", token)),
            Credential::AzureCli(cli) => (AUTHORIZATION, format!("Bearer {}", cli.current().await?)),
        };
        let mut value = HeaderValue::from_str(&raw).map_err(|_| CredentialError::InvalidHeader)?;
        value.set_sensitive(true);
        Ok((name, value))
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Deserialize)]
struct CliAccessToken {
    #[serde(rename = "accessToken")]
    access_token: String,
    #[serde(default)]
    expires_on: Option<u64>,
    #[serde(rename = "expiresOn", default)]
    expires_on_local: Option<String>,
}

/// Parses `az account get-access-token -o json`. Newer CLIs report
/// `expires_on` in unix seconds; older ones only the local `expiresOn` time.
fn parse_cli_token(stdout: &str) -> Result<AccessToken, CredentialError> {
    let raw: CliAccessToken = serde_json
        ::from_str(stdout)
        .map_err(|e| CredentialError::TokenFormat(e.to_string()))?;
    if raw.access_token.trim().is_empty() {
        return Err(CredentialError::Unavailable("az returned an empty token".to_string()));
    }

    let expires_on = raw.expires_on
        .or_else(|| raw.expires_on_local.as_deref().and_then(parse_local_expiry))
        .ok_or_else(|| CredentialError::TokenFormat("no expiry in token output".to_string()))?;

    Ok(AccessToken { token: raw.access_token.trim().to_string(), expires_on })
}

fn parse_local_expiry(value: &str) -> Option<u64> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), CLI_EXPIRES_ON_FORMAT).ok()?;
    let local = Local.from_local_datetime(&naive).earliest()?;
    u64::try_from(local.timestamp()).ok()
}

async fn azure_cli_token(resource: &str) -> Result<AccessToken, CredentialError> {
    let output = Command::new("az")
        .args(["account", "get-access-token", "--resource", resource, "-o", "json"])
        .output().await
        .map_err(|e| CredentialError::Unavailable(format!("failed to run az: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CredentialError::Unavailable(stderr.trim().to_string()));
    }

    parse_cli_token(&String::from_utf8_lossy(&output.stdout))
}
