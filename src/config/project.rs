use log::{ debug, info };
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

use super::credential::{ Credential, CredentialError };

pub const PROJECT_API_VERSION: &str = "2024-07-01-preview";
const AI_SERVICES_CATEGORY: &str = "AIServices";
const API_KEY_AUTH: &str = "ApiKey";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required but was not set")]
    Missing(&'static str),
    #[error("malformed project connection string: {0}")]
    MalformedConnectionString(String),
    #[error("invalid URL '{value}': {source}")]
    InvalidUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("project connections request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("project connections endpoint returned {status}: {body}")]
    Status {
        status: u16,
        body: String,
    },
    #[error(
        "project '{0}' has no Azure AI Services connection; set AZURE_AI_INFERENCE_ENDPOINT instead"
    )]
    NoAiServicesConnection(String),
    #[error("connection '{0}' uses key auth but returned no key")]
    MissingConnectionKey(String),
    #[error(transparent)]
    Credential(#[from] CredentialError),
}

/// Parsed `<host>;<subscription_id>;<resource_group>;<project_name>` connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectConnection {
    pub host: String,
    pub subscription_id: String,
    pub resource_group: String,
    pub project_name: String,
}

impl FromStr for ProjectConnection {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(';').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(
                ConfigError::MalformedConnectionString(
                    format!("expected 4 ';'-separated parts, found {}", parts.len())
                )
            );
        }
        let labels = ["host", "subscription id", "resource group", "project name"];
        if let Some((label, _)) = labels
            .iter()
            .zip(parts.iter())
            .find(|(_, part)| part.is_empty())
        {
            return Err(ConfigError::MalformedConnectionString(format!("{} is empty", label)));
        }

        let host = parts[0]
            .trim_start_matches("https://")
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            host,
            subscription_id: parts[1].to_string(),
            resource_group: parts[2].to_string(),
            project_name: parts[3].to_string(),
        })
    }
}

impl ProjectConnection {
    /// Base URL of the project's discovery API, the host named in the connection string.
    pub fn project_url(&self) -> Result<Url, ConfigError> {
        parse_url(
            &format!(
                "https://{}/agents/v1.0/subscriptions/{}/resourceGroups/{}/providers/Microsoft.MachineLearningServices/workspaces/{}",
                self.host,
                self.subscription_id,
                self.resource_group,
                self.project_name
            )
        )
    }
}

pub fn parse_url(value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|source| ConfigError::InvalidUrl {
        value: value.to_string(),
        source,
    })
}

#[derive(Deserialize, Debug)]
struct ConnectionList {
    #[serde(default)]
    value: Vec<ServiceConnection>,
}

/// A connected resource registered on the project.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ServiceConnection {
    pub name: String,
    pub properties: ConnectionProperties,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionProperties {
    pub category: String,
    pub target: String,
    #[serde(default)]
    pub auth_type: Option<String>,
    #[serde(default)]
    pub credentials: Option<ConnectionCredentials>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ConnectionCredentials {
    #[serde(default)]
    pub key: Option<String>,
}

impl ServiceConnection {
    /// Model inference endpoint served by this connection.
    pub fn inference_endpoint(&self) -> Result<Url, ConfigError> {
        parse_url(&format!("{}/models", self.properties.target.trim_end_matches('/')))
    }

    pub fn uses_api_key(&self) -> bool {
        self.properties.auth_type
            .as_deref()
            .is_some_and(|auth| auth.eq_ignore_ascii_case(API_KEY_AUTH))
    }
}

/// Client for the project's connections API.
pub struct ProjectClient {
    http: HttpClient,
    project_url: Url,
    credential: Credential,
}

impl ProjectClient {
    pub fn new(connection: &ProjectConnection, credential: Credential) -> Result<Self, ConfigError> {
        Self::with_project_url(connection.project_url()?, credential)
    }

    pub fn with_project_url(project_url: Url, credential: Credential) -> Result<Self, ConfigError> {
        let http = HttpClient::builder().build()?;
        Ok(Self { http, project_url, credential })
    }

    fn url(&self, path: &str) -> Result<Url, ConfigError> {
        let mut url = parse_url(
            &format!("{}/{}", self.project_url.as_str().trim_end_matches('/'), path)
        )?;
        url.query_pairs_mut().append_pair("api-version", PROJECT_API_VERSION);
        Ok(url)
    }

    /// The project's default Azure AI Services connection, the first one listed.
    pub async fn default_ai_services_connection(&self) -> Result<ServiceConnection, ConfigError> {
        let mut url = self.url("connections")?;
        url.query_pairs_mut()
            .append_pair("category", AI_SERVICES_CATEGORY)
            .append_pair("includeAll", "true");
        debug!("Listing project connections at {}", url);

        let (auth_name, auth_value) = self.credential.header().await?;
        let resp = self.http.get(url).header(auth_name, auth_value).send().await?;
        let list: ConnectionList = read_json(resp).await?;

        let connection = list.value
            .into_iter()
            .find(|c| c.properties.category == AI_SERVICES_CATEGORY)
            .ok_or_else(|| ConfigError::NoAiServicesConnection(self.project_name()))?;
        info!("Using AI Services connection '{}' ({})", connection.name, connection.properties.target);
        Ok(connection)
    }

    /// API key stored on a key-auth connection.
    pub async fn connection_key(&self, name: &str) -> Result<String, ConfigError> {
        let url = self.url(&format!("connections/{}/listsecrets", name))?;
        let (auth_name, auth_value) = self.credential.header().await?;
        let resp = self.http
            .post(url)
            .header(auth_name, auth_value)
            .json(&serde_json::json!({ "ignored": "ignore" }))
            .send().await?;
        let connection: ServiceConnection = read_json(resp).await?;

        connection.properties.credentials
            .and_then(|c| c.key)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingConnectionKey(name.to_string()))
    }

    fn project_name(&self) -> String {
        self.project_url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default()
            .to_string()
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T, ConfigError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ConfigError::Status { status: status.as_u16(), body });
    }
    Ok(resp.json().await?)
}
