use std::path::Path;

use serde::Deserialize;

pub type ConfigurationError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Configuration {
    pub network: Option<NetworkConfiguration>,
    #[serde(rename = "static")]
    pub _static: Option<StaticConfiguration>,
    pub rewrite: Option<RewriteConfiguration>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct NetworkConfiguration {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct StaticConfiguration {
    pub path: Option<String>,
    pub remote_path: Option<String>,
    pub index: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct RewriteConfiguration {
    pub https_redirect: Option<HttpsRedirectConfiguration>,
    #[serde(default)]
    pub sources: Vec<RuleSource>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct HttpsRedirectConfiguration {
    pub status: Option<u16>,
    pub ssl_port: Option<u16>,
}

/// Rule text in one of the supported dialects, either inline or in a file.
#[derive(Deserialize, Debug, Clone)]
pub struct RuleSource {
    pub format: RuleFormat,
    pub path: Option<String>,
    pub rules: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleFormat {
    Iis,
    Apache,
}

/// Read a configuration file, toml when the extension says so and yaml
/// otherwise.
pub async fn load_configuration(path: &str) -> Result<Configuration, ConfigurationError> {
    let res = tokio::fs::read_to_string(path).await?;
    parse_configuration(path, &res)
}

pub fn parse_configuration(path: &str, content: &str) -> Result<Configuration, ConfigurationError> {
    let config = match Path::new(path).extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str::<Configuration>(content)?,
        _ => serde_yaml::from_str::<Configuration>(content)?,
    };
    Ok(config)
}
