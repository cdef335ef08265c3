//! Secret resolution over an ordered chain of providers
//!
//! Each provider is queried in turn; the first present, non-empty (trimmed)
//! value wins. The default chain is environment, then the secrets TOML file,
//! then built-in defaults.

use crate::error::CredentialError;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

pub const REDDIT_CLIENT_ID: &str = "REDDIT_CLIENT_ID";
pub const REDDIT_CLIENT_SECRET: &str = "REDDIT_CLIENT_SECRET";
pub const REDDIT_USER_AGENT: &str = "REDDIT_USER_AGENT";
pub const CLAUDE_BASE_URL: &str = "CLAUDE_BASE_URL";
pub const CLAUDE_API_KEY: &str = "CLAUDE_API_KEY";
pub const CLAUDE_MODEL: &str = "CLAUDE_MODEL";
pub const ACCESS_PASSCODE: &str = "ACCESS_PASSCODE";

/// Names that must resolve before a run can start, in report order
pub const REQUIRED: [&str; 5] = [
    REDDIT_CLIENT_ID,
    REDDIT_CLIENT_SECRET,
    REDDIT_USER_AGENT,
    CLAUDE_BASE_URL,
    CLAUDE_API_KEY,
];

const DEFAULT_USER_AGENT: &str = "reddit-insight-app/1.0 by service";

pub trait SecretProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn get(&self, key: &str) -> Option<String>;
}

/// Reads process environment variables
pub struct EnvProvider;

impl SecretProvider for EnvProvider {
    fn name(&self) -> &'static str {
        "env"
    }

    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Fixed key/value pairs, used for built-in defaults and secrets files
pub struct StaticProvider {
    name: &'static str,
    values: HashMap<String, String>,
}

impl StaticProvider {
    pub fn new(name: &'static str, values: HashMap<String, String>) -> Self {
        Self { name, values }
    }

    pub fn defaults() -> Self {
        let mut values = HashMap::new();
        values.insert(REDDIT_USER_AGENT.to_string(), DEFAULT_USER_AGENT.to_string());
        Self::new("defaults", values)
    }

    /// Load top-level scalar entries from a TOML secrets file.
    /// A missing file yields an empty provider.
    pub fn from_secrets_file(path: &Path) -> Result<Self, CredentialError> {
        if !path.exists() {
            debug!("Secrets file {:?} not found, skipping", path);
            return Ok(Self::new("secrets_file", HashMap::new()));
        }

        let content =
            std::fs::read_to_string(path).map_err(|e| CredentialError::ReadSecrets {
                path: path.to_path_buf(),
                source: e,
            })?;
        let table: toml::Table =
            toml::from_str(&content).map_err(|e| CredentialError::ParseSecrets {
                path: path.to_path_buf(),
                source: e,
            })?;

        let values = table
            .into_iter()
            .filter_map(|(key, value)| {
                let value = match value {
                    toml::Value::String(s) => s,
                    toml::Value::Integer(i) => i.to_string(),
                    toml::Value::Float(f) => f.to_string(),
                    toml::Value::Boolean(b) => b.to_string(),
                    _ => return None,
                };
                Some((key, value))
            })
            .collect();

        Ok(Self::new("secrets_file", values))
    }
}

impl SecretProvider for StaticProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

pub struct CredentialChain {
    providers: Vec<Box<dyn SecretProvider>>,
}

impl CredentialChain {
    pub fn new(providers: Vec<Box<dyn SecretProvider>>) -> Self {
        Self { providers }
    }

    /// Environment, then the secrets file, then built-in defaults
    pub fn standard(secrets_file: &Path) -> Result<Self, CredentialError> {
        Ok(Self::new(vec![
            Box::new(EnvProvider),
            Box::new(StaticProvider::from_secrets_file(secrets_file)?),
            Box::new(StaticProvider::defaults()),
        ]))
    }

    pub fn get(&self, key: &str) -> Option<String> {
        for provider in &self.providers {
            if let Some(value) = provider.get(key) {
                let trimmed = value.trim();
                if !trimmed.is_empty() {
                    debug!("Resolved {} from {}", key, provider.name());
                    return Some(trimmed.to_string());
                }
            }
        }
        None
    }

    /// Name of the provider that would supply `key`
    pub fn source_of(&self, key: &str) -> Option<&'static str> {
        self.providers
            .iter()
            .find(|p| p.get(key).is_some_and(|v| !v.trim().is_empty()))
            .map(|p| p.name())
    }

    pub fn missing(&self) -> Vec<String> {
        REQUIRED
            .iter()
            .filter(|key| self.get(key).is_none())
            .map(|key| key.to_string())
            .collect()
    }
}

/// Resolved upstream credentials for one run
#[derive(Clone)]
pub struct Credentials {
    pub reddit_client_id: String,
    pub reddit_client_secret: String,
    pub reddit_user_agent: String,
    pub llm_api_key: String,
    pub llm_base_url: String,
    pub access_passcode: Option<String>,
}

impl Credentials {
    pub fn resolve(chain: &CredentialChain) -> Result<Self, CredentialError> {
        let missing = chain.missing();
        if !missing.is_empty() {
            return Err(CredentialError::Missing(missing));
        }

        let require = |key: &str| {
            chain
                .get(key)
                .ok_or_else(|| CredentialError::Missing(vec![key.to_string()]))
        };

        Ok(Self {
            reddit_client_id: require(REDDIT_CLIENT_ID)?,
            reddit_client_secret: require(REDDIT_CLIENT_SECRET)?,
            reddit_user_agent: require(REDDIT_USER_AGENT)?,
            llm_api_key: require(CLAUDE_API_KEY)?,
            llm_base_url: require(CLAUDE_BASE_URL)?,
            access_passcode: chain.get(ACCESS_PASSCODE),
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("reddit_client_id", &redact(&self.reddit_client_id))
            .field("reddit_client_secret", &"<redacted>")
            .field("reddit_user_agent", &self.reddit_user_agent)
            .field("llm_api_key", &"<redacted>")
            .field("llm_base_url", &self.llm_base_url)
            .field("access_passcode", &self.access_passcode.as_ref().map(|_| "<set>"))
            .finish()
    }
}

fn redact(val: &str) -> String {
    let n = val.chars().count().min(4);
    let head: String = val.chars().take(n).collect();
    format!("{}...({} chars)", head, val.chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn provider(name: &'static str, pairs: &[(&str, &str)]) -> Box<dyn SecretProvider> {
        Box::new(StaticProvider::new(
            name,
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ))
    }

    #[test]
    fn test_first_non_empty_value_wins() {
        let chain = CredentialChain::new(vec![
            provider("first", &[(REDDIT_CLIENT_ID, "   ")]),
            provider("second", &[(REDDIT_CLIENT_ID, " abc ")]),
            provider("third", &[(REDDIT_CLIENT_ID, "zzz")]),
        ]);
        assert_eq!(chain.get(REDDIT_CLIENT_ID).as_deref(), Some("abc"));
        assert_eq!(chain.source_of(REDDIT_CLIENT_ID), Some("second"));
        assert_eq!(chain.source_of(CLAUDE_API_KEY), None);
    }

    #[test]
    fn test_missing_reports_every_required_name() {
        let chain = CredentialChain::new(vec![Box::new(StaticProvider::defaults())]);
        assert_eq!(
            chain.missing(),
            vec![
                REDDIT_CLIENT_ID,
                REDDIT_CLIENT_SECRET,
                CLAUDE_BASE_URL,
                CLAUDE_API_KEY
            ]
        );

        match Credentials::resolve(&chain) {
            Err(CredentialError::Missing(names)) => assert_eq!(names.len(), 4),
            other => panic!("expected missing credentials, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_resolve_uses_defaults_for_optional_values() {
        let chain = CredentialChain::new(vec![
            provider(
                "file",
                &[
                    (REDDIT_CLIENT_ID, "id"),
                    (REDDIT_CLIENT_SECRET, "secret"),
                    (CLAUDE_BASE_URL, "https://llm.example"),
                    (CLAUDE_API_KEY, "key"),
                ],
            ),
            Box::new(StaticProvider::defaults()),
        ]);

        let creds = Credentials::resolve(&chain).unwrap();
        assert_eq!(creds.reddit_user_agent, DEFAULT_USER_AGENT);
        assert!(chain.get(CLAUDE_MODEL).is_none());
        assert!(creds.access_passcode.is_none());

        let debug = format!("{:?}", creds);
        assert!(!debug.contains("secret\""));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_secrets_file_parses_scalars() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "REDDIT_CLIENT_ID = \"from-file\"\nACCESS_PASSCODE = 1234\n[nested]\nkey = \"ignored\""
        )
        .unwrap();

        let provider = StaticProvider::from_secrets_file(file.path()).unwrap();
        assert_eq!(provider.get(REDDIT_CLIENT_ID).as_deref(), Some("from-file"));
        assert_eq!(provider.get(ACCESS_PASSCODE).as_deref(), Some("1234"));
        assert!(provider.get("nested").is_none());
    }

    #[test]
    fn test_missing_secrets_file_is_empty() {
        let provider =
            StaticProvider::from_secrets_file(Path::new("no/such/secrets.toml")).unwrap();
        assert!(provider.get(REDDIT_CLIENT_ID).is_none());
    }
}
