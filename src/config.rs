use anyhow::{Context, Result};
use std::{env, net::SocketAddr, path::PathBuf};

pub const DEFAULT_BIND: &str = "127.0.0.1:3030";
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:5173";
pub const DEFAULT_UPSTREAM_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_UPSTREAM_MODEL: &str = "llama-3.1-8b-instant";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub cors_origin: String,
    pub api_key: Option<String>,
    pub upstream_url: String,
    pub upstream_model: String,
    pub catalog_path: Option<PathBuf>,
}

impl ServerConfig {
    pub fn from_env() -> Result<ServerConfig> {
        ServerConfig::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<ServerConfig> {
        let bind = lookup("BIND").unwrap_or_else(|| DEFAULT_BIND.into());
        let bind: SocketAddr = bind
            .parse()
            .with_context(|| format!("invalid BIND address `{}`", bind))?;

        Ok(ServerConfig {
            bind,
            cors_origin: lookup("CORS_ORIGIN").unwrap_or_else(|| DEFAULT_CORS_ORIGIN.into()),
            api_key: lookup("GROQ_API_KEY").filter(|key| !key.trim().is_empty()),
            upstream_url: lookup("UPSTREAM_URL").unwrap_or_else(|| DEFAULT_UPSTREAM_URL.into()),
            upstream_model: lookup("UPSTREAM_MODEL")
                .unwrap_or_else(|| DEFAULT_UPSTREAM_MODEL.into()),
            catalog_path: lookup("QUIZ_CATALOG").map(PathBuf::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();

        assert_eq!(config.bind, DEFAULT_BIND.parse().unwrap());
        assert_eq!(config.cors_origin, DEFAULT_CORS_ORIGIN);
        assert_eq!(config.api_key, None);
        assert_eq!(config.upstream_model, DEFAULT_UPSTREAM_MODEL);
        assert_eq!(config.catalog_path, None);
    }

    #[test]
    fn overrides() {
        let config = config(&[
            ("BIND", "0.0.0.0:8080"),
            ("GROQ_API_KEY", "gsk_test"),
            ("QUIZ_CATALOG", "/etc/quiz.toml"),
        ])
        .unwrap();

        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.api_key.as_deref(), Some("gsk_test"));
        assert_eq!(config.catalog_path, Some(PathBuf::from("/etc/quiz.toml")));
    }

    #[test]
    fn blank_key_is_missing() {
        assert_eq!(config(&[("GROQ_API_KEY", "")]).unwrap().api_key, None);
    }

    #[test]
    fn bad_bind_address() {
        assert!(config(&[("BIND", "localhost")]).is_err());
    }
}
