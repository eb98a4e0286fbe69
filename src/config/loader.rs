//! Configuration loader with environment variable expansion

use super::{Config, ConfigError};
use std::path::Path;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from YAML text
    pub fn parse(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content);
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Expand `${VAR_NAME}` and `${VAR_NAME:-default}`.
    ///
    /// An unset variable without a default keeps its placeholder.
    fn expand_env_vars(content: &str) -> String {
        let re = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
            .expect("static regex");

        re.replace_all(content, |caps: &regex_lite::Captures<'_>| {
            match std::env::var(&caps[1]) {
                Ok(value) => value,
                Err(_) => match caps.get(2) {
                    Some(default) => default.as_str().to_string(),
                    None => caps[0].to_string(),
                },
            }
        })
        .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    #[serial]
    fn test_expand_env_vars() {
        std::env::set_var("BLOCKBLOB_TEST_VAR", "test_value");
        let expanded = ConfigLoader::expand_env_vars("key: ${BLOCKBLOB_TEST_VAR}");
        assert_eq!(expanded, "key: test_value");
        std::env::remove_var("BLOCKBLOB_TEST_VAR");
    }

    #[test]
    #[serial]
    fn test_expand_env_vars_default_and_missing() {
        std::env::remove_var("BLOCKBLOB_MISSING_VAR");
        assert_eq!(
            ConfigLoader::expand_env_vars("a: ${BLOCKBLOB_MISSING_VAR:-fallback}"),
            "a: fallback"
        );
        assert_eq!(
            ConfigLoader::expand_env_vars("a: ${BLOCKBLOB_MISSING_VAR}"),
            "a: ${BLOCKBLOB_MISSING_VAR}"
        );
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        std::env::set_var("BLOCKBLOB_TEST_URL", "http://localhost:10000/c/b?sig=x");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
target:
  url: "${{BLOCKBLOB_TEST_URL}}"
upload:
  chunk_size: 1048576
  workers: 8
client:
  retry:
    max_retries: 1
"#
        )
        .unwrap();

        let config = ConfigLoader::load(file.path()).unwrap();
        assert_eq!(
            config.target.url.as_deref(),
            Some("http://localhost:10000/c/b?sig=x")
        );
        assert_eq!(config.upload.chunk_size, 1048576);
        assert_eq!(config.upload.workers, 8);
        assert_eq!(config.client.retry.max_retries, 1);
        assert_eq!(config.client.retry.initial_backoff_ms, 100);
        std::env::remove_var("BLOCKBLOB_TEST_URL");
    }

    #[test]
    fn test_load_rejects_invalid() {
        let result = ConfigLoader::parse("upload:\n  workers: 0\n");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let result = ConfigLoader::load("/nonexistent/blockblob.yaml");
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }
}
