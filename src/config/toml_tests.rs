//! Tests for TOML configuration parsing.

use super::toml::{TomlConfig, default_config_template};

mod parsing {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let toml = r#"
            [webhook]
            url = "https://n8n.example.com/webhook/chat"
        "#;

        let config = TomlConfig::parse(toml).unwrap();
        assert_eq!(
            config.webhook.url.as_deref(),
            Some("https://n8n.example.com/webhook/chat")
        );
        assert!(config.webhook.secret.is_none());
    }

    #[test]
    fn parse_full_webhook_section() {
        let toml = r#"
            [webhook]
            url = "https://n8n.example.com/webhook/chat"
            secret = "s3cret"
            timeout_ms = 15000
            client_version = "2.1.0"
        "#;

        let config = TomlConfig::parse(toml).unwrap();
        assert_eq!(config.webhook.secret.as_deref(), Some("s3cret"));
        assert_eq!(config.webhook.timeout_ms, Some(15000));
        assert_eq!(config.webhook.client_version.as_deref(), Some("2.1.0"));
    }

    #[test]
    fn parse_retry_section() {
        let toml = r"
            [retry]
            max_attempts = 5
            initial_delay_ms = 200
            max_delay_ms = 5000
            multiplier = 1.5
        ";

        let config = TomlConfig::parse(toml).unwrap();
        assert_eq!(config.retry.max_attempts, Some(5));
        assert_eq!(config.retry.initial_delay_ms, Some(200));
        assert_eq!(config.retry.max_delay_ms, Some(5000));
        assert_eq!(config.retry.multiplier, Some(1.5));
    }

    #[test]
    fn parse_breaker_health_and_monitoring_sections() {
        let toml = r#"
            [breaker]
            threshold = 3
            recovery_timeout_secs = 30

            [health]
            url = "https://n8n.example.com/healthz"
            timeout_ms = 2000
            latency_budget_ms = 500

            [monitoring]
            enabled = false
            capacity = 50
            latency_budget_ms = 800
        "#;

        let config = TomlConfig::parse(toml).unwrap();
        assert_eq!(config.breaker.threshold, Some(3));
        assert_eq!(config.breaker.recovery_timeout_secs, Some(30));
        assert_eq!(
            config.health.url.as_deref(),
            Some("https://n8n.example.com/healthz")
        );
        assert_eq!(config.health.timeout_ms, Some(2000));
        assert_eq!(config.health.latency_budget_ms, Some(500));
        assert_eq!(config.monitoring.enabled, Some(false));
        assert_eq!(config.monitoring.capacity, Some(50));
        assert_eq!(config.monitoring.latency_budget_ms, Some(800));
    }

    #[test]
    fn parse_empty_config() {
        let config = TomlConfig::parse("").unwrap();

        assert!(config.webhook.url.is_none());
        assert!(config.retry.max_attempts.is_none());
        assert!(config.breaker.threshold.is_none());
        assert!(config.health.url.is_none());
        assert!(config.monitoring.enabled.is_none());
    }

    #[test]
    fn reject_unknown_fields() {
        let toml = r#"
            [webhook]
            url = "https://example.com"
            bearer = "token"
        "#;

        assert!(TomlConfig::parse(toml).is_err());
    }

    #[test]
    fn reject_unknown_sections() {
        let toml = r"
            [filter]
            include = []
        ";

        assert!(TomlConfig::parse(toml).is_err());
    }

    #[test]
    fn reject_wrong_value_type() {
        let toml = r#"
            [retry]
            max_attempts = "three"
        "#;

        assert!(TomlConfig::parse(toml).is_err());
    }
}

mod default_template {
    use super::*;

    #[test]
    fn template_is_valid_toml() {
        let template = default_config_template();
        // Commented-out values don't matter, only the structure
        let result = TomlConfig::parse(&template);
        assert!(
            result.is_ok(),
            "Template should be valid TOML: {:?}",
            result.err()
        );
    }

    #[test]
    fn template_contains_all_sections() {
        let template = default_config_template();

        for section in ["[webhook]", "[retry]", "[breaker]", "[health]", "[monitoring]"] {
            assert!(
                template.contains(section),
                "Template should contain {section} section"
            );
        }
    }

    #[test]
    fn template_documents_url_and_secret_env() {
        let template = default_config_template();

        assert!(template.contains("url"), "Template should document url");
        assert!(
            template.contains("CHAT_WEBHOOK_SECRET"),
            "Template should mention the secret environment variable"
        );
    }

    #[test]
    fn template_leaves_url_unset() {
        let config = TomlConfig::parse(&default_config_template()).unwrap();

        assert!(config.webhook.url.is_none());
        assert_eq!(config.monitoring.enabled, Some(true));
    }
}

mod file_loading {
    use std::io::Write;
    use std::path::Path;
    use tempfile::NamedTempFile;

    use super::*;
    use crate::config::ConfigError;

    #[test]
    fn load_valid_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [webhook]
            url = "https://n8n.example.com/webhook/chat"
        "#
        )
        .unwrap();

        let config = TomlConfig::load(file.path()).unwrap();
        assert_eq!(
            config.webhook.url.as_deref(),
            Some("https://n8n.example.com/webhook/chat")
        );
    }

    #[test]
    fn load_nonexistent_file_returns_error() {
        let path = Path::new("nonexistent_config_file_12345.toml");
        let result = TomlConfig::load(path);

        assert!(matches!(result, Err(ConfigError::FileRead { .. })));
    }

    #[test]
    fn load_invalid_toml_file_returns_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "this is not valid toml {{{{").unwrap();

        let result = TomlConfig::load(file.path());

        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }
}
