//! Configuration validation

use launchpad_auth::CredentialType;
use launchpad_stores::rate_limit::MIN_REFILL_RATE;
use launchpad_stores::StoreKind;
use tracing::debug;

use crate::error::{ConfigError, Result};

use super::types::{Config, StoreEntry};

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating configuration");
    validate_dispatch(config)?;
    validate_stores(config)?;
    validate_rate_limits(config)?;
    validate_base_urls(config)?;
    debug!("configuration validation passed");
    Ok(())
}

fn known_store(field: &str, id: &str) -> Result<StoreKind> {
    StoreKind::from_id(id).ok_or_else(|| {
        let known: Vec<&str> = StoreKind::ALL.iter().map(|k| k.id()).collect();
        ConfigError::invalid(field, format!("unknown store, expected one of: {}", known.join(", ")))
            .into()
    })
}

fn validate_dispatch(config: &Config) -> Result<()> {
    if config.dispatch.max_retries > 0 && config.dispatch.base_delay_ms == 0 {
        return Err(ConfigError::invalid(
            "dispatch.base_delay_ms",
            "must be greater than 0 when retries are enabled",
        )
        .into());
    }

    if config.dispatch.request_timeout_secs == Some(0) {
        return Err(
            ConfigError::invalid("dispatch.request_timeout_secs", "must be greater than 0").into(),
        );
    }

    Ok(())
}

fn validate_stores(config: &Config) -> Result<()> {
    if !config.stores.is_empty() {
        debug!(count = config.stores.len(), "validating stores");
    }

    for (id, entry) in &config.stores {
        let field = format!("stores.{}", id);
        let kind = known_store(&field, id)?;

        if entry.credentials_file.is_some() {
            if entry.credential_type.is_some() {
                return Err(ConfigError::invalid(
                    &field,
                    "set either credentials_file or an inline type, not both",
                )
                .into());
            }
            continue;
        }

        let credential_type = entry
            .credential_type
            .ok_or_else(|| ConfigError::MissingField(format!("{}.type", field)))?;

        let expected = kind.auth_method().credential_type();
        if credential_type != expected {
            return Err(ConfigError::invalid(
                format!("{}.type", field),
                format!("{} requires {} credentials", kind.display_name(), expected),
            )
            .into());
        }

        for key in required_keys(credential_type, entry) {
            if !entry.config.get(*key).is_some_and(|v| !v.is_empty()) {
                return Err(ConfigError::MissingField(format!("{}.config.{}", field, key)).into());
            }
        }
        if needs_key_material(credential_type, entry) {
            return Err(ConfigError::invalid(
                &field,
                "requires file_path or config.private_key",
            )
            .into());
        }
    }

    Ok(())
}

/// Config keys an inline descriptor must carry
fn required_keys(credential_type: CredentialType, entry: &StoreEntry) -> &'static [&'static str] {
    match credential_type {
        CredentialType::ApiKey => &["api_key"],
        CredentialType::Hmac => &["secret"],
        CredentialType::Jwt => &["key_id", "issuer_id"],
        CredentialType::Rsa => &[],
        CredentialType::OAuth2 if entry.config.contains_key("client_id") => {
            &["client_id", "client_secret", "token_url"]
        }
        CredentialType::OAuth2 if entry.file_path.is_none() => &["client_email"],
        CredentialType::OAuth2 => &[],
    }
}

fn needs_key_material(credential_type: CredentialType, entry: &StoreEntry) -> bool {
    let signs_locally = match credential_type {
        CredentialType::Jwt | CredentialType::Rsa => true,
        CredentialType::OAuth2 => !entry.config.contains_key("client_id"),
        CredentialType::ApiKey | CredentialType::Hmac => false,
    };
    signs_locally && entry.file_path.is_none() && !entry.config.contains_key("private_key")
}

fn validate_rate_limits(config: &Config) -> Result<()> {
    for (id, limit) in &config.rate_limits {
        let field = format!("rate_limits.{}", id);
        known_store(&field, id)?;

        if !(limit.capacity.is_finite() && limit.capacity >= 1.0) {
            return Err(
                ConfigError::invalid(format!("{}.capacity", field), "must be at least 1").into(),
            );
        }
        if !(limit.refill_rate.is_finite() && limit.refill_rate >= MIN_REFILL_RATE) {
            return Err(ConfigError::invalid(
                format!("{}.refill_rate", field),
                format!("must be at least {}", MIN_REFILL_RATE),
            )
            .into());
        }
    }

    Ok(())
}

fn validate_base_urls(config: &Config) -> Result<()> {
    for (id, url) in &config.base_urls {
        let field = format!("base_urls.{}", id);
        known_store(&field, id)?;

        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(ConfigError::invalid(field, "must be an http(s) URL").into());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CoreError;
    use launchpad_stores::RateLimitConfig;

    fn config_with(id: &str, entry: StoreEntry) -> Config {
        let mut config = Config::default();
        config.stores.insert(id.to_string(), entry);
        config
    }

    fn invalid_field(result: Result<()>) -> String {
        match result {
            Err(CoreError::Config(ConfigError::InvalidValue { field, .. })) => field,
            Err(CoreError::Config(ConfigError::MissingField(field))) => field,
            other => panic!("expected a field error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_unknown_store_is_rejected() {
        let config = config_with("itch", StoreEntry::new(CredentialType::ApiKey).with("api_key", "k"));
        assert_eq!(invalid_field(validate_config(&config)), "stores.itch");
    }

    #[test]
    fn test_credential_family_must_match_store() {
        let config = config_with("vivo", StoreEntry::new(CredentialType::ApiKey).with("api_key", "k"));
        assert_eq!(invalid_field(validate_config(&config)), "stores.vivo.type");
    }

    #[test]
    fn test_required_keys_per_family() {
        let config = config_with("firebase", StoreEntry::new(CredentialType::ApiKey));
        assert_eq!(
            invalid_field(validate_config(&config)),
            "stores.firebase.config.api_key"
        );

        let config = config_with(
            "microsoft",
            StoreEntry::new(CredentialType::OAuth2)
                .with("client_id", "id")
                .with("client_secret", "secret"),
        );
        assert_eq!(
            invalid_field(validate_config(&config)),
            "stores.microsoft.config.token_url"
        );

        let config = config_with(
            "apple",
            StoreEntry::new(CredentialType::Jwt)
                .with("key_id", "K")
                .with("issuer_id", "I"),
        );
        assert_eq!(invalid_field(validate_config(&config)), "stores.apple");
    }

    #[test]
    fn test_valid_inline_and_file_entries() {
        let mut config = Config::default();
        let mut play = StoreEntry::new(CredentialType::OAuth2);
        play.file_path = Some("keys/play.json".into());
        config.stores.insert("google-play".to_string(), play);
        config.stores.insert(
            "vivo".to_string(),
            StoreEntry::new(CredentialType::Hmac)
                .with("secret", "s")
                .with("access_key", "ak"),
        );
        config
            .stores
            .insert("huawei".to_string(), StoreEntry::from_file("keys/agc.json"));

        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_credentials_file_excludes_inline_type() {
        let mut entry = StoreEntry::from_file("keys/agc.json");
        entry.credential_type = Some(CredentialType::OAuth2);
        let config = config_with("huawei", entry);
        assert_eq!(invalid_field(validate_config(&config)), "stores.huawei");
    }

    #[test]
    fn test_rate_limits_must_be_positive() {
        let mut config = Config::default();
        config
            .rate_limits
            .insert("xiaomi".to_string(), RateLimitConfig::new(5.0, 0.0));
        assert_eq!(
            invalid_field(validate_config(&config)),
            "rate_limits.xiaomi.refill_rate"
        );

        config
            .rate_limits
            .insert("xiaomi".to_string(), RateLimitConfig::new(5.0, 1e-20));
        assert_eq!(
            invalid_field(validate_config(&config)),
            "rate_limits.xiaomi.refill_rate"
        );

        config
            .rate_limits
            .insert("xiaomi".to_string(), RateLimitConfig::new(0.0, 1.0));
        assert_eq!(
            invalid_field(validate_config(&config)),
            "rate_limits.xiaomi.capacity"
        );
    }

    #[test]
    fn test_base_url_must_be_http() {
        let mut config = Config::default();
        config
            .base_urls
            .insert("apple".to_string(), "localhost:9000".to_string());
        assert_eq!(invalid_field(validate_config(&config)), "base_urls.apple");
    }

    #[test]
    fn test_retry_delay_required_with_retries() {
        let mut config = Config::default();
        config.dispatch.base_delay_ms = 0;
        assert_eq!(
            invalid_field(validate_config(&config)),
            "dispatch.base_delay_ms"
        );

        config.dispatch.max_retries = 0;
        assert!(validate_config(&config).is_ok());
    }
}
