//! Default configuration values

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "launchpad.toml";

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "launchpad.yaml";

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "LAUNCHPAD_CONFIG";

/// Get list of config file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_TOML,
        DEFAULT_CONFIG_YAML,
        "launchpad.yml",
        ".launchpad.toml",
        ".launchpad.yaml",
    ]
}

/// Default configuration template
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Launchpad Configuration
#
# Values of the form "${VAR}" are read from the environment.

[dispatch]
max_retries = 3
base_delay_ms = 1000
# request_timeout_secs = 60

# [stores.apple]
# type = "jwt"
# file_path = "keys/AuthKey_ABC123.p8"
# config = { key_id = "ABC123", issuer_id = "${APP_STORE_ISSUER_ID}" }

# [stores.google-play]
# type = "oauth2"
# file_path = "keys/play-service-account.json"

# [stores.microsoft]
# type = "oauth2"
# config = { token_url = "https://login.microsoftonline.com/<tenant>/oauth2/token", client_id = "...", client_secret = "${MS_CLIENT_SECRET}", resource = "https://manage.devcenter.microsoft.com" }

# [stores.huawei]
# type = "oauth2"
# config = { token_url = "https://connect-api.cloud.huawei.com/api/oauth2/v1/token", client_id = "...", client_secret = "${AGC_CLIENT_SECRET}" }

# [stores.xiaomi]
# type = "rsa"
# file_path = "keys/xiaomi.pem"
# config = { user_name = "dev@example.com" }

# [stores.vivo]
# type = "hmac"
# config = { access_key = "...", secret = "${VIVO_SECRET}" }

# [stores.firebase]
# type = "apikey"
# config = { api_key = "${FIREBASE_API_KEY}" }

# [rate_limits.google-play]
# capacity = 50
# refill_rate = 3

# [base_urls]
# google-play = "http://localhost:8080"
"#;
