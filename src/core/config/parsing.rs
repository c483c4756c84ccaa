use std::env;

use super::types::{ConfigError, Environment};

const DEFAULT_AUTHORIZED_PARTIES: &[&str] = &["http://frontend:3000", "http://localhost:3000"];

pub(super) fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

pub(super) fn env_or_default(key: &str, default: &str) -> String {
    env_optional(key).unwrap_or_else(|| default.to_string())
}

pub(super) fn parse_u16(field: &'static str, value: String) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidValue { field, value })
}

pub(super) fn parse_u32(field: &'static str, value: String) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidValue { field, value })
}

pub(super) fn parse_u64(field: &'static str, value: String) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidValue { field, value })
}

/// Accepts a JSON array or a comma separated list. Empty input yields an empty
/// list, which the router treats as "mirror any origin".
pub(super) fn parse_cors_origins(value: Option<String>) -> Result<Vec<String>, ConfigError> {
    let Some(raw) = value else {
        return Ok(Vec::new());
    };

    if raw.trim_start().starts_with('[') {
        let parsed: Vec<String> =
            serde_json::from_str(&raw).map_err(|_| ConfigError::InvalidCors(raw.clone()))?;
        return Ok(parsed.into_iter().filter(|item| !item.trim().is_empty()).collect());
    }

    Ok(parse_string_list(Some(raw), &[]))
}

pub(super) fn parse_authorized_parties(value: Option<String>) -> Vec<String> {
    parse_string_list(value, DEFAULT_AUTHORIZED_PARTIES)
}

pub(super) fn parse_string_list(value: Option<String>, defaults: &[&str]) -> Vec<String> {
    match value {
        Some(raw) => raw
            .split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect(),
        None => defaults.iter().map(|item| item.to_string()).collect(),
    }
}

pub(super) fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON")
}

pub(super) fn parse_environment(value: Option<String>) -> Environment {
    match value.as_deref().map(|item| item.to_lowercase()) {
        Some(ref val) if val == "production" || val == "prod" => Environment::Production,
        Some(ref val) if val == "staging" => Environment::Staging,
        Some(ref val) if val == "test" || val == "testing" => Environment::Test,
        _ => Environment::Development,
    }
}

/// PEM keys in env files are often written on one line with literal `\n`.
pub(super) fn normalize_pem(value: String) -> String {
    if value.contains("\\n") {
        value.replace("\\n", "\n")
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cors_origins_json() {
        let raw = "[\"http://a\",\"http://b\"]".to_string();
        let parsed = parse_cors_origins(Some(raw)).expect("cors json");
        assert_eq!(parsed, vec!["http://a".to_string(), "http://b".to_string()]);
    }

    #[test]
    fn parse_cors_origins_csv() {
        let raw = "http://a, http://b".to_string();
        let parsed = parse_cors_origins(Some(raw)).expect("cors csv");
        assert_eq!(parsed, vec!["http://a".to_string(), "http://b".to_string()]);
    }

    #[test]
    fn parse_cors_origins_unset_means_mirror_any() {
        assert!(parse_cors_origins(None).expect("cors unset").is_empty());
    }

    #[test]
    fn parse_cors_origins_rejects_broken_json() {
        assert!(parse_cors_origins(Some("[\"http://a\"".to_string())).is_err());
    }

    #[test]
    fn authorized_parties_default_to_local_frontends() {
        assert_eq!(
            parse_authorized_parties(None),
            vec!["http://frontend:3000".to_string(), "http://localhost:3000".to_string()]
        );
        assert_eq!(
            parse_authorized_parties(Some("https://app.example".to_string())),
            vec!["https://app.example".to_string()]
        );
    }

    #[test]
    fn parse_bool_variants() {
        assert!(parse_bool("1"));
        assert!(parse_bool("true"));
        assert!(parse_bool("yes"));
        assert!(parse_bool("on"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("0"));
    }

    #[test]
    fn parse_environment_variants() {
        assert_eq!(parse_environment(Some("prod".to_string())), Environment::Production);
        assert_eq!(parse_environment(Some("staging".to_string())), Environment::Staging);
        assert_eq!(parse_environment(Some("testing".to_string())), Environment::Test);
        assert_eq!(parse_environment(None), Environment::Development);
    }

    #[test]
    fn normalize_pem_expands_escaped_newlines() {
        let raw = "-----BEGIN PUBLIC KEY-----\\nabc\\n-----END PUBLIC KEY-----".to_string();
        assert_eq!(
            normalize_pem(raw),
            "-----BEGIN PUBLIC KEY-----\nabc\n-----END PUBLIC KEY-----".to_string()
        );
    }
}
