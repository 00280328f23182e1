//! Application settings read from the container environment.
//!
//! The coordinator itself only needs the database URL and the `DEBUG` toggle
//! ([`BootstrapSettings`]). The full [`Settings`] describe what the web
//! application consumes and are validated up front by `check-config` so a
//! misconfigured container fails before it starts serving.

use poi_registry_common::FieldCipher;
use std::env;
use std::path::PathBuf;
use url::Url;

pub const DEBUG: &str = "DEBUG";
pub const UPLOAD_DIR: &str = "UPLOAD_DIR";
pub const PUBLIC_URL: &str = "PUBLIC_URL";
pub const SECRET_KEY: &str = "SECRET_KEY";
pub const ACCESS_TOKEN_EXPIRE_MIN: &str = "ACCESS_TOKEN_EXPIRE_MIN";
pub const POSTGRES_DATABASE_URL: &str = "POSTGRES_DATABASE_URL";
pub const ENCRYPTION_KEY: &str = "ENCRYPTION_KEY";

/// Shortest accepted signing key.
const MIN_SECRET_KEY_LEN: usize = 32;
/// Longest accepted token lifetime: 30 days.
const MAX_TOKEN_EXPIRE_MIN: u32 = 30 * 24 * 60;

/// Error type for settings loading.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

fn invalid(name: &'static str, reason: impl Into<String>) -> SettingsError {
    SettingsError::Invalid {
        name,
        reason: reason.into(),
    }
}

/// Parse a boolean toggle. Unset or empty reads as false.
pub fn parse_flag(name: &'static str, value: Option<&str>) -> Result<bool, SettingsError> {
    let Some(raw) = value.map(str::trim) else {
        return Ok(false);
    };
    match raw.to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" | "off" => Ok(false),
        "1" | "true" | "yes" | "on" => Ok(true),
        other => Err(invalid(name, format!("expected a boolean, got `{other}`"))),
    }
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, SettingsError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .filter(|v| !v.trim().is_empty())
        .ok_or(SettingsError::Missing(name))
}

/// What the coordinator needs to run.
#[derive(Debug, Clone)]
pub struct BootstrapSettings {
    pub debug: bool,
    pub database_url: String,
}

impl BootstrapSettings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            debug: parse_flag(DEBUG, lookup(DEBUG).as_deref())?,
            database_url: required(&lookup, POSTGRES_DATABASE_URL)?,
        })
    }
}

/// Everything the application service is configured with.
#[derive(Debug, Clone)]
pub struct Settings {
    pub debug: bool,
    pub upload_dir: PathBuf,
    pub public_url: Url,
    pub secret_key: String,
    pub access_token_expire_min: u32,
    pub database_url: String,
    pub encryption_key: Option<String>,
}

impl Settings {
    /// Load and validate settings from the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load and validate settings from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bootstrap = BootstrapSettings::from_lookup(&lookup)?;

        let public_url = required(&lookup, PUBLIC_URL)?;
        let public_url = Url::parse(&public_url).map_err(|e| invalid(PUBLIC_URL, e.to_string()))?;

        let expire = required(&lookup, ACCESS_TOKEN_EXPIRE_MIN)?;
        let access_token_expire_min = expire
            .trim()
            .parse::<u32>()
            .map_err(|e| invalid(ACCESS_TOKEN_EXPIRE_MIN, e.to_string()))?;

        let settings = Self {
            debug: bootstrap.debug,
            upload_dir: PathBuf::from(required(&lookup, UPLOAD_DIR)?),
            public_url,
            secret_key: required(&lookup, SECRET_KEY)?,
            access_token_expire_min,
            database_url: bootstrap.database_url,
            encryption_key: lookup(ENCRYPTION_KEY).filter(|v| !v.trim().is_empty()),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Check values against the rules the application relies on.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !matches!(self.public_url.scheme(), "http" | "https") {
            return Err(invalid(PUBLIC_URL, "must be an http or https URL"));
        }

        if self.secret_key.len() < MIN_SECRET_KEY_LEN {
            return Err(invalid(
                SECRET_KEY,
                format!("must be at least {MIN_SECRET_KEY_LEN} characters long"),
            ));
        }

        if !(1..=MAX_TOKEN_EXPIRE_MIN).contains(&self.access_token_expire_min) {
            return Err(invalid(
                ACCESS_TOKEN_EXPIRE_MIN,
                format!("must be between 1 and {MAX_TOKEN_EXPIRE_MIN}"),
            ));
        }

        crate::endpoint::DbEndpoint::from_database_url(&self.database_url)?;

        if let Some(key) = &self.encryption_key {
            FieldCipher::from_base64_key(key).map_err(|e| invalid(ENCRYPTION_KEY, e.to_string()))?;
        }

        Ok(())
    }

    /// Settings as `(name, value)` pairs with secrets masked.
    pub fn redacted(&self) -> Vec<(&'static str, String)> {
        let endpoint = crate::endpoint::DbEndpoint::from_database_url(&self.database_url)
            .map(|e| e.to_string())
            .unwrap_or_else(|_| "<invalid>".to_string());

        vec![
            (DEBUG, self.debug.to_string()),
            (UPLOAD_DIR, self.upload_dir.display().to_string()),
            (PUBLIC_URL, self.public_url.to_string()),
            (SECRET_KEY, "<redacted>".to_string()),
            (ACCESS_TOKEN_EXPIRE_MIN, self.access_token_expire_min.to_string()),
            (POSTGRES_DATABASE_URL, endpoint),
            (
                ENCRYPTION_KEY,
                if self.encryption_key.is_some() { "<redacted>" } else { "<unset>" }.to_string(),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn complete() -> HashMap<String, String> {
        vars(&[
            (DEBUG, "true"),
            (UPLOAD_DIR, "/app/uploads"),
            (PUBLIC_URL, "http://localhost:8000"),
            (SECRET_KEY, "0123456789abcdef0123456789abcdef"),
            (ACCESS_TOKEN_EXPIRE_MIN, "60"),
            (POSTGRES_DATABASE_URL, "postgresql://poi:poi@db:5432/poi"),
        ])
    }

    fn load(vars: &HashMap<String, String>) -> Result<Settings, SettingsError> {
        Settings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn complete_environment_loads() {
        let settings = load(&complete()).unwrap();
        assert!(settings.debug);
        assert_eq!(settings.access_token_expire_min, 60);
        assert_eq!(settings.upload_dir, PathBuf::from("/app/uploads"));
        assert!(settings.encryption_key.is_none());
    }

    #[test]
    fn missing_database_url_is_reported_by_name() {
        let mut env = complete();
        env.remove(POSTGRES_DATABASE_URL);
        let err = load(&env).unwrap_err();
        assert_eq!(err.to_string(), "POSTGRES_DATABASE_URL must be set");
    }

    #[test]
    fn short_secret_key_is_rejected() {
        let mut env = complete();
        env.insert(SECRET_KEY.into(), "too-short".into());
        assert!(matches!(
            load(&env),
            Err(SettingsError::Invalid { name: SECRET_KEY, .. })
        ));
    }

    #[test]
    fn token_lifetime_must_be_positive_and_bounded() {
        let mut env = complete();
        env.insert(ACCESS_TOKEN_EXPIRE_MIN.into(), "0".into());
        assert!(load(&env).is_err());

        env.insert(ACCESS_TOKEN_EXPIRE_MIN.into(), "forever".into());
        assert!(load(&env).is_err());

        env.insert(ACCESS_TOKEN_EXPIRE_MIN.into(), "43200".into());
        assert!(load(&env).is_ok());
    }

    #[test]
    fn public_url_must_be_http() {
        let mut env = complete();
        env.insert(PUBLIC_URL.into(), "ftp://files.example.com".into());
        assert!(load(&env).is_err());
    }

    #[test]
    fn encryption_key_is_checked_when_present() {
        let mut env = complete();
        env.insert(ENCRYPTION_KEY.into(), "c2hvcnQ=".into());
        assert!(matches!(
            load(&env),
            Err(SettingsError::Invalid { name: ENCRYPTION_KEY, .. })
        ));

        env.insert(ENCRYPTION_KEY.into(), FieldCipher::generate_key());
        assert!(load(&env).unwrap().encryption_key.is_some());
    }

    #[test]
    fn fernet_keys_with_url_safe_characters_are_accepted() {
        let mut env = complete();
        env.insert(
            ENCRYPTION_KEY.into(),
            "q-Jh0x_3s1xkV8bWq4n0m7zZr5yT2uL6pA9eC1dF-g8=".into(),
        );
        assert!(load(&env).is_ok());
    }

    #[test]
    fn redacted_summary_hides_secrets() {
        let mut env = complete();
        env.insert(ENCRYPTION_KEY.into(), FieldCipher::generate_key());
        let summary = load(&env).unwrap().redacted();

        let rendered: HashMap<_, _> = summary.into_iter().collect();
        assert_eq!(rendered[SECRET_KEY], "<redacted>");
        assert_eq!(rendered[ENCRYPTION_KEY], "<redacted>");
        assert_eq!(rendered[POSTGRES_DATABASE_URL], "db:5432");
    }

    #[test]
    fn flags_accept_common_spellings() {
        assert!(parse_flag(DEBUG, Some("1")).unwrap());
        assert!(parse_flag(DEBUG, Some("True")).unwrap());
        assert!(!parse_flag(DEBUG, Some("off")).unwrap());
        assert!(!parse_flag(DEBUG, None).unwrap());
        assert!(parse_flag(DEBUG, Some("maybe")).is_err());
    }

    #[test]
    fn bootstrap_settings_need_only_the_database() {
        let env = vars(&[(POSTGRES_DATABASE_URL, "postgresql://db/poi")]);
        let settings = BootstrapSettings::from_lookup(|name| env.get(name).cloned()).unwrap();
        assert!(!settings.debug);
        assert_eq!(settings.database_url, "postgresql://db/poi");
    }
}
