//! Connection profiles
//!
//! A profile is a small TOML file naming the server, the base DN and how to
//! bind. Profiles are looked up by name in the profile directories, or read
//! from an explicit path.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dn::Dn;
use crate::error::ConfigurationError;

/// Connection details for one directory
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionProfile {
    /// Server URL (`ldap://` or `ldaps://`)
    pub url: String,
    /// Base DN of the managed tree
    pub base_dn: String,
    /// Bind DN; anonymous bind when absent
    #[serde(default)]
    pub bind_dn: Option<String>,
    /// Bind password
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Environment variable holding the bind password
    #[serde(default)]
    pub password_env: Option<String>,
    /// Upgrade a plain connection with STARTTLS
    #[serde(default)]
    pub starttls: bool,
    /// Verify the server certificate
    #[serde(default = "default_tls_verify")]
    pub tls_verify: bool,
    /// Connect timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Where host groups live (default `cn=hostgroups,<base_dn>`)
    #[serde(default)]
    pub hostgroup_base_dn: Option<String>,
    /// Where host entries live (default `cn=computers,<base_dn>`)
    #[serde(default)]
    pub host_base_dn: Option<String>,
}

fn default_tls_verify() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    10
}

impl std::fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("url", &self.url)
            .field("base_dn", &self.base_dn)
            .field("bind_dn", &self.bind_dn)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("password_env", &self.password_env)
            .field("starttls", &self.starttls)
            .field("tls_verify", &self.tls_verify)
            .field("timeout_secs", &self.timeout_secs)
            .finish_non_exhaustive()
    }
}

/// Resolved bind credentials
#[derive(Clone)]
pub struct Credentials {
    /// Bind DN
    pub bind_dn: String,
    /// Bind password
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("bind_dn", &self.bind_dn)
            .finish_non_exhaustive()
    }
}

impl ConnectionProfile {
    /// Create a profile for an anonymous connection
    pub fn new(url: impl Into<String>, base_dn: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            base_dn: base_dn.into(),
            bind_dn: None,
            password: None,
            password_env: None,
            starttls: false,
            tls_verify: true,
            timeout_secs: default_timeout_secs(),
            hostgroup_base_dn: None,
            host_base_dn: None,
        }
    }

    /// Set bind DN and password
    #[must_use]
    pub fn with_bind(mut self, bind_dn: impl Into<String>, password: impl Into<String>) -> Self {
        self.bind_dn = Some(bind_dn.into());
        self.password = Some(password.into());
        self
    }

    /// Parse a profile from TOML text
    ///
    /// # Errors
    /// Returns `InvalidProfile` if the text is not a valid profile.
    pub fn from_toml(name: &str, content: &str) -> Result<Self, ConfigurationError> {
        let profile: ConnectionProfile =
            toml::from_str(content).map_err(|e| ConfigurationError::InvalidProfile {
                profile: name.to_string(),
                reason: e.to_string(),
            })?;
        profile.validate(name)?;
        Ok(profile)
    }

    /// Load a profile by name or path
    ///
    /// Anything that names an existing file is read directly. Otherwise
    /// `<name>.toml` is looked up in `$DIRSTATE_PROFILE_DIR`, `./profiles`,
    /// `/etc/dirstate/profiles` and the user config directory, in that order.
    ///
    /// # Errors
    /// Returns `InvalidProfile` if no profile is found or it cannot be parsed.
    pub fn load(name_or_path: &str) -> Result<Self, ConfigurationError> {
        let direct = Path::new(name_or_path);
        if direct.is_file() {
            return Self::load_file(name_or_path, direct);
        }

        for dir in profile_dirs() {
            let candidate = dir.join(format!("{name_or_path}.toml"));
            if candidate.is_file() {
                return Self::load_file(name_or_path, &candidate);
            }
        }

        Err(ConfigurationError::InvalidProfile {
            profile: name_or_path.to_string(),
            reason: "profile not found".to_string(),
        })
    }

    fn load_file(name: &str, path: &Path) -> Result<Self, ConfigurationError> {
        debug!(profile = %name, path = %path.display(), "loading connection profile");
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigurationError::InvalidProfile {
                profile: name.to_string(),
                reason: e.to_string(),
            })?;
        Self::from_toml(name, &content)
    }

    fn validate(&self, name: &str) -> Result<(), ConfigurationError> {
        if !(self.url.starts_with("ldap://") || self.url.starts_with("ldaps://")) {
            return Err(ConfigurationError::InvalidProfile {
                profile: name.to_string(),
                reason: format!("unsupported url '{}'", self.url),
            });
        }
        if self.starttls && self.url.starts_with("ldaps://") {
            return Err(ConfigurationError::InvalidProfile {
                profile: name.to_string(),
                reason: "starttls cannot be combined with ldaps://".to_string(),
            });
        }
        self.base()?;
        self.hostgroup_base()?;
        self.host_base()?;
        Ok(())
    }

    /// Parsed base DN
    ///
    /// # Errors
    /// Returns `MalformedDn` if `base_dn` does not parse.
    pub fn base(&self) -> Result<Dn, ConfigurationError> {
        Dn::parse(&self.base_dn)
    }

    /// Host group container, `cn=hostgroups,<base_dn>` unless configured
    ///
    /// # Errors
    /// Returns `MalformedDn` if the configured or derived DN does not parse.
    pub fn hostgroup_base(&self) -> Result<Dn, ConfigurationError> {
        match &self.hostgroup_base_dn {
            Some(dn) => Dn::parse(dn),
            None => Ok(self.base()?.child("cn", "hostgroups")),
        }
    }

    /// Host container, `cn=computers,<base_dn>` unless configured
    ///
    /// # Errors
    /// Returns `MalformedDn` if the configured or derived DN does not parse.
    pub fn host_base(&self) -> Result<Dn, ConfigurationError> {
        match &self.host_base_dn {
            Some(dn) => Dn::parse(dn),
            None => Ok(self.base()?.child("cn", "computers")),
        }
    }

    /// Connect timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Resolve bind credentials
    ///
    /// Returns `None` for an anonymous bind. The password comes from
    /// `password`, or from the variable named by `password_env`.
    ///
    /// # Errors
    /// Returns `InvalidProfile` if a bind DN is set but no password can be found.
    pub fn credentials(&self) -> Result<Option<Credentials>, ConfigurationError> {
        let Some(bind_dn) = &self.bind_dn else {
            return Ok(None);
        };

        let password = match (&self.password, &self.password_env) {
            (Some(password), _) => password.clone(),
            (None, Some(var)) => env::var(var).map_err(|_| ConfigurationError::InvalidProfile {
                profile: self.url.clone(),
                reason: format!("environment variable {var} not set"),
            })?,
            (None, None) => {
                return Err(ConfigurationError::InvalidProfile {
                    profile: self.url.clone(),
                    reason: format!("no password for bind DN '{bind_dn}'"),
                });
            }
        };

        Ok(Some(Credentials {
            bind_dn: bind_dn.clone(),
            password,
        }))
    }
}

/// Directories searched for named profiles
fn profile_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Ok(dir) = env::var("DIRSTATE_PROFILE_DIR") {
        dirs.push(PathBuf::from(dir));
    }
    dirs.push(PathBuf::from("profiles"));
    dirs.push(PathBuf::from("/etc/dirstate/profiles"));
    if let Some(config) = dirs::config_dir() {
        dirs.push(config.join("dirstate/profiles"));
    }
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: &str = r#"
url = "ldaps://ipa.example.com"
base_dn = "cn=accounts,dc=example,dc=com"
bind_dn = "uid=admin,cn=users,cn=accounts,dc=example,dc=com"
password = "secret"
"#;

    #[test]
    fn test_parse_profile_with_defaults() {
        let profile = ConnectionProfile::from_toml("default", PROFILE).unwrap();

        assert_eq!(profile.timeout(), Duration::from_secs(10));
        assert!(profile.tls_verify);
        assert_eq!(
            profile.hostgroup_base().unwrap().as_str(),
            "cn=hostgroups,cn=accounts,dc=example,dc=com"
        );
        assert_eq!(
            profile.host_base().unwrap().as_str(),
            "cn=computers,cn=accounts,dc=example,dc=com"
        );
    }

    #[test]
    fn test_credentials() {
        let profile = ConnectionProfile::from_toml("default", PROFILE).unwrap();
        let creds = profile.credentials().unwrap().unwrap();

        assert_eq!(creds.password, "secret");
        assert!(!format!("{creds:?}").contains("secret"));
        assert!(!format!("{profile:?}").contains("secret"));
    }

    #[test]
    fn test_anonymous_profile_has_no_credentials() {
        let profile = ConnectionProfile::new("ldap://localhost", "dc=example,dc=com");
        assert!(profile.credentials().unwrap().is_none());
    }

    #[test]
    fn test_missing_password_env() {
        let mut profile = ConnectionProfile::new("ldap://localhost", "dc=example,dc=com");
        profile.bind_dn = Some("cn=admin,dc=example,dc=com".to_string());
        profile.password_env = Some("DIRSTATE_TEST_PASSWORD_THAT_IS_NOT_SET".to_string());

        assert!(profile.credentials().is_err());
    }

    #[test]
    fn test_rejects_bad_url_and_dn() {
        let bad_url = "url = \"http://x\"\nbase_dn = \"dc=example\"";
        assert!(ConnectionProfile::from_toml("x", bad_url).is_err());

        let bad_dn = "url = \"ldap://x\"\nbase_dn = \"example\"";
        assert!(ConnectionProfile::from_toml("x", bad_dn).is_err());
    }

    #[test]
    fn test_load_missing_profile() {
        let err = ConnectionProfile::load("no-such-profile-anywhere").unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidProfile { .. }));
    }
}
