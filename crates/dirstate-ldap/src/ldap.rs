//! LDAP directory client
//!
//! Talks to a directory server through `ldap3`. The connection is opened and
//! bound on first use, then shared by every request until it fails.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, LdapResult, Mod, SearchEntry};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::dn::Dn;
use crate::entry::{AttributeSet, AttributeValues, Modification, ObservedEntry, Scope};
use crate::error::{ConfigurationError, DirectoryError};
use crate::filter::Filter;
use crate::profile::{ConnectionProfile, Credentials};
use crate::traits::DirectoryClient;

// LDAP result codes (RFC 4511)
const RC_SUCCESS: u32 = 0;
const RC_NO_SUCH_OBJECT: u32 = 32;
const RC_INVALID_CREDENTIALS: u32 = 49;
const RC_ALREADY_EXISTS: u32 = 68;
const CONSTRAINT_CODES: &[u32] = &[16, 19, 20, 65, 67, 69];

/// Directory client backed by an LDAP server
pub struct LdapClient {
    profile: ConnectionProfile,
    credentials: Option<Credentials>,
    connection: Arc<RwLock<Option<Ldap>>>,
}

impl std::fmt::Debug for LdapClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapClient")
            .field("url", &self.profile.url)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl LdapClient {
    /// Create a client for a profile
    ///
    /// No connection is made until the first request.
    ///
    /// # Errors
    /// Returns a configuration error if the profile's credentials cannot be resolved.
    pub fn new(profile: ConnectionProfile) -> Result<Self, ConfigurationError> {
        let credentials = profile.credentials()?;
        Ok(Self {
            profile,
            credentials,
            connection: Arc::new(RwLock::new(None)),
        })
    }

    /// Profile this client connects with
    #[must_use]
    pub fn profile(&self) -> &ConnectionProfile {
        &self.profile
    }

    /// Get the shared connection, opening one if necessary
    async fn connection(&self) -> Result<Ldap, DirectoryError> {
        {
            let guard = self.connection.read().await;
            if let Some(ldap) = guard.as_ref() {
                return Ok(ldap.clone());
            }
        }

        let mut guard = self.connection.write().await;
        if let Some(ldap) = guard.as_ref() {
            return Ok(ldap.clone());
        }
        let ldap = self.connect().await?;
        *guard = Some(ldap.clone());
        Ok(ldap)
    }

    async fn connect(&self) -> Result<Ldap, DirectoryError> {
        debug!(url = %self.profile.url, "connecting to directory");

        let settings = LdapConnSettings::new()
            .set_conn_timeout(self.profile.timeout())
            .set_starttls(self.profile.starttls)
            .set_no_tls_verify(!self.profile.tls_verify);

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &self.profile.url)
            .await
            .map_err(|e| {
                DirectoryError::ConnectionError(format!("{}: {e}", self.profile.url))
            })?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "directory connection driver error");
            }
        });

        if let Some(creds) = &self.credentials {
            debug!(bind_dn = %creds.bind_dn, "binding");
            let result = ldap
                .simple_bind(&creds.bind_dn, &creds.password)
                .await
                .map_err(transport_error)?;
            match result.rc {
                RC_SUCCESS => {}
                RC_INVALID_CREDENTIALS => {
                    return Err(DirectoryError::ConnectionError(format!(
                        "invalid credentials for '{}'",
                        creds.bind_dn
                    )));
                }
                _ => return Err(map_result(&creds.bind_dn, &result)),
            }
        }

        info!(url = %self.profile.url, "directory connection established");
        Ok(ldap)
    }

    /// Drop the cached connection after a transport failure
    async fn reset(&self, err: &DirectoryError) {
        if matches!(err, DirectoryError::ConnectionError(_)) {
            let mut guard = self.connection.write().await;
            if guard.take().is_some() {
                debug!("discarding failed directory connection");
            }
        }
    }

    /// Close the connection, if one is open
    pub async fn close(&self) {
        let mut guard = self.connection.write().await;
        if let Some(mut ldap) = guard.take()
            && let Err(e) = ldap.unbind().await
        {
            debug!(error = %e, "unbind failed");
        }
    }

    async fn run_search(
        &self,
        base: &Dn,
        scope: Scope,
        filter: &Filter,
        attributes: &[&str],
    ) -> Result<Vec<ObservedEntry>, DirectoryError> {
        let mut ldap = self.connection().await?;
        let ldap3::SearchResult(entries, result) = ldap
            .search(
                base.as_str(),
                to_ldap_scope(scope),
                &filter.build(),
                attributes.to_vec(),
            )
            .await
            .map_err(transport_error)?;

        if result.rc != RC_SUCCESS {
            return Err(map_result(base.as_str(), &result));
        }

        entries
            .into_iter()
            .map(|raw| to_observed(SearchEntry::construct(raw)))
            .collect()
    }

    async fn run_add(
        &self,
        dn: &Dn,
        object_classes: &[String],
        attributes: &AttributeSet,
    ) -> Result<(), DirectoryError> {
        let mut ldap = self.connection().await?;

        let mut attrs: Vec<(&str, HashSet<&str>)> = Vec::with_capacity(attributes.len() + 1);
        attrs.push((
            "objectClass",
            object_classes.iter().map(String::as_str).collect(),
        ));
        for (name, values) in attributes.iter() {
            if name.eq_ignore_ascii_case("objectClass") || values.is_empty() {
                continue;
            }
            attrs.push((name, values.iter().collect()));
        }

        let result = ldap
            .add(dn.as_str(), attrs)
            .await
            .map_err(transport_error)?;
        check(dn, &result)
    }

    async fn run_modify(
        &self,
        dn: &Dn,
        modifications: &[Modification],
    ) -> Result<(), DirectoryError> {
        let mut ldap = self.connection().await?;
        let mods: Vec<Mod<String>> = modifications.iter().map(to_ldap_mod).collect();
        let result = ldap
            .modify(dn.as_str(), mods)
            .await
            .map_err(transport_error)?;
        check(dn, &result)
    }

    async fn run_delete(&self, dn: &Dn) -> Result<(), DirectoryError> {
        let mut ldap = self.connection().await?;
        let result = ldap.delete(dn.as_str()).await.map_err(transport_error)?;
        check(dn, &result)
    }
}

#[async_trait]
impl DirectoryClient for LdapClient {
    #[instrument(skip(self, attributes), fields(base = %base, filter = %filter))]
    async fn search(
        &self,
        base: &Dn,
        scope: Scope,
        filter: &Filter,
        attributes: &[&str],
    ) -> Result<Vec<ObservedEntry>, DirectoryError> {
        let result = self.run_search(base, scope, filter, attributes).await;
        match &result {
            Ok(entries) => debug!(count = entries.len(), "search complete"),
            Err(e) => self.reset(e).await,
        }
        result
    }

    #[instrument(skip(self, object_classes, attributes), fields(dn = %dn))]
    async fn add(
        &self,
        dn: &Dn,
        object_classes: &[String],
        attributes: &AttributeSet,
    ) -> Result<(), DirectoryError> {
        let result = self.run_add(dn, object_classes, attributes).await;
        if let Err(e) = &result {
            self.reset(e).await;
        }
        result
    }

    #[instrument(skip(self, modifications), fields(dn = %dn, count = modifications.len()))]
    async fn modify(&self, dn: &Dn, modifications: &[Modification]) -> Result<(), DirectoryError> {
        let result = self.run_modify(dn, modifications).await;
        if let Err(e) = &result {
            self.reset(e).await;
        }
        result
    }

    #[instrument(skip(self), fields(dn = %dn))]
    async fn delete(&self, dn: &Dn) -> Result<(), DirectoryError> {
        let result = self.run_delete(dn).await;
        if let Err(e) = &result {
            self.reset(e).await;
        }
        result
    }

    fn client_type(&self) -> &'static str {
        "ldap"
    }
}

// ============================================================================
// Conversions
// ============================================================================

fn to_ldap_scope(scope: Scope) -> ldap3::Scope {
    match scope {
        Scope::Base => ldap3::Scope::Base,
        Scope::OneLevel => ldap3::Scope::OneLevel,
        Scope::Subtree => ldap3::Scope::Subtree,
    }
}

fn to_ldap_mod(modification: &Modification) -> Mod<String> {
    let values: HashSet<String> = modification.values().iter().map(str::to_string).collect();
    let attribute = modification.attribute().to_string();
    match modification {
        Modification::Add { .. } => Mod::Add(attribute, values),
        Modification::Replace { .. } => Mod::Replace(attribute, values),
        Modification::Delete { .. } => Mod::Delete(attribute, values),
    }
}

fn to_observed(entry: SearchEntry) -> Result<ObservedEntry, DirectoryError> {
    let dn = Dn::parse(&entry.dn).map_err(|e| DirectoryError::Other {
        code: 34,
        message: e.to_string(),
    })?;

    // Server attribute order is arbitrary; sort for stable output.
    let mut attrs: Vec<(String, Vec<String>)> = entry.attrs.into_iter().collect();
    attrs.sort_by(|a, b| a.0.to_lowercase().cmp(&b.0.to_lowercase()));

    let attributes: AttributeSet = attrs
        .into_iter()
        .map(|(name, values)| (name, AttributeValues::from(values)))
        .collect();
    Ok(ObservedEntry::new(dn, attributes))
}

fn transport_error(err: LdapError) -> DirectoryError {
    DirectoryError::ConnectionError(err.to_string())
}

fn check(dn: &Dn, result: &LdapResult) -> Result<(), DirectoryError> {
    if result.rc == RC_SUCCESS {
        Ok(())
    } else {
        Err(map_result(dn.as_str(), result))
    }
}

/// Map a non-success result code to a directory error
fn map_result(dn: &str, result: &LdapResult) -> DirectoryError {
    map_code(dn, result.rc, &result.text)
}

fn map_code(dn: &str, rc: u32, text: &str) -> DirectoryError {
    let detail = if text.is_empty() {
        dn.to_string()
    } else {
        format!("{dn}: {text}")
    };
    match rc {
        RC_NO_SUCH_OBJECT => DirectoryError::NotFound(detail),
        RC_ALREADY_EXISTS => DirectoryError::AlreadyExists(detail),
        rc if CONSTRAINT_CODES.contains(&rc) => DirectoryError::ConstraintViolation(detail),
        // busy, unavailable, unwilling to perform
        51..=53 => DirectoryError::ConnectionError(detail),
        code => DirectoryError::Other {
            code,
            message: detail,
        },
    }
}
