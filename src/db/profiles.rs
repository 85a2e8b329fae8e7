//! Connection profile resolution.
//!
//! A `ProfileSet` is the ordered collection of named connection profiles
//! built from configuration. Only entries with a recognized provider are
//! retained; lookup falls back to the `"default"` profile name.

use crate::config::{ENV_DATABASES, PoolOptions, ProfileEntry, Provider};
use crate::error::{DbError, DbResult};
use tracing::debug;

/// Profile name used when the caller does not select one.
pub const DEFAULT_PROFILE_NAME: &str = "default";

/// A named connection profile. Immutable once the set is built.
#[derive(Debug, Clone)]
pub struct ConnectionProfile {
    /// Profile name, the case-sensitive lookup key.
    pub name: String,
    pub provider: Provider,
    /// Full connection URL (sensitive - not logged).
    pub connection_string: String,
    pub pool_options: PoolOptions,
}

/// Ordered collection of connection profiles, built once and read thereafter.
///
/// Names are not deduplicated; `resolve` returns the first match.
#[derive(Debug, Clone)]
pub struct ProfileSet {
    profiles: Vec<ConnectionProfile>,
}

impl ProfileSet {
    /// Build the profile set from parsed entries.
    ///
    /// An entry without a name is a configuration error. Entries whose
    /// provider is not recognized are skipped without erroring.
    pub fn from_entries(entries: Vec<ProfileEntry>) -> DbResult<Self> {
        if entries.is_empty() {
            return Err(DbError::configuration(
                "No connection profiles are configured",
            ));
        }

        let mut profiles = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(name) = entry.name else {
                return Err(DbError::configuration(
                    "Connection profile entry has no name",
                ));
            };

            let Some(provider) = entry.provider else {
                debug!(profile = %name, "Skipping profile with unrecognized provider");
                continue;
            };

            profiles.push(ConnectionProfile {
                name,
                provider,
                connection_string: entry.connection_string,
                pool_options: entry.pool_options,
            });
        }

        Ok(Self { profiles })
    }

    /// Build the profile set from the `COREKIT_DATABASES` environment
    /// variable, comma-separated `name=url` entries.
    pub fn from_env() -> DbResult<Self> {
        let raw = std::env::var(ENV_DATABASES).map_err(|_| {
            DbError::configuration(format!(
                "No connection profiles are configured ({ENV_DATABASES} is not set)"
            ))
        })?;

        let entries = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| ProfileEntry::parse(s).map_err(DbError::configuration))
            .collect::<DbResult<Vec<_>>>()?;

        Self::from_entries(entries)
    }

    /// Look up a profile by name. `None` selects the `"default"` profile.
    ///
    /// The first profile with a matching name wins.
    pub fn resolve(&self, name: Option<&str>) -> DbResult<&ConnectionProfile> {
        if self.profiles.is_empty() {
            return Err(DbError::configuration(
                "No usable connection profiles are configured",
            ));
        }

        let name = name.unwrap_or(DEFAULT_PROFILE_NAME);
        self.profiles
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| DbError::configuration(format!("No connection profile named '{name}'")))
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConnectionProfile> {
        self.profiles.iter()
    }
}
