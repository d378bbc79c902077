// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::{num::NonZeroU32, time::Duration};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::{ConfigurationSection, util::field_error};

#[allow(clippy::unnecessary_wraps)]
fn default_connection_uri() -> Option<String> {
    Some("postgresql://".to_owned())
}

fn default_max_connections() -> NonZeroU32 {
    NonZeroU32::new(10).unwrap_or(NonZeroU32::MIN)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

#[allow(clippy::unnecessary_wraps)]
fn default_idle_timeout() -> Option<Duration> {
    Some(Duration::from_secs(10 * 60))
}

#[allow(clippy::unnecessary_wraps)]
fn default_max_lifetime() -> Option<Duration> {
    Some(Duration::from_secs(30 * 60))
}

/// The SQL engine behind the database
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDialect {
    /// PostgreSQL
    #[default]
    #[serde(alias = "postgresql")]
    Postgres,

    /// CockroachDB, which allows scanning with stale reads
    #[serde(alias = "cockroachdb")]
    Cockroach,

    /// Google Cloud Spanner
    Spanner,
}

impl DatabaseDialect {
    /// The name of the dialect, as understood by the storage layer
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Cockroach => "cockroach",
            Self::Spanner => "spanner",
        }
    }
}

/// Database connection configuration
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DatabaseConfig {
    /// The SQL engine to talk to
    #[serde(default)]
    pub dialect: DatabaseDialect,

    /// Connection URI
    ///
    /// For Spanner, this is the path of the database, like
    /// `projects/<project>/instances/<instance>/databases/<database>`
    #[serde(default = "default_connection_uri")]
    #[schemars(url, default = "default_connection_uri")]
    pub uri: Option<String>,

    /// Set the maximum number of connections the pool should maintain
    #[serde(default = "default_max_connections")]
    #[schemars(with = "u32", range(min = 1))]
    pub max_connections: NonZeroU32,

    /// Set the minimum number of connections the pool should maintain
    #[serde(default)]
    pub min_connections: u32,

    /// Set the amount of time to attempt connecting to the database
    #[schemars(with = "u64")]
    #[serde(default = "default_connect_timeout")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub connect_timeout: Duration,

    /// Set a maximum idle duration for individual connections
    #[schemars(with = "Option<u64>")]
    #[serde(default = "default_idle_timeout")]
    #[serde_as(as = "Option<serde_with::DurationSeconds<u64>>")]
    pub idle_timeout: Option<Duration>,

    /// Set the maximum lifetime of individual connections
    #[schemars(with = "Option<u64>")]
    #[serde(default = "default_max_lifetime")]
    #[serde_as(as = "Option<serde_with::DurationSeconds<u64>>")]
    pub max_lifetime: Option<Duration>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dialect: DatabaseDialect::default(),
            uri: default_connection_uri(),
            max_connections: default_max_connections(),
            min_connections: Default::default(),
            connect_timeout: default_connect_timeout(),
            idle_timeout: default_idle_timeout(),
            max_lifetime: default_max_lifetime(),
        }
    }
}

impl ConfigurationSection for DatabaseConfig {
    const PATH: Option<&'static str> = Some("database");

    fn validate(
        &self,
        figment: &figment::Figment,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
        let path = Self::PATH.unwrap_or("database");

        if self.uri.as_deref().is_none_or(str::is_empty) {
            return Err(field_error(figment, path, &["uri"], "a connection URI is required").into());
        }

        if self.min_connections > self.max_connections.get() {
            return Err(field_error(
                figment,
                path,
                &["min_connections"],
                "min_connections must not be greater than max_connections",
            )
            .into());
        }

        Ok(())
    }
}
