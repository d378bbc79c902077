// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::time::Duration as StdDuration;

use chrono::Duration;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::{ConfigurationSection, util::field_error};

const fn default_page_size() -> usize {
    1000
}

fn default_interval() -> StdDuration {
    StdDuration::from_secs(60 * 60)
}

const fn default_true() -> bool {
    true
}

fn default_api_key_prefix() -> String {
    "trial-".to_owned()
}

fn default_api_key_lifetime() -> Duration {
    Duration::days(30)
}

fn default_unverified_ttl() -> Duration {
    Duration::days(7)
}

/// How far back a cleanup cutoff may reach
fn max_cutoff_age() -> Duration {
    Duration::days(100 * 365)
}

/// Cleanup of API keys which outlived their lifetime
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ApiKeysCleanupConfig {
    /// Whether this cleanup runs
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Only the API keys with a name starting with this prefix are deleted
    #[serde(default = "default_api_key_prefix")]
    pub name_prefix: String,

    /// How long after their creation the API keys are deleted, in seconds.
    /// Defaults to 30 days.
    #[schemars(with = "u64", range(min = 1))]
    #[serde(default = "default_api_key_lifetime")]
    #[serde_as(as = "serde_with::DurationSeconds<i64>")]
    pub lifetime: Duration,
}

impl Default for ApiKeysCleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name_prefix: default_api_key_prefix(),
            lifetime: default_api_key_lifetime(),
        }
    }
}

/// Cleanup of expired webapp sessions
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct WebappSessionsCleanupConfig {
    /// Whether this cleanup runs
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for WebappSessionsCleanupConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Cleanup of users who never verified their account
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct UsersCleanupConfig {
    /// Whether this cleanup runs
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// How long after signing up an unverified user is deleted, in seconds.
    /// Defaults to 7 days.
    #[schemars(with = "u64", range(min = 1))]
    #[serde(default = "default_unverified_ttl")]
    #[serde_as(as = "serde_with::DurationSeconds<i64>")]
    pub unverified_ttl: Duration,
}

impl Default for UsersCleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            unverified_ttl: default_unverified_ttl(),
        }
    }
}

/// Configuration of the maintenance jobs
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MaintenanceConfig {
    /// Number of rows read in each page. Defaults to 1000.
    #[serde(default = "default_page_size")]
    #[schemars(range(min = 1))]
    pub page_size: usize,

    /// How old the data read by the scans may be, in seconds. Only CockroachDB
    /// and Spanner make use of it. Scans read the latest data if not set.
    #[schemars(with = "Option<u64>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde_as(as = "Option<serde_with::DurationSeconds<u64>>")]
    pub staleness: Option<StdDuration>,

    /// Time between two rounds of maintenance in the worker, in seconds.
    /// Defaults to one hour.
    #[schemars(with = "u64", range(min = 1))]
    #[serde(default = "default_interval")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub interval: StdDuration,

    /// Cleanup of expired API keys
    #[serde(default)]
    pub api_keys: ApiKeysCleanupConfig,

    /// Cleanup of expired webapp sessions
    #[serde(default)]
    pub webapp_sessions: WebappSessionsCleanupConfig,

    /// Cleanup of unverified users
    #[serde(default)]
    pub users: UsersCleanupConfig,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            staleness: None,
            interval: default_interval(),
            api_keys: ApiKeysCleanupConfig::default(),
            webapp_sessions: WebappSessionsCleanupConfig::default(),
            users: UsersCleanupConfig::default(),
        }
    }
}

impl ConfigurationSection for MaintenanceConfig {
    const PATH: Option<&'static str> = Some("maintenance");

    fn validate(
        &self,
        figment: &figment::Figment,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
        let path = Self::PATH.unwrap_or("maintenance");

        if self.page_size == 0 {
            return Err(field_error(figment, path, &["page_size"], "must be positive").into());
        }

        if self.interval.is_zero() {
            return Err(field_error(figment, path, &["interval"], "must be positive").into());
        }

        if self.api_keys.enabled {
            if self.api_keys.name_prefix.is_empty() {
                return Err(field_error(
                    figment,
                    path,
                    &["api_keys", "name_prefix"],
                    "must not be empty, or every API key would be deleted",
                )
                .into());
            }

            if self.api_keys.lifetime <= Duration::zero() {
                return Err(field_error(
                    figment,
                    path,
                    &["api_keys", "lifetime"],
                    "must be positive",
                )
                .into());
            }

            if self.api_keys.lifetime > max_cutoff_age() {
                return Err(field_error(
                    figment,
                    path,
                    &["api_keys", "lifetime"],
                    "must be at most 100 years",
                )
                .into());
            }
        }

        if self.users.enabled && self.users.unverified_ttl <= Duration::zero() {
            return Err(field_error(
                figment,
                path,
                &["users", "unverified_ttl"],
                "must be positive",
            )
            .into());
        }

        if self.users.enabled && self.users.unverified_ttl > max_cutoff_age() {
            return Err(field_error(
                figment,
                path,
                &["users", "unverified_ttl"],
                "must be at most 100 years",
            )
            .into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use figment::{
        Figment, Jail,
        providers::{Format, Yaml},
    };
    use indoc::indoc;

    use super::*;
    use crate::ConfigurationSectionExt;

    #[test]
    fn load_config() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                indoc! {r"
                    maintenance:
                      page_size: 500
                      staleness: 15
                      interval: 600
                      api_keys:
                        name_prefix: demo-
                        lifetime: 86400
                      webapp_sessions:
                        enabled: false
                "},
            )?;

            let figment = Figment::new().merge(Yaml::file("config.yaml"));
            let config = MaintenanceConfig::extract(&figment).map_err(|e| e.to_string())?;

            assert_eq!(config.page_size, 500);
            assert_eq!(config.staleness, Some(StdDuration::from_secs(15)));
            assert_eq!(config.interval, StdDuration::from_secs(600));
            assert_eq!(config.api_keys.name_prefix, "demo-");
            assert_eq!(config.api_keys.lifetime, Duration::days(1));
            assert!(config.api_keys.enabled);
            assert!(!config.webapp_sessions.enabled);
            assert_eq!(config.users, UsersCleanupConfig::default());

            Ok(())
        });
    }

    #[test]
    fn load_defaults() {
        Jail::expect_with(|_jail| {
            let figment = Figment::new();
            let config =
                MaintenanceConfig::extract_or_default(&figment).map_err(|e| e.to_string())?;
            assert_eq!(config, MaintenanceConfig::default());
            assert_eq!(config.page_size, 1000);
            assert_eq!(config.staleness, None);

            Ok(())
        });
    }

    #[test]
    fn reject_zero_page_size() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                indoc! {r"
                    maintenance:
                      page_size: 0
                "},
            )?;

            let figment = Figment::new().merge(Yaml::file("config.yaml"));
            let error = MaintenanceConfig::extract(&figment).unwrap_err();
            let error = error.downcast::<figment::Error>().unwrap();
            assert_eq!(
                error.path,
                vec!["maintenance".to_owned(), "page_size".to_owned()]
            );

            Ok(())
        });
    }

    #[test]
    fn reject_empty_api_key_prefix() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                indoc! {r#"
                    maintenance:
                      api_keys:
                        name_prefix: ""
                "#},
            )?;

            let figment = Figment::new().merge(Yaml::file("config.yaml"));
            let error = MaintenanceConfig::extract(&figment).unwrap_err();
            let error = error.downcast::<figment::Error>().unwrap();
            assert_eq!(
                error.path,
                vec![
                    "maintenance".to_owned(),
                    "api_keys".to_owned(),
                    "name_prefix".to_owned()
                ]
            );

            Ok(())
        });
    }

    #[test]
    fn reject_out_of_range_durations() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                indoc! {r"
                    maintenance:
                      api_keys:
                        lifetime: 9000000000000
                "},
            )?;

            let figment = Figment::new().merge(Yaml::file("config.yaml"));
            let error = MaintenanceConfig::extract(&figment).unwrap_err();
            let error = error.downcast::<figment::Error>().unwrap();
            assert_eq!(
                error.path,
                vec![
                    "maintenance".to_owned(),
                    "api_keys".to_owned(),
                    "lifetime".to_owned()
                ]
            );

            jail.create_file(
                "config.yaml",
                indoc! {r"
                    maintenance:
                      users:
                        unverified_ttl: 9000000000000
                "},
            )?;

            let figment = Figment::new().merge(Yaml::file("config.yaml"));
            let error = MaintenanceConfig::extract(&figment).unwrap_err();
            let error = error.downcast::<figment::Error>().unwrap();
            assert_eq!(
                error.path,
                vec![
                    "maintenance".to_owned(),
                    "users".to_owned(),
                    "unverified_ttl".to_owned()
                ]
            );

            // A disabled target is not checked
            jail.create_file(
                "config.yaml",
                indoc! {r"
                    maintenance:
                      users:
                        enabled: false
                        unverified_ttl: 9000000000000
                "},
            )?;

            let figment = Figment::new().merge(Yaml::file("config.yaml"));
            assert!(MaintenanceConfig::extract(&figment).is_ok());

            Ok(())
        });
    }
}
