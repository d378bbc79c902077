// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::{ConfigurationSection, util::field_error};

fn default_ttl() -> Duration {
    Duration::from_secs(5 * 60)
}

const fn default_capacity() -> usize {
    10_000
}

/// Configuration of the API key lookup cache
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CacheConfig {
    /// How long a looked up API key is kept, in seconds. A deleted key may
    /// still be accepted for that long. Defaults to 5 minutes.
    #[schemars(with = "u64", range(min = 1))]
    #[serde(default = "default_ttl")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub ttl: Duration,

    /// Maximum number of API keys kept in the cache. Defaults to 10000.
    #[serde(default = "default_capacity")]
    #[schemars(range(min = 1))]
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: default_ttl(),
            capacity: default_capacity(),
        }
    }
}

impl ConfigurationSection for CacheConfig {
    const PATH: Option<&'static str> = Some("cache");

    fn validate(
        &self,
        figment: &figment::Figment,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
        let path = Self::PATH.unwrap_or("cache");

        if self.ttl.is_zero() {
            return Err(field_error(figment, path, &["ttl"], "must be positive").into());
        }

        if self.capacity == 0 {
            return Err(field_error(figment, path, &["capacity"], "must be positive").into());
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

    use super::*;

    #[test]
    fn load_config() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                r"
                    cache:
                      ttl: 30
                ",
            )?;

            let figment = Figment::new().merge(Yaml::file("config.yaml"));
            let config = CacheConfig::extract(&figment).map_err(|e| e.to_string())?;

            assert_eq!(config.ttl, Duration::from_secs(30));
            assert_eq!(config.capacity, 10_000);

            Ok(())
        });
    }

    #[test]
    fn reject_zero_capacity() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                r"
                    cache:
                      capacity: 0
                ",
            )?;

            let figment = Figment::new().merge(Yaml::file("config.yaml"));
            let error = CacheConfig::extract(&figment).unwrap_err();
            let error = error.downcast::<figment::Error>().unwrap();
            assert_eq!(error.path, vec!["cache".to_owned(), "capacity".to_owned()]);

            Ok(())
        });
    }
}
