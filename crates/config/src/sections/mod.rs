// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

mod cache;
mod database;
mod maintenance;
mod telemetry;

pub use self::{
    cache::CacheConfig,
    database::{DatabaseConfig, DatabaseDialect},
    maintenance::{
        ApiKeysCleanupConfig, MaintenanceConfig, UsersCleanupConfig, WebappSessionsCleanupConfig,
    },
    telemetry::TelemetryConfig,
};
use crate::util::ConfigurationSection;

/// Application configuration root
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct RootConfig {
    /// Database connection configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Configuration of the maintenance jobs
    #[serde(default)]
    pub maintenance: MaintenanceConfig,

    /// Configuration of the API key lookup cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Configuration related to logging
    #[serde(default, skip_serializing_if = "TelemetryConfig::is_default")]
    pub telemetry: TelemetryConfig,
}

impl ConfigurationSection for RootConfig {
    fn validate(
        &self,
        figment: &figment::Figment,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
        self.database.validate(figment)?;
        self.maintenance.validate(figment)?;
        self.cache.validate(figment)?;
        self.telemetry.validate(figment)?;

        Ok(())
    }
}
