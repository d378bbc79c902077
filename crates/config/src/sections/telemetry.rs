// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::{ConfigurationSection, util::field_error};

fn log_filter_example() -> &'static str {
    "info,sweep_storage_pg=debug"
}

/// Configuration related to logging
#[skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TelemetryConfig {
    /// Which events are logged, in the `RUST_LOG` syntax. The `RUST_LOG`
    /// environment variable takes precedence over this.
    ///
    /// Defaults to `info` if not set.
    #[schemars(example = "log_filter_example")]
    pub log_filter: Option<String>,
}

impl TelemetryConfig {
    /// Returns true if all fields are at their default values
    pub(crate) fn is_default(&self) -> bool {
        self == &Self::default()
    }
}

impl ConfigurationSection for TelemetryConfig {
    const PATH: Option<&'static str> = Some("telemetry");

    fn validate(
        &self,
        figment: &figment::Figment,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
        if self
            .log_filter
            .as_deref()
            .is_some_and(|filter| filter.trim().is_empty())
        {
            return Err(field_error(
                figment,
                Self::PATH.unwrap_or("telemetry"),
                &["log_filter"],
                "must not be empty",
            )
            .into());
        }

        Ok(())
    }
}
