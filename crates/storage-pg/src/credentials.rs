// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use sqlx::PgPool;
use sweep_data_model::{API_KEYS, ApiKey, Record, Value};
use sweep_storage::{
    ConfigurationError, CredentialLookup, Dialect, StorageError, statement::select_one,
};

use crate::{
    DatabaseError,
    binding::{decode_row, prepare},
    ensure_array_dialect,
    telemetry::record_duration,
    tracing::ExecuteExt,
};

/// Looks up API keys by their head in the `api_keys` table
#[derive(Debug, Clone)]
pub struct PgCredentialLookup {
    pool: PgPool,
    dialect: Arc<dyn Dialect>,
}

impl PgCredentialLookup {
    /// # Errors
    ///
    /// Returns [`ConfigurationError::DialectMismatch`] if the dialect is not
    /// one this backend can speak
    pub fn new(pool: PgPool, dialect: Arc<dyn Dialect>) -> Result<Self, ConfigurationError> {
        ensure_array_dialect(dialect.as_ref())?;
        Ok(Self { pool, dialect })
    }
}

#[async_trait]
impl CredentialLookup for PgCredentialLookup {
    #[tracing::instrument(
        name = "db.api_key.lookup_by_head",
        skip_all,
        fields(db.query.text, db.system.name),
        err,
    )]
    async fn lookup_by_head(&self, head: &[u8]) -> Result<Option<ApiKey>, StorageError> {
        let statement = select_one(
            self.dialect.as_ref(),
            &API_KEYS,
            "head",
            Value::Bytes(head.to_vec()),
        )?;

        let start = Instant::now();
        let row = prepare(&statement)?
            .traced(self.dialect.kind())
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
        record_duration(start, self.dialect.kind(), "SELECT", API_KEYS.table);

        let Some(row) = row else { return Ok(None) };

        Ok(Some(ApiKey::from_values(decode_row(&API_KEYS, &row)?)?))
    }
}
