// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use figment::Figment;
use serde::de::{DeserializeOwned, Error as _};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A part of the configuration file, loaded and validated on its own
pub trait ConfigurationSection: Sized + DeserializeOwned {
    /// Where the section lives in the configuration file, `None` for the root
    const PATH: Option<&'static str> = None;

    /// Check the values which can't be checked while deserializing
    ///
    /// # Errors
    ///
    /// Returns an error if the section is invalid
    fn validate(&self, _figment: &Figment) -> Result<(), BoxError> {
        Ok(())
    }

    /// Load and validate the section
    ///
    /// # Errors
    ///
    /// Returns an error if the section is missing, can't be deserialized or
    /// is invalid
    fn extract(figment: &Figment) -> Result<Self, BoxError> {
        let this: Self = match Self::PATH {
            Some(path) => figment.extract_inner(path)?,
            None => figment.extract()?,
        };

        this.validate(figment)?;
        Ok(this)
    }
}

/// Loading of sections which all have a default value
pub trait ConfigurationSectionExt: ConfigurationSection + Default {
    /// Like [`ConfigurationSection::extract`], but falls back to the default
    /// value when the section is absent from the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the section is present but invalid
    fn extract_or_default(figment: &Figment) -> Result<Self, BoxError> {
        match Self::PATH {
            Some(path) if !figment.contains(path) => Ok(Self::default()),
            _ => Self::extract(figment),
        }
    }
}

impl<T: ConfigurationSection + Default> ConfigurationSectionExt for T {}

/// Build an error pointing at a field of a section, so that it shows where
/// the value came from
pub(crate) fn field_error(
    figment: &Figment,
    section: &str,
    field: &[&str],
    message: impl std::fmt::Display,
) -> figment::Error {
    let mut error = figment::Error::custom(message);
    error.metadata = figment.find_metadata(section).cloned();
    error.profile = Some(figment::Profile::Default);
    error.path = std::iter::once(section)
        .chain(field.iter().copied())
        .map(ToOwned::to_owned)
        .collect();
    error
}
