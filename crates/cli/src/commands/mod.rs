// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};

mod config;
mod database;
mod debug;
mod maintenance;
mod worker;

#[derive(Parser, Debug)]
enum Subcommand {
    /// Configuration-related commands
    Config(self::config::Options),

    /// Manage the database
    Database(self::database::Options),

    /// Run the maintenance jobs once
    Maintenance(self::maintenance::Options),

    /// Run the maintenance jobs periodically, until stopped
    Worker(self::worker::Options),

    /// Debug utilities
    #[clap(hide = true)]
    Debug(self::debug::Options),
}

#[derive(Parser, Debug)]
#[command(version)]
pub struct Options {
    /// Path to the configuration file
    #[arg(short, long, global = true, action = clap::ArgAction::Append)]
    config: Vec<Utf8PathBuf>,

    #[command(subcommand)]
    subcommand: Option<Subcommand>,
}

impl Options {
    pub async fn run(self, figment: &Figment) -> anyhow::Result<ExitCode> {
        use Subcommand as S;
        match self.subcommand {
            Some(S::Config(c)) => Box::pin(c.run(figment)).await,
            Some(S::Database(c)) => Box::pin(c.run(figment)).await,
            Some(S::Maintenance(c)) => Box::pin(c.run(figment)).await,
            Some(S::Debug(c)) => Box::pin(c.run(figment)).await,
            Some(S::Worker(c)) => Box::pin(c.run(figment)).await,
            None => Box::pin(self::worker::Options::default().run(figment)).await,
        }
    }

    /// Get a [`Figment`] instance with the configuration loaded
    pub fn figment(&self) -> Figment {
        let configs = if self.config.is_empty() {
            // Read the SWEEP_CONFIG environment variable
            std::env::var("SWEEP_CONFIG")
                // Default to "config.yaml"
                .unwrap_or_else(|_| "config.yaml".to_owned())
                // Split the file list on `:`
                .split(':')
                .map(Utf8PathBuf::from)
                .collect()
        } else {
            self.config.clone()
        };
        let base = Figment::new().merge(Env::prefixed("SWEEP_").split("__"));

        configs
            .into_iter()
            .fold(base, |f, path| f.admerge(Yaml::file(path)))
    }
}

#[cfg(test)]
mod tests {
    use figment::Jail;
    use indoc::indoc;
    use sweep_config::{ConfigurationSection, RootConfig};

    use super::*;

    #[test]
    fn test_config_files_are_merged() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "base.yaml",
                indoc! {r"
                    maintenance:
                      page_size: 200
                "},
            )?;
            jail.create_file(
                "override.yaml",
                indoc! {r"
                    maintenance:
                      page_size: 100
                    database:
                      dialect: cockroach
                "},
            )?;

            let options =
                Options::try_parse_from(["sweep", "-c", "base.yaml", "-c", "override.yaml"])
                    .map_err(|e| e.to_string())?;
            let config = RootConfig::extract(&options.figment()).map_err(|e| e.to_string())?;

            assert_eq!(config.maintenance.page_size, 100);
            assert_eq!(config.database.dialect.as_str(), "cockroach");

            Ok(())
        });
    }

    #[test]
    fn test_config_from_environment() {
        Jail::expect_with(|jail| {
            jail.create_file("a.yaml", "maintenance:\n  page_size: 10\n")?;
            jail.create_file("b.yaml", "cache:\n  capacity: 5\n")?;
            jail.set_env("SWEEP_CONFIG", "a.yaml:b.yaml");

            let options = Options::try_parse_from(["sweep", "config", "check"])
                .map_err(|e| e.to_string())?;
            let config = RootConfig::extract(&options.figment()).map_err(|e| e.to_string())?;

            assert_eq!(config.maintenance.page_size, 10);
            assert_eq!(config.cache.capacity, 5);

            Ok(())
        });
    }

    #[test]
    fn test_database_subcommands() {
        let options = Options::try_parse_from(["sweep", "database", "check"]).unwrap();
        assert!(matches!(options.subcommand, Some(Subcommand::Database(_))));

        let options = Options::try_parse_from(["sweep", "database", "migrate"]).unwrap();
        assert!(matches!(options.subcommand, Some(Subcommand::Database(_))));

        assert!(Options::try_parse_from(["sweep", "database"]).is_err());
    }
}
