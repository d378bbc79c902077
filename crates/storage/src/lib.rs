// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! A dialect-portable, cursor-paginated bulk maintenance engine
//!
//! This crate scans large tables without offsets and applies bulk deletes or
//! upserts to the rows matching a predicate, one page at a time. It is split
//! in a few pieces:
//!
//!   - a [`Dialect`], selected once per backend, which knows how each SQL
//!     engine spells placeholders, array membership and stale reads
//!   - a [`CursorPager`], which reads the next page of rows after a cursor
//!   - a [`BatchMutator`], which applies a [`BatchWrite`] in one round trip
//!   - the [`maintenance::run`] loop, which drives the two for a
//!     [`MaintenanceTarget`]
//!
//! Backends live in their own crates. The [`memory`] module provides an
//! in-memory one, useful in tests.
//!
//! Independently, the [`ExpiringCache`] is a small lookup cache with a
//! time-to-live, LRU eviction and single-flight loading, used by the
//! [`CredentialCache`].

#![deny(clippy::future_not_send)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod credentials;
pub mod dialect;
mod error;
pub mod filter;
pub mod maintenance;
pub mod memory;
mod mutator;
mod pager;
pub mod statement;
pub mod target;
mod telemetry;

pub use self::{
    cache::ExpiringCache,
    credentials::{CredentialCache, CredentialError, CredentialLookup},
    dialect::{Dialect, DialectKind},
    error::{ConfigurationError, LogicError, MaintenanceError, Phase, StorageError},
    filter::ScanFilter,
    maintenance::{MaintenanceReport, run},
    mutator::{BatchMutator, BatchWrite, WriteKind},
    pager::{CursorPager, PageRequest},
    target::MaintenanceTarget,
};
