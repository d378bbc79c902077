// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

fn main() {
    // The migrations are embedded in the crate by `sqlx::migrate!`
    println!("cargo:rerun-if-changed=migrations");
}
