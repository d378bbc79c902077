// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::time::Duration;

use tokio::signal::unix::{Signal, SignalKind};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

/// Stops the worker on SIGTERM or SIGINT
///
/// The first signal cancels the shutdown token: the maintenance jobs
/// stop after the page they are working on, and no new round starts.
/// [`ShutdownManager::run`] then waits for everything spawned on the
/// [`TaskTracker`], unless a second signal comes or the timeout is reached, in
/// which case the remaining tasks are dropped with the runtime.
pub struct ShutdownManager {
    shutdown_token: CancellationToken,
    task_tracker: TaskTracker,
    sigterm: Signal,
    sigint: Signal,
    timeout: Duration,
}

enum Received {
    Terminate,
    Interrupt,
}

impl Received {
    fn name(&self) -> &'static str {
        match self {
            Self::Terminate => "SIGTERM",
            Self::Interrupt => "SIGINT",
        }
    }
}

impl ShutdownManager {
    /// Install the signal handlers
    ///
    /// # Errors
    ///
    /// Returns an error if the signal handlers could not be installed
    pub fn new() -> Result<Self, std::io::Error> {
        Ok(Self {
            shutdown_token: CancellationToken::new(),
            task_tracker: TaskTracker::new(),
            sigterm: tokio::signal::unix::signal(SignalKind::terminate())?,
            sigint: tokio::signal::unix::signal(SignalKind::interrupt())?,
            timeout: Duration::from_secs(60),
        })
    }

    #[must_use]
    pub fn task_tracker(&self) -> &TaskTracker {
        &self.task_tracker
    }

    /// Cancelled on the first signal
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    async fn signal(&mut self) -> Received {
        tokio::select! {
            _ = self.sigterm.recv() => Received::Terminate,
            _ = self.sigint.recv() => Received::Interrupt,
        }
    }

    /// Run until every tracked task is done
    pub async fn run(mut self) {
        let received = self.signal().await;
        tracing::info!(
            signal = received.name(),
            "Shutdown signal received, finishing the current pages"
        );

        self.shutdown_token.cancel();
        self.task_tracker.close();

        let task_tracker = self.task_tracker.clone();
        let timeout = tokio::time::sleep(self.timeout);
        tokio::select! {
            received = self.signal() => {
                tracing::warn!(signal = received.name(), "Second shutdown signal received, abort");
            },
            () = timeout => {
                tracing::warn!(pending = task_tracker.len(), "Shutdown timeout reached, abort");
            },
            () = task_tracker.wait() => {
                tracing::info!("All tasks are done, exiting");
            },
        }
    }
}
