//! Process runner for long-lived workers with graceful shutdown.
//!
//! Named app processes run concurrently until one fails, all finish, or
//! SIGINT/SIGTERM arrives. Closers then run one after another, in reverse
//! registration order, under a shared timeout.
//!
//! # Example
//!
//! ```no_run
//! use iot_runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     Runner::new()
//!         .with_app_process(|ctx| async move {
//!             ctx.cancelled().await;
//!             Ok(())
//!         })
//!         .with_closer(|| async move {
//!             tracing::info!("flushing");
//!             Ok(())
//!         })
//!         .with_closer_timeout(Duration::from_secs(5))
//!         .run()
//!         .await;
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type BoxedResultFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// A long-running process. Receives a token that is cancelled on shutdown.
pub type AppProcess = Box<dyn FnOnce(CancellationToken) -> BoxedResultFuture + Send>;

/// Cleanup run after every app process has stopped.
pub type Closer = Box<dyn FnOnce() -> BoxedResultFuture + Send>;

struct NamedProcess {
    name: String,
    process: AppProcess,
}

pub struct Runner {
    app_processes: Vec<NamedProcess>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    cancellation_token: CancellationToken,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Closer timeout defaults to 10 seconds.
    pub fn new() -> Self {
        Self {
            app_processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn with_app_process<F, Fut>(self, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = format!("process-{}", self.app_processes.len() + 1);
        self.with_named_process(name, Box::new(|token| Box::pin(process(token))))
    }

    /// Register an already boxed process under a name used in logs.
    pub fn with_named_process(mut self, name: impl Into<String>, process: AppProcess) -> Self {
        self.app_processes.push(NamedProcess {
            name: name.into(),
            process,
        });
        self
    }

    /// Closers run after all processes stop, whatever the outcome, last
    /// registered first. A failing closer does not stop the rest.
    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Use an externally owned token, e.g. to stop the runner from a test.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Run until stopped, then exit the process: status 1 if any app process
    /// failed, 0 otherwise.
    pub async fn run(self) {
        match self.run_until_stopped().await {
            Some(err) => {
                error!("application exiting with error: {:#}", err);
                std::process::exit(1);
            }
            None => {
                info!("application exiting normally");
                std::process::exit(0);
            }
        }
    }

    /// Run all processes and closers. Returns the first process error, if any.
    pub async fn run_until_stopped(self) -> Option<anyhow::Error> {
        let token = self.cancellation_token;
        spawn_signal_handlers(token.clone());

        let mut join_set = JoinSet::new();
        for NamedProcess { name, process } in self.app_processes {
            let process_token = token.clone();
            join_set.spawn(async move {
                info!(process = %name, "app process starting");
                let result = process(process_token).await;
                (name, result)
            });
        }

        let mut first_error = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, Ok(()))) => {
                    debug!(process = %name, "app process completed");
                }
                Ok((name, Err(err))) => {
                    error!(process = %name, "app process failed: {:#}", err);
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                    token.cancel();
                }
                Err(err) => {
                    error!("app process panicked: {}", err);
                    token.cancel();
                }
            }
        }

        // an app process may finish without the token being cancelled
        token.cancel();

        run_closers(self.closers, self.closer_timeout).await;
        first_error
    }
}

fn spawn_signal_handlers(token: CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = ctrl_c_token.cancelled() => {}
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => {
                    info!("received shutdown signal");
                    ctrl_c_token.cancel();
                }
                Err(err) => error!("error setting up signal handler: {}", err),
            },
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(err) => {
                error!("error setting up SIGTERM handler: {}", err);
                return;
            }
        };
        tokio::select! {
            _ = token.cancelled() => {}
            _ = sigterm.recv() => {
                info!("received SIGTERM signal");
                token.cancel();
            }
        }
    });
}

/// Each closer runs exactly once, last registered first.
async fn run_closers(closers: Vec<Closer>, timeout: Duration) {
    if closers.is_empty() {
        return;
    }
    info!("running {} closers with timeout of {:?}", closers.len(), timeout);

    let sequence = async move {
        for closer in closers.into_iter().rev() {
            if let Err(err) = closer().await {
                error!("closer error: {:#}", err);
            }
        }
    };

    match tokio::time::timeout(timeout, sequence).await {
        Ok(()) => info!("all closers completed"),
        Err(_) => warn!("closers timed out after {:?}", timeout),
    }
}
