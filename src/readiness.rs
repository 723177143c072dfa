//! Bounded TCP readiness polling.
//!
//! The share daemon offers no status API, so liveness is detected by opening
//! a TCP connection to its control port and closing it again. Refused
//! connections are retried on a fixed cadence until a deadline elapses.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::{Instant, sleep, timeout_at};
use tracing::debug;

/// Default deadline for a readiness wait.
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(20);

/// Default interval between refused connection attempts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Future returned by [`ConnectProbe::connect`].
pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = io::Result<()>> + 'a>>;

/// Opens (and immediately closes) a connection to a TCP endpoint.
pub trait ConnectProbe {
    /// Attempts a single connection to `addr`.
    fn connect(&self, addr: SocketAddr) -> ProbeFuture<'_>;
}

/// Probe backed by a real TCP connection.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpProbe;

impl ConnectProbe for TcpProbe {
    fn connect(&self, addr: SocketAddr) -> ProbeFuture<'_> {
        Box::pin(async move {
            let stream = TcpStream::connect(addr).await?;
            drop(stream);
            Ok(())
        })
    }
}

/// Errors raised while waiting for an endpoint to accept connections.
#[derive(Debug, Error)]
pub enum ReadinessError {
    /// Raised when the endpoint never accepted a connection in time.
    #[error("{addr} did not accept connections within {} seconds", timeout.as_secs())]
    Timeout {
        /// Endpoint that was polled.
        addr: SocketAddr,
        /// Deadline that elapsed.
        timeout: Duration,
    },
    /// Raised for connection errors other than a refusal.
    #[error("unexpected error while connecting to {addr}: {source}")]
    Unexpected {
        /// Endpoint that was polled.
        addr: SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Raised when the deadline cannot be represented on the monotonic clock.
    #[error("readiness timeout of {} seconds is too large", timeout.as_secs())]
    TimeoutTooLarge {
        /// Rejected deadline.
        timeout: Duration,
    },
}

/// Polls an endpoint until it accepts a connection or a deadline elapses.
#[derive(Clone, Debug)]
pub struct ReadinessWaiter<P> {
    probe: P,
    timeout: Duration,
    poll_interval: Duration,
}

impl ReadinessWaiter<TcpProbe> {
    /// Builds a waiter over real TCP connections with default timings.
    #[must_use]
    pub const fn tcp() -> Self {
        Self::new(TcpProbe)
    }
}

impl<P: ConnectProbe> ReadinessWaiter<P> {
    /// Creates a waiter with the default 20 second deadline and 1 second
    /// poll interval.
    #[must_use]
    pub const fn new(probe: P) -> Self {
        Self {
            probe,
            timeout: DEFAULT_READINESS_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Overrides the overall deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides the fixed interval between attempts.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Returns the configured deadline.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Waits until `addr` accepts a connection.
    ///
    /// # Errors
    ///
    /// Returns [`ReadinessError::Timeout`] once the deadline elapses and
    /// [`ReadinessError::Unexpected`] for any connection error other than a
    /// refusal. A deadline too far in the future is rejected as
    /// [`ReadinessError::TimeoutTooLarge`] before any attempt is made.
    pub async fn wait(&self, addr: SocketAddr) -> Result<(), ReadinessError> {
        let deadline = Instant::now()
            .checked_add(self.timeout)
            .ok_or(ReadinessError::TimeoutTooLarge {
                timeout: self.timeout,
            })?;
        let timed_out = || ReadinessError::Timeout {
            addr,
            timeout: self.timeout,
        };

        loop {
            match timeout_at(deadline, self.probe.connect(addr)).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(err)) if err.kind() == io::ErrorKind::ConnectionRefused => {
                    debug!(%addr, "connection refused; retrying");
                }
                Ok(Err(err)) => return Err(ReadinessError::Unexpected { addr, source: err }),
                Err(_) => return Err(timed_out()),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(timed_out());
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}
