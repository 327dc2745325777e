//! Single-flight token refresh and request replay
//!
//! When a request fails with an invalid access token, the coordinator runs
//! one refresh against the identity service and replays the request with
//! the new bearer token. Concurrent failures join the refresh already in
//! flight instead of starting their own, so N simultaneous 401s produce one
//! refresh call and N replays that all carry the same new token.
//!
//! State machine:
//!
//! ```text
//!   Idle ──(first invalid-token failure)──> RefreshInFlight
//!   RefreshInFlight ──(more failures)──> RefreshInFlight   (subscribe)
//!   RefreshInFlight ──(refresh settles)──> Idle            (marker cleared,
//!                                                           then subscribers
//!                                                           released)
//! ```
//!
//! The refresh runs in its own task, so a caller that gives up (timeout,
//! dropped future) does not cancel it for the others. A replay is sent at
//! most once and is never itself retried.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use serde_json::Value;
use sws_auth::{AuthHeaders, Credentials, TokenRefreshResponse, TokenUpdatedHandler};
use tokio::sync::watch;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::dispatch::{ErrorDispatcher, ErrorHandler};
use crate::error::{Failure, ServiceError};
use crate::metrics::{self, Outcome};
use crate::request::RequestDescriptor;
use crate::transport::Transport;

/// Future returned by `TokenRefresher::refresh`.
pub type RefreshFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, ServiceError>> + Send + 'a>>;

/// The identity operation that exchanges a refresh token for new tokens.
///
/// The result has already been through the identity service's own
/// dispatcher: `Ok` is either a token response or a value a custom handler
/// recovered the failed refresh into.
pub trait TokenRefresher: Send + Sync {
    fn refresh<'a>(&'a self, refresh_token: &'a str) -> RefreshFuture<'a>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    RefreshInFlight,
}

/// How a refresh attempt settled, as seen by every subscriber.
#[derive(Debug, Clone)]
enum RefreshOutcome {
    /// New tokens committed; replay with the current bearer token
    Refreshed,
    /// No token in the response; hand this value to every caller
    Recovered(Value),
    Failed(ServiceError),
}

enum Subscription {
    /// A newer token is already committed; resend without refreshing
    Replay,
    Wait(watch::Receiver<Option<RefreshOutcome>>),
}

struct InFlight {
    generation: u64,
    outcome: watch::Receiver<Option<RefreshOutcome>>,
}

/// Owns the refresh-in-flight marker and the replay protocol.
pub struct RetryCoordinator {
    credentials: Arc<Credentials>,
    headers: AuthHeaders,
    refresher: Arc<dyn TokenRefresher>,
    transport: Arc<dyn Transport>,
    updated_handler: RwLock<Option<TokenUpdatedHandler>>,
    in_flight: Mutex<Option<InFlight>>,
    generation: AtomicU64,
}

impl RetryCoordinator {
    pub fn new(
        credentials: Arc<Credentials>,
        refresher: Arc<dyn TokenRefresher>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            headers: AuthHeaders::new(credentials.clone()),
            credentials,
            refresher,
            transport,
            updated_handler: RwLock::new(None),
            in_flight: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Callback run once per committed refresh, before any replay.
    pub fn set_updated_handler(&self, handler: Option<TokenUpdatedHandler>) {
        *self
            .updated_handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = handler;
    }

    fn updated_handler(&self) -> Option<TokenUpdatedHandler> {
        self.updated_handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn state(&self) -> RefreshState {
        if self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
        {
            RefreshState::RefreshInFlight
        } else {
            RefreshState::Idle
        }
    }

    fn has_refresh_token(&self) -> bool {
        !self.credentials.refresh_token().is_empty()
    }

    /// Number of refresh attempts started so far.
    pub fn refresh_count(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }

    /// Recover `request` from an invalid-token failure by refreshing (or
    /// joining a refresh) and replaying it once.
    ///
    /// Failures of the refresh or the replay go back through `dispatcher`,
    /// so the caller's other hooks still apply.
    pub async fn recover(
        self: &Arc<Self>,
        request: RequestDescriptor,
        error: ServiceError,
        dispatcher: &ErrorDispatcher,
    ) -> Result<Value, ServiceError> {
        if !request.allows_token_retry() {
            debug!("request is not eligible for token retry");
            return Err(error);
        }
        let Some(sent_with) = request.bearer_token() else {
            return Err(error);
        };
        if !self.has_refresh_token() {
            debug!("no refresh token, cannot recover");
            return Err(error);
        }

        let mut outcome = match self.subscribe(sent_with) {
            Subscription::Wait(outcome) => outcome,
            Subscription::Replay => {
                debug!("token was refreshed after request was sent, replaying");
                return self.replay(request, dispatcher).await;
            }
        };
        let settled = outcome
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|value| (*value).clone());

        match settled {
            Some(RefreshOutcome::Refreshed) => self.replay(request, dispatcher).await,
            Some(RefreshOutcome::Recovered(value)) => Ok(value),
            Some(RefreshOutcome::Failed(refresh_error)) => {
                dispatcher
                    .dispatch(request.without_token_retry(), refresh_error)
                    .await
            }
            // Refresh task ended without publishing (panicked)
            None => Err(ServiceError::new(
                Failure::Transport("token refresh task ended without a result".into()),
                request,
                None,
            )),
        }
    }

    /// Join the refresh in flight, start one, or report that the request
    /// was sent with a token that has since been replaced.
    ///
    /// The token comparison happens under the marker lock. A refresh commits
    /// its tokens before it clears the marker, so with no refresh in flight
    /// the credentials already hold the latest committed token.
    fn subscribe(self: &Arc<Self>, sent_with: &str) -> Subscription {
        let mut slot = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(in_flight) = slot.as_ref() {
            debug!(generation = in_flight.generation, "joining token refresh in flight");
            return Subscription::Wait(in_flight.outcome.clone());
        }

        let current = self.credentials.access_token();
        if !current.is_empty() && sent_with != current {
            return Subscription::Replay;
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = watch::channel(None);
        *slot = Some(InFlight {
            generation,
            outcome: rx.clone(),
        });
        let refresh_token = self.credentials.refresh_token();
        drop(slot);

        let this = Arc::clone(self);
        tokio::spawn(
            async move {
                let guard = InFlightGuard {
                    coordinator: &this,
                    generation,
                };
                let outcome = this.run_refresh(&refresh_token).await;
                drop(guard);
                // Receivers may all be gone; nothing to deliver then.
                let _ = tx.send(Some(outcome));
            }
            .instrument(info_span!("token_refresh", generation)),
        );
        Subscription::Wait(rx)
    }

    async fn run_refresh(&self, refresh_token: &str) -> RefreshOutcome {
        debug!("refreshing access token");
        match self.refresher.refresh(refresh_token).await {
            Ok(value) => match TokenRefreshResponse::from_value(&value) {
                Some(response) => {
                    let update = self.credentials.commit_refresh(&response);
                    info!(
                        rotated_refresh = response.refresh.is_some(),
                        "access token refreshed"
                    );
                    if let Some(handler) = self.updated_handler() {
                        handler(update).await;
                    }
                    metrics::record_refresh("committed");
                    RefreshOutcome::Refreshed
                }
                None => {
                    debug!("refresh resolved without new tokens, passing value through");
                    metrics::record_refresh("recovered");
                    RefreshOutcome::Recovered(value)
                }
            },
            Err(error) => {
                warn!(error = %error, "token refresh failed");
                metrics::record_refresh("failed");
                RefreshOutcome::Failed(error)
            }
        }
    }

    /// Resend `request` once with the current bearer token.
    async fn replay(
        &self,
        request: RequestDescriptor,
        dispatcher: &ErrorDispatcher,
    ) -> Result<Value, ServiceError> {
        let replay = request
            .with_authorization(self.headers.bearer_header())
            .without_token_retry();
        match self.transport.send(&replay).await {
            Ok(value) => {
                metrics::record_replay(Outcome::Ok);
                Ok(value)
            }
            Err(error) => {
                debug!(error = %error, "replayed request failed");
                metrics::record_replay(Outcome::Failed);
                dispatcher.dispatch(replay, error).await
            }
        }
    }
}

impl fmt::Debug for RetryCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryCoordinator")
            .field("state", &self.state())
            .field("refresh_count", &self.refresh_count())
            .finish()
    }
}

/// Clears the in-flight marker when the refresh task finishes, including
/// by panic, so the next failure can start a new refresh.
struct InFlightGuard<'a> {
    coordinator: &'a RetryCoordinator,
    generation: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self
            .coordinator
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot
            .as_ref()
            .is_some_and(|in_flight| in_flight.generation == self.generation)
        {
            *slot = None;
        }
    }
}

/// Default `InvalidAccessToken` handler: refresh and replay.
///
/// Holds weak references; the coordinator and dispatcher are owned by the
/// client and its services.
pub fn retry_handler(
    coordinator: Weak<RetryCoordinator>,
    dispatcher: Weak<ErrorDispatcher>,
) -> ErrorHandler {
    Arc::new(move |request, error| {
        let coordinator = coordinator.upgrade();
        let dispatcher = dispatcher.upgrade();
        Box::pin(async move {
            match (coordinator, dispatcher) {
                (Some(coordinator), Some(dispatcher)) => {
                    coordinator.recover(request, error, &dispatcher).await
                }
                _ => Err(error),
            }
        })
    })
}

/// Default `AccessDenied` handler.
///
/// A request sent with an empty access token while a refresh token exists
/// (a restored session) is treated like an invalid access token. Any other
/// access-denied failure is re-raised.
pub fn access_denied_handler(
    coordinator: Weak<RetryCoordinator>,
    dispatcher: Weak<ErrorDispatcher>,
) -> ErrorHandler {
    let retry = retry_handler(coordinator.clone(), dispatcher);
    Arc::new(move |request, error| {
        let restored_session = request.bearer_token() == Some("")
            && coordinator.upgrade().is_some_and(|c| c.has_refresh_token());
        if restored_session {
            retry(request, error)
        } else {
            Box::pin(async move { Err(error) })
        }
    })
}
