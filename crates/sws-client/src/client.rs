//! `SwsClient`: credential state, lazy service clients and handler wiring
//!
//! Every service gets two default handlers when it is constructed:
//!
//! - `InvalidAccessToken` refreshes the token and replays the request
//! - `AccessDenied` does the same for a request sent before any access token
//!   existed (restored session), and re-raises otherwise
//!
//! Handlers set through the client are broadcast to every constructed
//! service and remembered for services constructed later. Replacing the
//! `InvalidAccessToken` handler opts the services out of automatic retry
//! until `restore_default_handler` is called.
//!
//! One client per logical session: two clients sharing a refresh token run
//! independent refresh cycles and can invalidate each other's tokens.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use sws_auth::{
    Credentials, Session, SessionStore, TokenUpdate, TokenUpdatedHandler, token_updated_handler,
};
use tracing::{debug, info};

use crate::config::{ClientConfig, EndpointConfig};
use crate::dispatch::{ErrorHandler, Hook};
use crate::error::Result;
use crate::identity::IdentityService;
use crate::retry::{RefreshState, RetryCoordinator, access_denied_handler, retry_handler};
use crate::service::{Service, ServiceKind};
use crate::transport::{HttpTransport, Transport};

pub struct SwsClient {
    endpoints: EndpointConfig,
    credentials: Arc<Credentials>,
    transport: Arc<dyn Transport>,
    coordinator: Arc<RetryCoordinator>,
    identity: Arc<IdentityService>,
    services: Mutex<HashMap<ServiceKind, Arc<Service>>>,
    broadcast: RwLock<HashMap<Hook, ErrorHandler>>,
    session_store: RwLock<Option<SessionStore>>,
    updated_handler: RwLock<Option<TokenUpdatedHandler>>,
}

impl SwsClient {
    /// Build a client with the reqwest transport configured from `[http]`.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport =
            HttpTransport::new(config.http.timeout(), config.http.connect_timeout())?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Build a client on top of a caller-supplied transport.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let ClientConfig { app, endpoints, .. } = config;

        let credentials = Arc::new(Credentials::new(app.id, app.secret));
        let identity_service = Arc::new(Service::new(
            ServiceKind::Identity,
            endpoints.base_url_for(ServiceKind::Identity),
            transport.clone(),
            credentials.clone(),
        ));
        let identity = Arc::new(IdentityService::new(identity_service.clone()));
        let coordinator = Arc::new(RetryCoordinator::new(
            credentials.clone(),
            identity.clone(),
            transport.clone(),
        ));

        let client = Self {
            endpoints,
            credentials,
            transport,
            coordinator,
            identity,
            services: Mutex::new(HashMap::new()),
            broadcast: RwLock::new(HashMap::new()),
            session_store: RwLock::new(None),
            updated_handler: RwLock::new(None),
        };
        client.install_defaults(&identity_service);
        client
            .lock_services()
            .insert(ServiceKind::Identity, identity_service);
        Ok(client)
    }

    /// Build a client and, when `[session] file` is set, restore and persist
    /// the session through it.
    pub async fn from_config(mut config: ClientConfig) -> Result<Self> {
        let session_file = config.session.file.take();
        let client = Self::new(config)?;
        if let Some(path) = session_file {
            client.attach_session_store(SessionStore::new(path)).await?;
        }
        Ok(client)
    }

    /// Load the config file (explicit path, `SWS_CONFIG_PATH`, or
    /// `sws-client.toml`) and build a client from it.
    pub async fn load(path: Option<&str>) -> Result<Self> {
        let path = ClientConfig::resolve_path(path);
        let config = ClientConfig::load(Path::new(&path))?;
        Self::from_config(config).await
    }

    /// Restore tokens from `store` if it holds a session, and write every
    /// refreshed token pair back to it. Returns whether a session was restored.
    pub async fn attach_session_store(&self, store: SessionStore) -> Result<bool> {
        let restored = match store.load().await? {
            Some(session) => {
                self.credentials.restore(&session);
                info!(path = %store.path().display(), "session restored");
                true
            }
            None => false,
        };
        *self
            .session_store
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(store);
        self.sync_updated_handler();
        Ok(restored)
    }

    // -- services -----------------------------------------------------------

    pub fn identity(&self) -> Arc<IdentityService> {
        self.identity.clone()
    }

    pub fn licensing(&self) -> Arc<Service> {
        self.service(ServiceKind::Licensing)
    }

    pub fn commerce(&self) -> Arc<Service> {
        self.service(ServiceKind::Commerce)
    }

    pub fn profile(&self) -> Arc<Service> {
        self.service(ServiceKind::Profile)
    }

    pub fn notifications(&self) -> Arc<Service> {
        self.service(ServiceKind::Notifications)
    }

    pub fn rewards(&self) -> Arc<Service> {
        self.service(ServiceKind::Rewards)
    }

    pub fn assets(&self) -> Arc<Service> {
        self.service(ServiceKind::Assets)
    }

    /// The client for `kind`, constructed on first use with the default
    /// handlers and every broadcast handler installed.
    pub fn service(&self, kind: ServiceKind) -> Arc<Service> {
        let mut services = self.lock_services();
        if let Some(service) = services.get(&kind) {
            return service.clone();
        }

        debug!(service = kind.name(), "constructing service client");
        let service = Arc::new(Service::new(
            kind,
            self.endpoints.base_url_for(kind),
            self.transport.clone(),
            self.credentials.clone(),
        ));
        self.install_defaults(&service);
        services.insert(kind, service.clone());
        service
    }

    fn lock_services(&self) -> MutexGuard<'_, HashMap<ServiceKind, Arc<Service>>> {
        self.services.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Default wiring for `hook` on `service`, if the hook has one.
    fn default_handler(&self, hook: Hook, service: &Service) -> Option<ErrorHandler> {
        let coordinator = Arc::downgrade(&self.coordinator);
        let dispatcher = Arc::downgrade(service.dispatcher());
        match hook {
            Hook::InvalidAccessToken => Some(retry_handler(coordinator, dispatcher)),
            Hook::AccessDenied => Some(access_denied_handler(coordinator, dispatcher)),
            _ => None,
        }
    }

    fn install_defaults(&self, service: &Service) {
        for hook in Hook::ALL {
            if let Some(handler) = self.default_handler(hook, service) {
                service.set_handler(hook, handler);
            }
        }
        let broadcast = self.broadcast.read().unwrap_or_else(PoisonError::into_inner);
        for (hook, handler) in broadcast.iter() {
            service.set_handler(*hook, handler.clone());
        }
    }

    // -- credentials ----------------------------------------------------------

    pub fn access_token(&self) -> String {
        self.credentials.access_token()
    }

    pub fn set_access_token(&self, token: impl Into<String>) {
        self.credentials.set_access_token(token);
    }

    pub fn refresh_token(&self) -> String {
        self.credentials.refresh_token()
    }

    pub fn set_refresh_token(&self, token: impl Into<String>) {
        self.credentials.set_refresh_token(token);
    }

    pub fn user_id(&self) -> u64 {
        self.credentials.user_id()
    }

    pub fn set_user_id(&self, user_id: u64) {
        self.credentials.set_user_id(user_id);
    }

    pub fn session(&self) -> Session {
        self.credentials.session()
    }

    pub fn restore_session(&self, session: &Session) {
        self.credentials.restore(session);
    }

    pub fn refresh_state(&self) -> RefreshState {
        self.coordinator.state()
    }

    // -- handlers -------------------------------------------------------------

    /// Set `handler` for `hook` on every service, present and future.
    pub fn set_handler(&self, hook: Hook, handler: ErrorHandler) {
        let services = self.lock_services();
        self.broadcast
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(hook, handler.clone());
        for service in services.values() {
            service.set_handler(hook, handler.clone());
        }
        debug!(%hook, services = services.len(), "handler broadcast");
    }

    /// Undo `set_handler` for `hook`: the default wiring (retry for the two
    /// token hooks, re-raise for the rest) applies again on every service.
    pub fn restore_default_handler(&self, hook: Hook) {
        let services = self.lock_services();
        self.broadcast
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&hook);
        for service in services.values() {
            match self.default_handler(hook, service) {
                Some(handler) => service.set_handler(hook, handler),
                None => service.clear_handler(hook),
            }
        }
    }

    /// Replaces automatic token retry on every service.
    pub fn set_invalid_access_token_handler(&self, handler: ErrorHandler) {
        self.set_handler(Hook::InvalidAccessToken, handler);
    }

    pub fn set_invalid_refresh_token_handler(&self, handler: ErrorHandler) {
        self.set_handler(Hook::InvalidRefreshToken, handler);
    }

    pub fn set_password_reentry_required_handler(&self, handler: ErrorHandler) {
        self.set_handler(Hook::PasswordReEntryRequired, handler);
    }

    pub fn set_timeout_exceeded_handler(&self, handler: ErrorHandler) {
        self.set_handler(Hook::TimeoutExceeded, handler);
    }

    pub fn set_service_error_handler(&self, handler: ErrorHandler) {
        self.set_handler(Hook::ServiceError, handler);
    }

    pub fn set_service_unavailable_handler(&self, handler: ErrorHandler) {
        self.set_handler(Hook::ServiceUnavailable, handler);
    }

    /// Callback run once per successful refresh, after the new tokens are
    /// committed and before any request is replayed. Runs after the session
    /// store write when one is attached.
    pub fn set_access_token_updated_handler(&self, handler: Option<TokenUpdatedHandler>) {
        *self
            .updated_handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = handler;
        self.sync_updated_handler();
    }

    fn sync_updated_handler(&self) {
        let store = self
            .session_store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(SessionStore::updated_handler);
        let user = self
            .updated_handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let combined = match (store, user) {
            (Some(store), Some(user)) => Some(token_updated_handler(move |update: TokenUpdate| {
                let store = store.clone();
                let user = user.clone();
                async move {
                    store(update.clone()).await;
                    user(update).await;
                }
            })),
            (store, user) => store.or(user),
        };
        self.coordinator.set_updated_handler(combined);
    }
}

impl fmt::Debug for SwsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut services: Vec<ServiceKind> = self.lock_services().keys().copied().collect();
        services.sort();
        f.debug_struct("SwsClient")
            .field("credentials", &self.credentials)
            .field("coordinator", &self.coordinator)
            .field("services", &services)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::handler;
    use crate::error::{Failure, ServiceError};
    use crate::request::RequestDescriptor;
    use crate::testing::ScriptedTransport;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use sws_auth::{TOKEN_PATH, codes};

    type Answer = std::result::Result<Value, ServiceError>;

    fn is_refresh(request: &RequestDescriptor) -> bool {
        request.url().ends_with(TOKEN_PATH)
    }

    fn status(request: &RequestDescriptor, status: u16, code: Option<i64>) -> Answer {
        let body = code
            .map(|c| format!(r#"{{"code":{c}}}"#))
            .unwrap_or_default();
        Err(ServiceError::from_status(request.clone(), status, body))
    }

    fn refresh_ok(_: &RequestDescriptor) -> Answer {
        Ok(json!({
            "access": {"token": "at_new", "expires_at": 1_700_000_000},
            "refresh": {"token": "rt_new", "expires_at": 1_800_000_000},
        }))
    }

    fn accept_new_token(request: &RequestDescriptor) -> Answer {
        if request.bearer_token() == Some("at_new") {
            Ok(json!({"url": request.url()}))
        } else {
            status(request, 401, Some(codes::ACCESS_TOKEN_EXPIRED))
        }
    }

    /// Token endpoint answers after 50ms; everything else answers at once.
    fn api(
        refresh: impl Fn(&RequestDescriptor) -> Answer + Send + Sync + 'static,
        call: impl Fn(&RequestDescriptor) -> Answer + Send + Sync + 'static,
    ) -> Arc<ScriptedTransport> {
        ScriptedTransport::with_delay(
            move |request| {
                if is_refresh(request) {
                    refresh(request)
                } else {
                    call(request)
                }
            },
            |request| {
                if is_refresh(request) {
                    Duration::from_millis(50)
                } else {
                    Duration::ZERO
                }
            },
        )
    }

    fn client(transport: Arc<ScriptedTransport>) -> Arc<SwsClient> {
        let config = ClientConfig::new("app", "secret", "https://sws.test");
        let client = SwsClient::with_transport(config, transport).unwrap();
        client.set_access_token("at_old");
        client.set_refresh_token("rt_old");
        Arc::new(client)
    }

    fn api_calls(transport: &ScriptedTransport) -> usize {
        transport.count(|r| !is_refresh(r))
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_invalid_tokens_trigger_one_refresh() {
        let transport = api(refresh_ok, accept_new_token);
        let client = client(transport.clone());
        let updates = Arc::new(AtomicUsize::new(0));
        let seen = updates.clone();
        client.set_access_token_updated_handler(Some(token_updated_handler(move |update| {
            let seen = seen.clone();
            async move {
                assert_eq!(update.refresh_token, "rt_new");
                seen.fetch_add(1, Ordering::SeqCst);
            }
        })));

        let mut tasks = tokio::task::JoinSet::new();
        for (i, kind) in [
            ServiceKind::Licensing,
            ServiceKind::Profile,
            ServiceKind::Commerce,
            ServiceKind::Profile,
            ServiceKind::Rewards,
        ]
        .into_iter()
        .enumerate()
        {
            let client = client.clone();
            tasks.spawn(async move { client.service(kind).get(&format!("/item/{i}"), None).await });
        }
        while let Some(result) = tasks.join_next().await {
            let value = result.unwrap().unwrap();
            assert!(value["url"].as_str().unwrap().contains("/item/"));
        }

        assert_eq!(transport.count(is_refresh), 1);
        assert_eq!(transport.count(|r| r.bearer_token() == Some("at_new")), 5);
        assert_eq!(updates.load(Ordering::SeqCst), 1);
        assert_eq!(client.access_token(), "at_new");
        assert_eq!(client.refresh_token(), "rt_new");
        assert_eq!(client.refresh_state(), RefreshState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn replay_failing_again_is_not_retried() {
        let transport = api(refresh_ok, |r| {
            status(r, 401, Some(codes::ACCESS_TOKEN_INVALID))
        });
        let client = client(transport.clone());

        let err = client.profile().get("/me", None).await.unwrap_err();
        assert_eq!(err.code(), Some(codes::ACCESS_TOKEN_INVALID));
        assert_eq!(err.request().bearer_token(), Some("at_new"));
        assert_eq!(transport.count(is_refresh), 1);
        assert_eq!(api_calls(&transport), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn custom_invalid_access_token_handler_bypasses_retry() {
        let transport = api(refresh_ok, accept_new_token);
        let client = client(transport.clone());
        client.set_invalid_access_token_handler(handler(|_r, _e| async {
            Ok(json!("signed out"))
        }));

        let value = client.licensing().get("/licenses", None).await.unwrap();
        assert_eq!(value, json!("signed out"));
        assert_eq!(transport.count(is_refresh), 0);

        client.restore_default_handler(Hook::InvalidAccessToken);
        let value = client.licensing().get("/licenses", None).await.unwrap();
        assert_eq!(value["url"], "https://sws.test/licenses");
        assert_eq!(transport.count(is_refresh), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn restored_session_access_denied_refreshes_and_replays() {
        let transport = api(refresh_ok, |r| match r.bearer_token() {
            Some("at_new") => Ok(json!({"ok": true})),
            _ => status(r, 403, Some(codes::ACCESS_DENIED)),
        });
        let client = client(transport.clone());
        client.set_access_token("");

        let value = client.rewards().get("/balance", None).await.unwrap();
        assert_eq!(value, json!({"ok": true}));
        assert_eq!(transport.count(is_refresh), 1);
        let calls = transport.calls();
        let last = calls.last().unwrap();
        assert_eq!(last.bearer_token(), Some("at_new"));
        assert_eq!(last.url(), "https://sws.test/balance");
    }

    #[tokio::test(start_paused = true)]
    async fn access_denied_with_token_is_reraised() {
        let transport = api(refresh_ok, |r| status(r, 403, Some(codes::ACCESS_DENIED)));
        let client = client(transport.clone());

        let err = client.assets().get("/private", None).await.unwrap_err();
        assert_eq!(Hook::classify(err.failure()), Some(Hook::AccessDenied));
        assert_eq!(transport.count(is_refresh), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_refresh_token_rejects_every_caller() {
        let transport = api(
            |r| status(r, 400, Some(codes::REFRESH_TOKEN_EXPIRED)),
            accept_new_token,
        );
        let client = client(transport.clone());

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..3 {
            let client = client.clone();
            tasks.spawn(async move { client.commerce().get(&format!("/cart/{i}"), None).await });
        }
        while let Some(result) = tasks.join_next().await {
            let err = result.unwrap().unwrap_err();
            assert_eq!(Hook::classify(err.failure()), Some(Hook::InvalidRefreshToken));
        }

        assert_eq!(transport.count(is_refresh), 1);
        assert_eq!(api_calls(&transport), 3, "no replay after a failed refresh");
        assert_eq!(client.access_token(), "at_old");
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_refresh_token_handler_sees_refresh_failure() {
        let transport = api(
            |r| status(r, 400, Some(codes::REFRESH_TOKEN_INVALID)),
            accept_new_token,
        );
        let client = client(transport.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        client.set_invalid_refresh_token_handler(handler(move |_r, _e| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"login_required": true}))
            }
        }));

        let value = client.profile().get("/me", None).await.unwrap();
        assert_eq!(value, json!({"login_required": true}));
        assert_eq!(api_calls(&transport), 1);
        // Recovered inside the identity service; passed through untouched.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_server_error_recovered_by_broadcast_handler() {
        let transport = api(|r| status(r, 500, None), accept_new_token);
        let client = client(transport.clone());
        client.set_service_error_handler(handler(|_r, _e| async {
            Ok(json!({"fallback": true}))
        }));

        let value = client.notifications().get("/inbox", None).await.unwrap();
        assert_eq!(value, json!({"fallback": true}));
        assert_eq!(api_calls(&transport), 1);
        assert_eq!(client.access_token(), "at_old");
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_unreachable_surfaces_to_caller() {
        let transport = api(
            |r| {
                Err(ServiceError::new(
                    Failure::Unreachable("connection refused".into()),
                    r.clone(),
                    None,
                ))
            },
            accept_new_token,
        );
        let client = client(transport);

        let err = client.profile().get("/me", None).await.unwrap_err();
        assert_eq!(Hook::classify(err.failure()), Some(Hook::ServiceUnavailable));
    }

    #[tokio::test(start_paused = true)]
    async fn replay_server_error_flows_through_service_error_hook() {
        let transport = api(refresh_ok, |r| match r.bearer_token() {
            Some("at_new") => status(r, 503, None),
            _ => status(r, 401, Some(codes::ACCESS_TOKEN_EXPIRED)),
        });
        let client = client(transport.clone());

        let err = client.licensing().post("/activate", None).await.unwrap_err();
        assert_eq!(err.http_status(), Some(503));

        client.set_service_error_handler(handler(|_r, e: ServiceError| async move {
            Ok(json!({"degraded": e.http_status()}))
        }));
        client.set_access_token("at_old");
        let value = client.licensing().post("/activate", None).await.unwrap();
        assert_eq!(value, json!({"degraded": 503}));
        assert_eq!(transport.count(is_refresh), 2);
    }

    #[tokio::test]
    async fn timeout_routes_to_timeout_hook() {
        let transport = api(refresh_ok, |r| {
            Err(ServiceError::new(Failure::Timeout, r.clone(), None))
        });
        let client = client(transport);

        let err = client.profile().get("/me", None).await.unwrap_err();
        assert_eq!(err.failure(), &Failure::Timeout);

        client.set_timeout_exceeded_handler(handler(|_r, _e| async { Ok(json!("cached")) }));
        let value = client.profile().get("/me", None).await.unwrap();
        assert_eq!(value, json!("cached"));
    }

    #[tokio::test]
    async fn missing_refresh_token_reraises_invalid_token() {
        let transport = api(refresh_ok, accept_new_token);
        let client = client(transport.clone());
        client.set_refresh_token("");

        let err = client.profile().get("/me", None).await.unwrap_err();
        assert_eq!(err.code(), Some(codes::ACCESS_TOKEN_EXPIRED));
        assert_eq!(transport.count(is_refresh), 0);
    }

    #[test]
    fn broadcast_handlers_apply_to_services_built_later() {
        let client = client(ScriptedTransport::ok(Value::Null));
        let early = client.profile();
        client.set_service_unavailable_handler(handler(|_r, _e| async { Ok(Value::Null) }));
        client.set_password_reentry_required_handler(handler(|_r, _e| async { Ok(Value::Null) }));

        let late = client.rewards();
        for service in [&early, &late, client.identity().service()] {
            assert!(service.dispatcher().handler(Hook::ServiceUnavailable).is_some());
            assert!(
                service
                    .dispatcher()
                    .handler(Hook::PasswordReEntryRequired)
                    .is_some()
            );
            assert!(service.dispatcher().handler(Hook::InvalidAccessToken).is_some());
            assert!(service.dispatcher().handler(Hook::AccessDenied).is_some());
        }

        client.restore_default_handler(Hook::ServiceUnavailable);
        assert!(late.dispatcher().handler(Hook::ServiceUnavailable).is_none());
        assert!(client.assets().dispatcher().handler(Hook::ServiceUnavailable).is_none());
    }

    #[test]
    fn services_are_constructed_once() {
        let client = client(ScriptedTransport::ok(Value::Null));
        assert!(Arc::ptr_eq(&client.commerce(), &client.commerce()));
        assert!(Arc::ptr_eq(
            &client.service(ServiceKind::Identity),
            client.identity().service()
        ));
        assert_eq!(client.profile().kind(), ServiceKind::Profile);
    }

    #[test]
    fn service_base_url_overrides_apply() {
        let mut config = ClientConfig::new("app", "secret", "https://api.sws.test");
        config
            .endpoints
            .services
            .insert(ServiceKind::Identity, "https://id.sws.test".into());
        let client =
            SwsClient::with_transport(config, ScriptedTransport::ok(Value::Null)).unwrap();
        assert_eq!(client.identity().base_url(), "https://id.sws.test");
        assert_eq!(client.profile().base_url(), "https://api.sws.test");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ClientConfig::new("app", "secret", "sws.test");
        let err = SwsClient::with_transport(config, ScriptedTransport::ok(Value::Null)).unwrap_err();
        assert!(err.to_string().contains("base_url"), "got: {err}");
    }

    #[test]
    fn credential_accessors_round_trip() {
        let client = client(ScriptedTransport::ok(Value::Null));
        client.set_user_id(42);
        assert_eq!(client.user_id(), 42);
        assert_eq!(client.profile().user_id(), 42);

        let session = client.session();
        assert_eq!(session.access_token, "at_old");
        assert_eq!(session.refresh_token, "rt_old");

        client.restore_session(&Session {
            access_token: String::new(),
            refresh_token: "rt_restored".into(),
            user_id: 7,
            ..Session::default()
        });
        assert_eq!(client.access_token(), "");
        assert_eq!(client.refresh_token(), "rt_restored");
        assert_eq!(client.user_id(), 7);
    }

    #[tokio::test]
    async fn session_store_restores_and_persists_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        store
            .save(&Session {
                refresh_token: "rt_old".into(),
                user_id: 9,
                ..Session::default()
            })
            .await
            .unwrap();

        let transport = ScriptedTransport::new(|r| {
            if is_refresh(r) {
                refresh_ok(r)
            } else if r.bearer_token() == Some("at_new") {
                Ok(json!({"ok": true}))
            } else {
                status(r, 403, Some(codes::ACCESS_DENIED))
            }
        });
        let config = ClientConfig::new("app", "secret", "https://sws.test");
        let client = SwsClient::with_transport(config, transport).unwrap();
        assert!(client.attach_session_store(store.clone()).await.unwrap());
        assert_eq!(client.user_id(), 9);
        assert_eq!(client.access_token(), "");

        let value = client.profile().get("/me", None).await.unwrap();
        assert_eq!(value, json!({"ok": true}));

        let saved = store.load().await.unwrap().unwrap();
        assert_eq!(saved.access_token, "at_new");
        assert_eq!(saved.refresh_token, "rt_new");
    }

    #[tokio::test]
    async fn from_config_without_session_file() {
        let client = SwsClient::from_config(ClientConfig::new("app", "secret", "https://sws.test"))
            .await
            .unwrap();
        assert_eq!(client.access_token(), "");
        assert_eq!(client.refresh_state(), RefreshState::Idle);
    }
}
