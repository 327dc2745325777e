//! Identity service: token endpoint calls
//!
//! Both grants authenticate with the app's Basic credential and go through
//! the identity service's own dispatcher, so a handler registered there
//! (e.g. `ServiceError`) also applies to a failing refresh.

use std::ops::Deref;
use std::sync::Arc;

use serde_json::{Map, Value};
use sws_auth::{GRANT_AUTHORIZATION_CODE, GRANT_REFRESH_TOKEN, TOKEN_PATH};

use crate::error::ServiceError;
use crate::request::Method;
use crate::retry::{RefreshFuture, TokenRefresher};
use crate::service::Service;

#[derive(Debug)]
pub struct IdentityService {
    service: Arc<Service>,
}

impl IdentityService {
    pub fn new(service: Arc<Service>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<Service> {
        &self.service
    }

    /// Exchange a refresh token for a new token pair.
    pub async fn token_refresh(&self, refresh_token: &str) -> Result<Value, ServiceError> {
        let mut body = Map::new();
        body.insert("grant_type".into(), GRANT_REFRESH_TOKEN.into());
        body.insert("refresh_token".into(), refresh_token.into());
        let request = self.basic_request(Method::Post, TOKEN_PATH, Some(body));
        self.fetch(request).await
    }

    /// Exchange an authorization code and its PKCE verifier for tokens.
    ///
    /// The caller commits the returned tokens (`SwsClient::set_access_token`
    /// and friends); nothing is stored here.
    pub async fn authorization_code_token(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<Value, ServiceError> {
        let mut body = Map::new();
        body.insert("grant_type".into(), GRANT_AUTHORIZATION_CODE.into());
        body.insert("code".into(), code.into());
        body.insert("code_verifier".into(), code_verifier.into());
        body.insert("redirect_uri".into(), redirect_uri.into());
        let request = self.basic_request(Method::Post, TOKEN_PATH, Some(body));
        self.fetch(request).await
    }
}

impl Deref for IdentityService {
    type Target = Service;

    fn deref(&self) -> &Service {
        &self.service
    }
}

impl TokenRefresher for IdentityService {
    fn refresh<'a>(&'a self, refresh_token: &'a str) -> RefreshFuture<'a> {
        Box::pin(self.token_refresh(refresh_token))
    }
}
