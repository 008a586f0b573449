//! Authorized vendor calls: every request goes through the token manager's
//! refresh-and-retry wrapper.

use std::sync::Arc;

use crate::engine::token::TokenManager;
use crate::engine::EventSink;
use crate::error::BridgeError;
use crate::models::{ConnectionState, EngineEvent};
use crate::netatmo::client::{PATH_HOMES_DATA, PATH_HOME_STATUS, PATH_SET_STATE};
use crate::netatmo::types::{
    HomeStatusResponse, HomesDataResponse, SetStateRequest, SetStateResponse,
};
use crate::netatmo::VendorApi;

pub struct ApiSession {
    api: Arc<dyn VendorApi>,
    tokens: Arc<TokenManager>,
    events: EventSink,
}

impl ApiSession {
    pub fn new(api: Arc<dyn VendorApi>, tokens: Arc<TokenManager>, events: EventSink) -> Self {
        Self {
            api,
            tokens,
            events,
        }
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    pub async fn homes_data(&self) -> Result<HomesDataResponse, BridgeError> {
        let api = &self.api;
        let result = self
            .tokens
            .authorized(PATH_HOMES_DATA, move |token| async move {
                api.homes_data(&token).await
            })
            .await;
        self.check(result)
    }

    pub async fn home_status(&self, home_id: &str) -> Result<HomeStatusResponse, BridgeError> {
        let api = &self.api;
        let result = self
            .tokens
            .authorized(PATH_HOME_STATUS, move |token| async move {
                api.home_status(&token, home_id).await
            })
            .await;
        self.check(result)
    }

    pub async fn set_state(
        &self,
        request: &SetStateRequest,
    ) -> Result<SetStateResponse, BridgeError> {
        let api = &self.api;
        let result = self
            .tokens
            .authorized(PATH_SET_STATE, move |token| async move {
                api.set_state(&token, request).await
            })
            .await;
        self.check(result)
    }

    /// Credentials that can no longer be refreshed need the user's
    /// authorization flow; announce it to the outside.
    fn check<T>(&self, result: Result<T, BridgeError>) -> Result<T, BridgeError> {
        if let Err(ref e) = result {
            if e.is_fatal_auth() {
                tracing::warn!("[Netatmo] {}; re-authorization required", e);
                self.events.emit(EngineEvent::ConnectionState(
                    ConnectionState::AuthorizationRequired,
                ));
            }
        }
        result
    }
}
