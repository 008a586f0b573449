//! Bearer token lifecycle: usability check, refresh-grant exchange and the
//! one-shot retry applied to every authorized vendor call.
//!
//! The token sits behind an async mutex that is held for the whole refresh,
//! so concurrent callers that find the token expired wait for the single
//! in-flight exchange instead of starting their own.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::engine::EventSink;
use crate::error::BridgeError;
use crate::models::{EngineEvent, GeneratedToken, Token};
use crate::netatmo::{ClientCredentials, VendorApi};

pub struct TokenManager {
    api: Arc<dyn VendorApi>,
    credentials: ClientCredentials,
    token: Mutex<Token>,
    events: EventSink,
}

impl TokenManager {
    pub fn new(
        api: Arc<dyn VendorApi>,
        credentials: ClientCredentials,
        initial: Token,
        events: EventSink,
    ) -> Self {
        Self {
            api,
            credentials,
            token: Mutex::new(initial),
            events,
        }
    }

    #[cfg(test)]
    pub async fn current(&self) -> Token {
        self.token.lock().await.clone()
    }

    /// Return a usable token, exchanging the refresh token if needed
    pub async fn ensure_valid(&self) -> Result<Token, BridgeError> {
        let mut token = self.token.lock().await;
        if token.is_usable() {
            tracing::debug!("[Netatmo] accessToken valid");
            return Ok(token.clone());
        }
        if !token.has_refresh_token() {
            return Err(BridgeError::NotAuthenticated);
        }

        tracing::info!("[Netatmo] accessToken expired, requesting new token");
        let refreshed = self.exchange(&token.refresh_token).await?;
        *token = refreshed.clone();
        drop(token);

        self.events.emit(EngineEvent::TokenUpdated(refreshed.clone()));
        Ok(refreshed)
    }

    async fn exchange(&self, refresh_token: &str) -> Result<Token, BridgeError> {
        let response = self
            .api
            .refresh_token(&self.credentials, refresh_token)
            .await?;

        let access_token = response
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(BridgeError::InvalidTokenResponse("access_token"))?;
        let refresh_token = response
            .refresh_token
            .filter(|t| !t.is_empty())
            .ok_or(BridgeError::InvalidTokenResponse("refresh_token"))?;
        let expires_in = response
            .expires_in
            .filter(|e| *e > 0)
            .ok_or(BridgeError::InvalidTokenResponse("expires_in"))?;

        Ok(Token {
            access_token,
            refresh_token,
            expires_at: Utc::now().timestamp() + expires_in,
        })
    }

    /// Drop the access token, unless a concurrent caller already replaced it
    pub async fn invalidate(&self, stale_access_token: &str) {
        let mut token = self.token.lock().await;
        if token.access_token == stale_access_token {
            token.access_token.clear();
        }
    }

    /// Install a token produced by the external authorization flow
    pub async fn install(&self, generated: GeneratedToken) -> Token {
        let token = generated.into_token(Utc::now().timestamp());
        *self.token.lock().await = token.clone();
        tracing::info!("[Netatmo] Installed newly generated token");
        self.events.emit(EngineEvent::TokenUpdated(token.clone()));
        token
    }

    pub async fn authenticate(&self) -> bool {
        match self.ensure_valid().await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!("[Netatmo] Authentication failed: {}", e);
                false
            }
        }
    }

    /// Run `call` with a valid access token. An expired-token rejection
    /// triggers one refresh and exactly one retry.
    pub async fn authorized<T, F, Fut>(&self, path: &str, call: F) -> Result<T, BridgeError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, BridgeError>>,
    {
        let token = self.ensure_valid().await?;
        match call(token.access_token.clone()).await {
            Err(e) if e.is_token_expired() => {
                tracing::info!("[Netatmo] {} rejected the access token, refreshing", path);
                self.invalidate(&token.access_token).await;
                let fresh = self.ensure_valid().await?;
                match call(fresh.access_token).await {
                    Err(e) if e.is_token_expired() => Err(BridgeError::RetryExhausted {
                        path: path.to_string(),
                    }),
                    other => other,
                }
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netatmo::fake::FakeVendorApi;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn credentials() -> ClientCredentials {
        ClientCredentials {
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
        }
    }

    fn manager(
        api: Arc<FakeVendorApi>,
        token: Token,
    ) -> (TokenManager, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let manager = TokenManager::new(api, credentials(), token, EventSink::new(tx));
        (manager, rx)
    }

    fn token(access: &str, refresh: &str, expires_at: i64) -> Token {
        Token {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
            expires_at,
        }
    }

    #[tokio::test]
    async fn test_usable_token_returned_unchanged() {
        let api = Arc::new(FakeVendorApi::new());
        let original = token("a1", "r1", Utc::now().timestamp() + 3600);
        let (manager, mut rx) = manager(api.clone(), original.clone());

        let result = manager.ensure_valid().await.unwrap();
        assert_eq!(result, original);
        assert_eq!(api.count("refresh:"), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_once() {
        let api = Arc::new(FakeVendorApi::new());
        api.push_refresh(json!({"access_token": "a2", "refresh_token": "r2", "expires_in": 10800}));
        let now = Utc::now().timestamp();
        let (manager, mut rx) = manager(api.clone(), token("a1", "r1", now - 1));

        let result = manager.ensure_valid().await.unwrap();
        assert_eq!(result.access_token, "a2");
        assert_eq!(result.refresh_token, "r2");
        assert!((result.expires_at - (now + 10800)).abs() <= 2);
        assert_eq!(api.calls(), vec!["refresh:r1".to_string()]);

        match rx.try_recv().unwrap() {
            EngineEvent::TokenUpdated(updated) => assert_eq!(updated, result),
            other => panic!("unexpected event: {other:?}"),
        }

        // Second call reuses the refreshed token
        assert_eq!(manager.ensure_valid().await.unwrap(), result);
        assert_eq!(api.count("refresh:"), 1);
    }

    #[tokio::test]
    async fn test_incomplete_refresh_response_is_fatal() {
        let api = Arc::new(FakeVendorApi::new());
        api.push_refresh(json!({"access_token": "a2", "refresh_token": "r2"}));
        let (manager, mut rx) = manager(api.clone(), token("", "r1", 0));

        let err = manager.ensure_valid().await.unwrap_err();
        assert!(matches!(err, BridgeError::InvalidTokenResponse("expires_in")), "got: {err:?}");
        assert!(err.is_fatal_auth());
        assert_eq!(api.count("refresh:"), 1);
        assert!(rx.try_recv().is_err());
        assert_eq!(manager.current().await.refresh_token, "r1");
    }

    #[tokio::test]
    async fn test_no_credentials_is_not_connected() {
        let api = Arc::new(FakeVendorApi::new());
        let (manager, _rx) = manager(api.clone(), Token::default());

        assert!(matches!(
            manager.ensure_valid().await,
            Err(BridgeError::NotAuthenticated)
        ));
        assert!(!manager.authenticate().await);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_expired_rejection_retries_exactly_once() {
        let api = Arc::new(FakeVendorApi::new());
        api.push_refresh(json!({"access_token": "a2", "refresh_token": "r2", "expires_in": 10800}));
        api.expire_next(1);
        let (manager, _rx) = manager(api.clone(), token("a1", "r1", Utc::now().timestamp() + 3600));

        let fake = api.clone();
        let data = manager
            .authorized("/api/homesdata", move |t| {
                let fake = fake.clone();
                async move { fake.homes_data(&t).await }
            })
            .await;
        tokio_test::assert_ok!(data);
        assert_eq!(
            api.calls(),
            vec![
                "homesdata:a1".to_string(),
                "refresh:r1".to_string(),
                "homesdata:a2".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_second_rejection_is_not_retried_again() {
        let api = Arc::new(FakeVendorApi::new());
        api.push_refresh(json!({"access_token": "a2", "refresh_token": "r2", "expires_in": 10800}));
        api.expire_next(2);
        let (manager, _rx) = manager(api.clone(), token("a1", "r1", Utc::now().timestamp() + 3600));

        let fake = api.clone();
        let err = manager
            .authorized("/api/homesdata", move |t| {
                let fake = fake.clone();
                async move { fake.homes_data(&t).await }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::RetryExhausted { .. }), "got: {err:?}");
        assert_eq!(api.count("homesdata:"), 2);
        assert_eq!(api.count("refresh:"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_refresh() {
        let api = Arc::new(FakeVendorApi::new());
        api.push_refresh(json!({"access_token": "a2", "refresh_token": "r2", "expires_in": 10800}));
        api.set_refresh_delay(Duration::from_millis(500));
        let (manager, mut rx) = manager(api.clone(), token("a1", "r1", 0));

        let results = futures::future::join_all((0..5).map(|_| manager.ensure_valid())).await;
        for result in results {
            assert_eq!(result.unwrap().access_token, "a2");
        }
        assert_eq!(api.count("refresh:"), 1);
        assert!(matches!(rx.try_recv(), Ok(EngineEvent::TokenUpdated(_))));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_invalidate_keeps_newer_token() {
        let api = Arc::new(FakeVendorApi::new());
        let (manager, _rx) = manager(api, token("a2", "r2", Utc::now().timestamp() + 3600));

        manager.invalidate("a1").await;
        assert_eq!(manager.current().await.access_token, "a2");

        manager.invalidate("a2").await;
        assert!(manager.current().await.access_token.is_empty());
    }

    #[tokio::test]
    async fn test_install_generated_token() {
        let api = Arc::new(FakeVendorApi::new());
        let (manager, mut rx) = manager(api, Token::default());

        let installed = manager
            .install(GeneratedToken {
                access_token: "g1".to_string(),
                refresh_token: "gr1".to_string(),
                expires_in: 10800,
            })
            .await;
        assert!(installed.is_usable());
        assert!(manager.authenticate().await);
        assert_eq!(rx.try_recv().unwrap(), EngineEvent::TokenUpdated(installed));
    }
}
