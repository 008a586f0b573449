//! Netatmo HTTP client
//!
//! Stateless: the bearer token is supplied per call by the engine's token
//! manager, which owns refresh and retry.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::NetatmoConfig;
use crate::error::BridgeError;
use crate::netatmo::types::{
    ErrorEnvelope, HomeStatusResponse, HomesDataResponse, SetStateRequest, SetStateResponse,
    TokenResponse,
};

pub const PATH_AUTH: &str = "/oauth2/token";
pub const PATH_HOMES_DATA: &str = "/api/homesdata";
pub const PATH_HOME_STATUS: &str = "/api/homestatus";
pub const PATH_SET_STATE: &str = "/api/setstate";

#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl From<&NetatmoConfig> for ClientCredentials {
    fn from(config: &NetatmoConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        }
    }
}

/// The vendor endpoints the engine consumes
#[async_trait]
pub trait VendorApi: Send + Sync {
    async fn homes_data(&self, access_token: &str) -> Result<HomesDataResponse, BridgeError>;

    async fn home_status(
        &self,
        access_token: &str,
        home_id: &str,
    ) -> Result<HomeStatusResponse, BridgeError>;

    async fn set_state(
        &self,
        access_token: &str,
        request: &SetStateRequest,
    ) -> Result<SetStateResponse, BridgeError>;

    async fn refresh_token(
        &self,
        credentials: &ClientCredentials,
        refresh_token: &str,
    ) -> Result<TokenResponse, BridgeError>;
}

pub struct NetatmoClient {
    http_client: Client,
    base_url: Url,
}

impl NetatmoClient {
    pub fn new(config: &NetatmoConfig) -> Result<Self, BridgeError> {
        let http_client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| BridgeError::request("client", e))?;
        let base_url = Url::parse(&config.base_url).map_err(|e| BridgeError::request("client", e))?;

        Ok(Self::with_client(http_client, base_url))
    }

    pub fn with_client(http_client: Client, base_url: Url) -> Self {
        Self {
            http_client,
            base_url,
        }
    }

    fn url(&self, path: &str) -> Result<Url, BridgeError> {
        self.base_url
            .join(path)
            .map_err(|e| BridgeError::request(path, e))
    }

    /// Send a request and decode the body, mapping vendor error envelopes
    async fn execute<T: DeserializeOwned>(
        &self,
        path: &str,
        request: RequestBuilder,
    ) -> Result<T, BridgeError> {
        let resp = request
            .send()
            .await
            .map_err(|e| BridgeError::request(path, e))?;

        let status = resp.status();
        if status.is_success() {
            return resp.json::<T>().await.map_err(|e| BridgeError::request(path, e));
        }

        let payload: serde_json::Value = resp.json().await.unwrap_or(serde_json::Value::Null);
        let envelope: ErrorEnvelope = serde_json::from_value(payload.clone()).unwrap_or_default();

        match envelope.message() {
            Some(message) => Err(BridgeError::Api {
                path: path.to_string(),
                status: status.as_u16(),
                code: envelope.code(),
                message,
                payload: envelope.error.unwrap_or(payload),
            }),
            None => Err(BridgeError::request(path, format!("HTTP status {}", status))),
        }
    }
}

#[async_trait]
impl VendorApi for NetatmoClient {
    async fn homes_data(&self, access_token: &str) -> Result<HomesDataResponse, BridgeError> {
        let request = self
            .http_client
            .get(self.url(PATH_HOMES_DATA)?)
            .bearer_auth(access_token);
        self.execute(PATH_HOMES_DATA, request).await
    }

    async fn home_status(
        &self,
        access_token: &str,
        home_id: &str,
    ) -> Result<HomeStatusResponse, BridgeError> {
        let request = self
            .http_client
            .get(self.url(PATH_HOME_STATUS)?)
            .query(&[("home_id", home_id)])
            .bearer_auth(access_token);
        self.execute(PATH_HOME_STATUS, request).await
    }

    async fn set_state(
        &self,
        access_token: &str,
        body: &SetStateRequest,
    ) -> Result<SetStateResponse, BridgeError> {
        let request = self
            .http_client
            .post(self.url(PATH_SET_STATE)?)
            .json(body)
            .bearer_auth(access_token);
        self.execute(PATH_SET_STATE, request).await
    }

    async fn refresh_token(
        &self,
        credentials: &ClientCredentials,
        refresh_token: &str,
    ) -> Result<TokenResponse, BridgeError> {
        // The token endpoint only accepts application/x-www-form-urlencoded
        let request = self.http_client.post(self.url(PATH_AUTH)?).form(&[
            ("grant_type", "refresh_token"),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ]);
        self.execute(PATH_AUTH, request).await
    }
}
