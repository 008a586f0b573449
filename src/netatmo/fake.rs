//! Scripted in-memory vendor API for engine tests

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::BridgeError;
use crate::netatmo::client::{ClientCredentials, VendorApi};
use crate::netatmo::types::{
    HomeStatusResponse, HomesDataResponse, SetStateRequest, SetStateResponse, TokenResponse,
};

#[derive(Default)]
struct Script {
    homes_data: Value,
    statuses: HashMap<String, Value>,
    refresh_replies: VecDeque<Result<Value, Value>>,
    refresh_delay: Option<Duration>,
    status_delay: Option<Duration>,
    expire_next: usize,
    set_state_reply: Option<Result<Value, Value>>,
    calls: Vec<String>,
    set_state_requests: Vec<SetStateRequest>,
}

#[derive(Default)]
pub struct FakeVendorApi {
    script: Mutex<Script>,
}

fn expired(path: &str) -> BridgeError {
    BridgeError::Api {
        path: path.to_string(),
        status: 403,
        code: Some(3),
        message: "Access token expired".to_string(),
        payload: json!({"code": 3, "message": "Access token expired"}),
    }
}

fn api_error(path: &str, payload: Value) -> BridgeError {
    BridgeError::Api {
        path: path.to_string(),
        status: 400,
        code: payload.get("code").and_then(|c| c.as_i64()),
        message: payload.to_string(),
        payload,
    }
}

impl FakeVendorApi {
    pub fn new() -> Self {
        let fake = Self::default();
        fake.set_homes_data(json!({"body": {"homes": []}}));
        fake
    }

    pub fn set_homes_data(&self, body: Value) {
        self.script.lock().unwrap().homes_data = body;
    }

    pub fn set_home_status(&self, home_id: &str, body: Value) {
        self.script
            .lock()
            .unwrap()
            .statuses
            .insert(home_id.to_string(), body);
    }

    pub fn push_refresh(&self, reply: Value) {
        self.script
            .lock()
            .unwrap()
            .refresh_replies
            .push_back(Ok(reply));
    }

    pub fn push_refresh_error(&self, payload: Value) {
        self.script
            .lock()
            .unwrap()
            .refresh_replies
            .push_back(Err(payload));
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        self.script.lock().unwrap().refresh_delay = Some(delay);
    }

    pub fn set_status_delay(&self, delay: Duration) {
        self.script.lock().unwrap().status_delay = Some(delay);
    }

    /// The next `n` token-authorized calls fail with 403 / code 3
    pub fn expire_next(&self, n: usize) {
        self.script.lock().unwrap().expire_next = n;
    }

    pub fn set_state_reply(&self, reply: Value) {
        self.script.lock().unwrap().set_state_reply = Some(Ok(reply));
    }

    pub fn set_state_error(&self, payload: Value) {
        self.script.lock().unwrap().set_state_reply = Some(Err(payload));
    }

    pub fn calls(&self) -> Vec<String> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn set_state_requests(&self) -> Vec<SetStateRequest> {
        self.script.lock().unwrap().set_state_requests.clone()
    }

    fn record(&self, call: String, path: &str) -> Result<(), BridgeError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(call);
        if script.expire_next > 0 {
            script.expire_next -= 1;
            return Err(expired(path));
        }
        Ok(())
    }
}

#[async_trait]
impl VendorApi for FakeVendorApi {
    async fn homes_data(&self, access_token: &str) -> Result<HomesDataResponse, BridgeError> {
        self.record(format!("homesdata:{access_token}"), "/api/homesdata")?;
        let body = self.script.lock().unwrap().homes_data.clone();
        Ok(serde_json::from_value(body)?)
    }

    async fn home_status(
        &self,
        access_token: &str,
        home_id: &str,
    ) -> Result<HomeStatusResponse, BridgeError> {
        self.record(format!("homestatus:{home_id}:{access_token}"), "/api/homestatus")?;
        let (body, delay) = {
            let script = self.script.lock().unwrap();
            let body = script
                .statuses
                .get(home_id)
                .cloned()
                .unwrap_or_else(|| json!({"body": {}}));
            (body, script.status_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(serde_json::from_value(body)?)
    }

    async fn set_state(
        &self,
        access_token: &str,
        request: &SetStateRequest,
    ) -> Result<SetStateResponse, BridgeError> {
        self.record(format!("setstate:{access_token}"), "/api/setstate")?;
        let reply = {
            let mut script = self.script.lock().unwrap();
            script.set_state_requests.push(request.clone());
            script.set_state_reply.clone()
        };
        match reply {
            Some(Ok(body)) => Ok(serde_json::from_value(body)?),
            Some(Err(payload)) => Err(api_error("/api/setstate", payload)),
            None => Ok(serde_json::from_value(json!({"status": "ok"}))?),
        }
    }

    async fn refresh_token(
        &self,
        _credentials: &ClientCredentials,
        refresh_token: &str,
    ) -> Result<TokenResponse, BridgeError> {
        let (reply, delay) = {
            let mut script = self.script.lock().unwrap();
            script.calls.push(format!("refresh:{refresh_token}"));
            (script.refresh_replies.pop_front(), script.refresh_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match reply {
            Some(Ok(body)) => Ok(serde_json::from_value(body)?),
            Some(Err(payload)) => Err(api_error("/oauth2/token", payload)),
            None => Err(api_error("/oauth2/token", json!("invalid_grant"))),
        }
    }
}
