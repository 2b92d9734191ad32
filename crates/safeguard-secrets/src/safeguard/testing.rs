//! Scripted [`ApplianceApi`] double for unit tests.

use crate::error::{LookupError, Result};
use crate::safeguard::client::{ApiResponse, ApplianceApi};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// One recorded call.
#[derive(Debug, Clone)]
pub struct Call {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

enum Reply {
    Response(ApiResponse),
    Transport(String),
}

/// Replies are queued per `(method, path)` and consumed in order; the last
/// reply for a route is repeated once the queue runs dry.
#[derive(Default)]
pub struct ScriptedApi {
    routes: Mutex<HashMap<(Method, String), VecDeque<Reply>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, method: Method, path: &str, status: u16, body: impl Into<String>) -> Self {
        let status = StatusCode::from_u16(status).unwrap();
        self.push(method, path, Reply::Response(ApiResponse::new(status, body)))
    }

    pub fn on_json(self, method: Method, path: &str, status: u16, body: Value) -> Self {
        self.on(method, path, status, body.to_string())
    }

    pub fn fail(self, method: Method, path: &str, message: &str) -> Self {
        self.push(method, path, Reply::Transport(message.to_string()))
    }

    fn push(self, method: Method, path: &str, reply: Reply) -> Self {
        self.routes
            .lock()
            .unwrap()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.method == method && c.path == path)
            .count()
    }
}

#[async_trait]
impl ApplianceApi for ScriptedApi {
    async fn invoke(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<ApiResponse> {
        self.calls.lock().unwrap().push(Call {
            method: method.clone(),
            path: path.to_string(),
            query: query
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: body.cloned(),
        });

        let mut routes = self.routes.lock().unwrap();
        let queue = routes
            .get_mut(&(method.clone(), path.to_string()))
            .unwrap_or_else(|| panic!("unexpected call: {method} {path}"));
        let reply = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().map(|r| match r {
                Reply::Response(resp) => Reply::Response(resp.clone()),
                Reply::Transport(msg) => Reply::Transport(msg.clone()),
            })
        };

        match reply {
            Some(Reply::Response(resp)) => Ok(resp),
            Some(Reply::Transport(msg)) => Err(LookupError::Transport(msg)),
            None => panic!("no reply scripted for {method} {path}"),
        }
    }
}
