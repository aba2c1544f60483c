// api.rs
//
// Thin client over the Lists REST API. All request/response handling lives
// here: URL building, percent-encoding, status checks, the HTML-body guard
// for SPA servers, and normalization of payloads into model structs. The
// actual wire call sits behind `Transport` so the sync core can be driven
// against a scripted transport in tests.

use crate::error::{SyncError, SyncResult};
use crate::model::{Task, TodoList};
use log::debug;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use std::sync::Arc;

// the characters encodeURIComponent leaves alone
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'!')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub fn encode_segment(s: &str) -> String {
    utf8_percent_encode(s, SEGMENT).to_string()
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}…(+{} bytes)", &s[..max], s.len() - max)
    }
}

#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The generic request client the core talks through: GET/POST/PATCH/DELETE
/// with a JSON body. Cancellation is handled above this layer — a
/// superseded call's response is discarded by the store, never applied.
pub trait Transport: Send + Sync {
    fn send(&self, method: &str, url: &str, body: Option<&Value>) -> SyncResult<HttpResponse>;
}

pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new() -> SyncResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| SyncError::Network(format!("HTTP client build failed: {}", e)))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn send(&self, method: &str, url: &str, body: Option<&Value>) -> SyncResult<HttpResponse> {
        let builder = match method {
            "GET" => self.client.get(url),
            "POST" => self.client.post(url),
            "PATCH" => self.client.patch(url),
            "DELETE" => self.client.delete(url),
            other => return Err(SyncError::Network(format!("unsupported method {}", other))),
        };
        let mut builder = builder
            .header("Accept", "application/json")
            .header("X-Requested-With", "XMLHttpRequest");
        if let Some(b) = body {
            builder = builder.header(CONTENT_TYPE, "application/json").json(b);
        }
        let resp = builder
            .send()
            .map_err(|e| SyncError::Network(format!("{} {} failed: {}", method, url, e)))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .map_err(|e| SyncError::Network(format!("read {} failed: {}", url, e)))?;
        Ok(HttpResponse { status, body })
    }
}

#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    transport: Arc<dyn Transport>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self { base_url: base_url.into(), transport }
    }

    pub fn over_http(base_url: impl Into<String>) -> SyncResult<Self> {
        Ok(Self::new(base_url, Arc::new(HttpTransport::new()?)))
    }

    fn api(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url.trim_end_matches('/'), path)
    }

    pub fn list_url(&self, route_key: &str) -> String {
        self.api(&format!("lists/{}/", encode_segment(route_key)))
    }

    pub fn tasks_by_list_path_url(&self, route_key: &str) -> String {
        self.api(&format!("lists/{}/tasks/", encode_segment(route_key)))
    }

    pub fn tasks_by_token_url(&self, token: &str) -> String {
        self.api(&format!("tasks/?list_token={}", encode_segment(token)))
    }

    pub fn task_url(&self, id: i64) -> String {
        self.api(&format!("tasks/{}/", id))
    }

    fn request(&self, method: &str, url: &str, body: Option<&Value>) -> SyncResult<HttpResponse> {
        debug!("[HTTP OUT] {} {}", method, url);
        if let Some(b) = body {
            debug!("  Body: {}", truncate(&b.to_string(), 4000));
        }
        let resp = self.transport.send(method, url, body)?;
        debug!("[HTTP IN] Status: {}", resp.status);
        debug!("  Body: {}", truncate(&resp.body, 4000));
        Ok(resp)
    }

    /// Issue a request and parse the JSON body, rejecting error statuses
    /// and the HTML pages some deployments serve in place of a JSON 404.
    fn json(&self, method: &str, url: &str, body: Option<&Value>) -> SyncResult<Value> {
        let resp = self.request(method, url, body)?;
        if !resp.is_success() {
            return Err(SyncError::Http { status: resp.status, body: resp.body });
        }
        if resp.body.trim_start().starts_with('<') {
            return Err(SyncError::Parse(format!("HTML response from {}", url)));
        }
        serde_json::from_str(&resp.body)
            .map_err(|e| SyncError::Parse(format!("parse {} failed: {}", url, e)))
    }

    /// Like `json`, but a success with an empty or non-JSON body resolves
    /// to `Null` instead of an error. PATCH responses feed the toggle
    /// confirmation logic, which treats an uninformative body as
    /// ambiguity, not failure.
    fn json_or_null(&self, method: &str, url: &str, body: Option<&Value>) -> SyncResult<Value> {
        let resp = self.request(method, url, body)?;
        if !resp.is_success() {
            return Err(SyncError::Http { status: resp.status, body: resp.body });
        }
        Ok(serde_json::from_str(&resp.body).unwrap_or(Value::Null))
    }

    fn ok(&self, method: &str, url: &str) -> SyncResult<()> {
        let resp = self.request(method, url, None)?;
        if !resp.is_success() {
            return Err(SyncError::Http { status: resp.status, body: resp.body });
        }
        Ok(())
    }

    // ---- lists ----

    pub fn fetch_lists(&self) -> SyncResult<Vec<TodoList>> {
        let v = self.json("GET", &self.api("lists/"), None)?;
        Ok(extract_collection(&v).iter().map(TodoList::from_value).collect())
    }

    pub fn create_list(&self, body: &Value) -> SyncResult<TodoList> {
        let v = self.json("POST", &self.api("lists/"), Some(body))?;
        Ok(TodoList::from_value(&v))
    }

    pub fn fetch_list(&self, route_key: &str) -> SyncResult<TodoList> {
        let v = self.json("GET", &self.list_url(route_key), None)?;
        Ok(TodoList::from_value(&v))
    }

    pub fn update_list(&self, route_key: &str, body: &Value) -> SyncResult<TodoList> {
        let v = self.json("PATCH", &self.list_url(route_key), Some(body))?;
        Ok(TodoList::from_value(&v))
    }

    pub fn delete_list(&self, route_key: &str) -> SyncResult<()> {
        self.ok("DELETE", &self.list_url(route_key))
    }

    // ---- tasks ----

    pub fn tasks_by_list_id(&self, list_id: i64) -> SyncResult<Vec<Task>> {
        let url = self.api(&format!("lists/{}/tasks/", list_id));
        let v = self.json("GET", &url, None)?;
        Ok(extract_collection(&v).iter().map(Task::from_value).collect())
    }

    pub fn tasks_by_list_path(&self, route_key: &str) -> SyncResult<Vec<Task>> {
        let v = self.json("GET", &self.tasks_by_list_path_url(route_key), None)?;
        Ok(extract_collection(&v).iter().map(Task::from_value).collect())
    }

    pub fn tasks_by_list_token(&self, token: &str) -> SyncResult<Vec<Task>> {
        let v = self.json("GET", &self.tasks_by_token_url(token), None)?;
        Ok(extract_collection(&v).iter().map(Task::from_value).collect())
    }

    pub fn create_task(&self, body: &Value) -> SyncResult<Task> {
        let v = self.json("POST", &self.api("tasks/"), Some(body))?;
        Ok(Task::from_value(&v))
    }

    /// PATCH a task and hand back the raw response value; the toggle path
    /// inspects it for the completion field rather than trusting a parse.
    pub fn update_task(&self, id: i64, body: &Value) -> SyncResult<Value> {
        self.json_or_null("PATCH", &self.task_url(id), Some(body))
    }

    pub fn delete_task(&self, id: i64) -> SyncResult<()> {
        self.ok("DELETE", &self.task_url(id))
    }
}

/// The backend wraps collections inconsistently: a bare array, or an object
/// keyed `results`, `tasks`, `data`, or `items`. An empty set from any of
/// those shapes is a legitimate result, not a failure.
pub fn extract_collection(v: &Value) -> Vec<Value> {
    if let Some(arr) = v.as_array() {
        return arr.clone();
    }
    for key in ["results", "tasks", "data", "items"] {
        if let Some(arr) = v.get(key).and_then(|x| x.as_array()) {
            return arr.clone();
        }
    }
    Vec::new()
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    #[derive(Clone, Debug)]
    pub struct Call {
        pub method: String,
        pub url: String,
        pub body: Option<Value>,
    }

    struct Rule {
        method: String,
        pattern: String,
        response: SyncResult<HttpResponse>,
        once: bool,
    }

    /// A scripted stand-in for the HTTP transport: rules are matched by
    /// method + URL suffix, in insertion order; `once` rules are consumed,
    /// so two rules on the same route answer successive calls.
    #[derive(Default)]
    pub struct ScriptedTransport {
        rules: Mutex<Vec<Rule>>,
        calls: Mutex<Vec<Call>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn push(&self, method: &str, pattern: &str, response: SyncResult<HttpResponse>, once: bool) {
            self.rules.lock().unwrap().push(Rule {
                method: method.to_string(),
                pattern: pattern.to_string(),
                response,
                once,
            });
        }

        pub fn on(&self, method: &str, pattern: &str, status: u16, body: Value) {
            self.push(
                method,
                pattern,
                Ok(HttpResponse { status, body: body.to_string() }),
                false,
            );
        }

        /// Script a response whose body is not JSON (HTML page, empty body).
        pub fn on_raw(&self, method: &str, pattern: &str, status: u16, body: &str) {
            self.push(
                method,
                pattern,
                Ok(HttpResponse { status, body: body.to_string() }),
                false,
            );
        }

        pub fn once(&self, method: &str, pattern: &str, status: u16, body: Value) {
            self.push(
                method,
                pattern,
                Ok(HttpResponse { status, body: body.to_string() }),
                true,
            );
        }

        pub fn fail(&self, method: &str, pattern: &str) {
            self.push(
                method,
                pattern,
                Err(SyncError::Network(format!("scripted failure for {}", pattern))),
                false,
            );
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl Transport for ScriptedTransport {
        fn send(&self, method: &str, url: &str, body: Option<&Value>) -> SyncResult<HttpResponse> {
            self.calls.lock().unwrap().push(Call {
                method: method.to_string(),
                url: url.to_string(),
                body: body.cloned(),
            });
            let mut rules = self.rules.lock().unwrap();
            let idx = rules
                .iter()
                .position(|r| r.method == method && url.ends_with(&r.pattern));
            match idx {
                Some(i) => {
                    let response = rules[i].response.clone();
                    if rules[i].once {
                        rules.remove(i);
                    }
                    response
                }
                None => Err(SyncError::Network(format!("unscripted {} {}", method, url))),
            }
        }
    }
}
