//! In-memory `Httper` used by the unit tests.

use std::cell::RefCell;

use bytes::Bytes;

use crate::http::{HttpError, HttpResponse, Httper};

/// A request seen by [`FakeHttp`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub url: String,
    pub body: Vec<u8>,
    pub headers: Vec<(String, String)>,
}

impl RecordedRequest {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

struct Route {
    method: String,
    url: String,
    replies: Vec<Result<HttpResponse, HttpError>>,
    served: usize,
}

/// Replays scripted replies by method and exact URL.
///
/// Replies registered for the same route are served in order; the last one repeats.
/// Requests that match no route fail like a transport error.
#[derive(Default)]
pub struct FakeHttp {
    routes: RefCell<Vec<Route>>,
    requests: RefCell<Vec<RecordedRequest>>,
}

impl FakeHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, method: &str, url: &str, status_code: u16, body: &str) -> Self {
        let reply = Ok(HttpResponse {
            status_code,
            body: Bytes::from(body.to_string()),
        });
        self.push(method, url, reply)
    }

    pub fn on_json(self, method: &str, url: &str, status_code: u16, body: serde_json::Value) -> Self {
        self.on(method, url, status_code, &body.to_string())
    }

    pub fn on_error(self, method: &str, url: &str, message: &str) -> Self {
        self.push(method, url, Err(HttpError(message.to_string())))
    }

    fn push(self, method: &str, url: &str, reply: Result<HttpResponse, HttpError>) -> Self {
        {
            let mut routes = self.routes.borrow_mut();
            match routes.iter_mut().find(|r| r.method == method && r.url == url) {
                Some(route) => route.replies.push(reply),
                None => routes.push(Route {
                    method: method.to_string(),
                    url: url.to_string(),
                    replies: vec![reply],
                    served: 0,
                }),
            }
        }
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.borrow().clone()
    }

    pub fn requests_to(&self, method: &str, url: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.url == url)
            .collect()
    }

    pub fn count(&self, method: &str) -> usize {
        self.requests.borrow().iter().filter(|r| r.method == method).count()
    }

    fn handle(&self, method: &str, url: String, body: Vec<u8>, headers: Vec<(String, String)>) -> Result<HttpResponse, HttpError> {
        self.requests.borrow_mut().push(RecordedRequest {
            method: method.to_string(),
            url: url.clone(),
            body,
            headers,
        });
        let mut routes = self.routes.borrow_mut();
        let route = routes
            .iter_mut()
            .find(|r| r.method == method && r.url == url)
            .ok_or_else(|| HttpError(format!("no route for {} {}", method, url)))?;
        let index = route.served.min(route.replies.len() - 1);
        route.served += 1;
        route.replies[index].clone()
    }
}

impl Httper for FakeHttp {
    fn get(&self, url: String, headers: Vec<(String, String)>) -> Result<HttpResponse, HttpError> {
        self.handle("GET", url, Vec::new(), headers)
    }
    fn post(&self, url: String, body: String, headers: Vec<(String, String)>) -> Result<HttpResponse, HttpError> {
        self.handle("POST", url, body.into_bytes(), headers)
    }
    fn put(&self, url: String, body: Vec<u8>, headers: Vec<(String, String)>) -> Result<HttpResponse, HttpError> {
        self.handle("PUT", url, body, headers)
    }
}
