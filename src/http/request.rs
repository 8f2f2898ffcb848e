//! Usage: Replayable description of an API request (method, path, query, JSON body).

use crate::shared::error::AppResult;
use bytes::Bytes;
use reqwest::Method;
use serde::Serialize;

/// A request relative to the API base.
///
/// The body is kept as encoded bytes so the request can be sent a second time
/// after a token refresh.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Bytes>,
    retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> AppResult<Self> {
        let encoded = serde_json::to_vec(body)
            .map_err(|e| format!("SEC_INVALID_INPUT: request body is not serializable: {e}"))?;
        self.body = Some(Bytes::from(encoded));
        Ok(self)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Set once the request has been replayed after a refresh; a retried
    /// request never triggers another refresh.
    pub fn is_retried(&self) -> bool {
        self.retried
    }

    pub fn mark_retried(&mut self) {
        self.retried = true;
    }

    /// Path with leading slashes removed, so joining keeps the API prefix.
    pub(crate) fn relative_path(&self) -> &str {
        self.path.trim().trim_start_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_body_is_encoded_once_and_kept_for_replay() {
        let request = ApiRequest::post("/posts/")
            .json(&serde_json::json!({"title": "hi", "content": "<p>x</p>"}))
            .unwrap();
        let replay = request.clone();
        assert_eq!(request.body(), replay.body());
        let decoded: serde_json::Value =
            serde_json::from_slice(request.body().unwrap()).unwrap();
        assert_eq!(decoded["title"], "hi");
    }

    #[test]
    fn relative_path_strips_leading_slashes() {
        assert_eq!(ApiRequest::get("//posts/1/").relative_path(), "posts/1/");
        assert_eq!(ApiRequest::get("comments/").relative_path(), "comments/");
    }

    #[test]
    fn query_pairs_preserve_order() {
        let request = ApiRequest::get("/posts/")
            .query("category", "qna")
            .query("page", 2);
        assert_eq!(
            request.query_pairs(),
            [
                ("category".to_string(), "qna".to_string()),
                ("page".to_string(), "2".to_string())
            ]
        );
        assert!(!request.is_retried());
    }
}
