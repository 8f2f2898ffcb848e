//! Usage: Comment endpoints (`/comments/`).

use crate::auth::claims::AccessClaims;
use crate::forum::author;
use crate::forum::posts::list_from_body;
use crate::http::client::ApiClient;
use crate::http::request::ApiRequest;
use crate::shared::error::AppResult;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Comment {
    pub id: i64,
    #[serde(default)]
    pub post: Option<i64>,
    #[serde(default)]
    pub content: String,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Comment {
    fn author_fields(&self) -> Value {
        Value::Object(self.extra.clone())
    }

    pub fn author_display_name(&self) -> String {
        author::author_display_name(&self.author_fields())
    }

    pub fn is_owned_by(&self, claims: &AccessClaims) -> bool {
        author::is_owned_by(&self.author_fields(), claims)
    }
}

fn comment_path(id: i64) -> String {
    format!("/comments/{id}/")
}

fn require_content(content: &str) -> AppResult<&str> {
    let content = content.trim();
    if content.is_empty() {
        return Err("SEC_INVALID_INPUT: comment content is required".into());
    }
    Ok(content)
}

pub async fn list_comments(client: &ApiClient, post_id: i64) -> AppResult<Vec<Comment>> {
    let body: Value = client
        .send_json(ApiRequest::get("/comments/").query("post", post_id))
        .await?;
    list_from_body(body)
}

pub async fn create_comment(client: &ApiClient, post_id: i64, content: &str) -> AppResult<Comment> {
    let content = require_content(content)?;
    let request = ApiRequest::post("/comments/").json(&json!({
        "post": post_id,
        "content": content,
    }))?;
    client.send_json(request).await
}

pub async fn update_comment(client: &ApiClient, id: i64, content: &str) -> AppResult<Comment> {
    let content = require_content(content)?;
    let request = ApiRequest::patch(comment_path(id)).json(&json!({ "content": content }))?;
    client.send_json(request).await
}

pub async fn delete_comment(client: &ApiClient, id: i64) -> AppResult<()> {
    client
        .send_expect_success(ApiRequest::delete(comment_path(id)))
        .await
}
