//! Usage: Post endpoints (`/posts/`).

use crate::auth::claims::AccessClaims;
use crate::forum::author;
use crate::http::client::ApiClient;
use crate::http::request::ApiRequest;
use crate::shared::error::{AppError, AppResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Post {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default, alias = "createdAt", alias = "created")]
    pub created_at: Option<String>,
    /// Author fields and anything else the serializer adds.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Post {
    fn author_fields(&self) -> Value {
        Value::Object(self.extra.clone())
    }

    pub fn author_name(&self) -> Option<String> {
        author::author_name(&self.author_fields())
    }

    pub fn author_display_name(&self) -> String {
        author::author_display_name(&self.author_fields())
    }

    pub fn author_id(&self) -> Option<i64> {
        author::author_id(&self.author_fields())
    }

    pub fn is_owned_by(&self, claims: &AccessClaims) -> bool {
        author::is_owned_by(&self.author_fields(), claims)
    }

    /// `YYYY-MM-DD` prefix of the creation timestamp.
    pub fn created_date(&self) -> Option<&str> {
        let created = self.created_at.as_deref()?.trim();
        created.get(..10).or(Some(created)).filter(|s| !s.is_empty())
    }
}

/// Body of `POST /posts/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPost {
    pub title: String,
    /// Rich-text HTML.
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl NewPost {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            category: None,
        }
    }

    pub fn in_category(mut self, slug: impl Into<String>) -> Self {
        self.category = Some(slug.into());
        self
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.title.trim().is_empty() || is_blank_html(&self.content) {
            return Err("SEC_INVALID_INPUT: title and content are required".into());
        }
        Ok(())
    }
}

/// Body of `PATCH /posts/{id}/`; unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PostPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl PostPatch {
    pub fn validate(&self) -> AppResult<()> {
        if self.title.is_none() && self.content.is_none() && self.category.is_none() {
            return Err("SEC_INVALID_INPUT: nothing to update".into());
        }
        if self.title.as_deref().is_some_and(|t| t.trim().is_empty())
            || self.content.as_deref().is_some_and(is_blank_html)
        {
            return Err("SEC_INVALID_INPUT: title and content cannot be empty".into());
        }
        Ok(())
    }
}

fn html_tag_regex() -> &'static Regex {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    TAGS.get_or_init(|| Regex::new(r"<[^>]*>").expect("static regex"))
}

/// True for empty editor output such as `<p><br></p>`.
pub(crate) fn is_blank_html(content: &str) -> bool {
    html_tag_regex()
        .replace_all(content, "")
        .replace("&nbsp;", " ")
        .trim()
        .is_empty()
}

fn post_path(id: i64) -> String {
    format!("/posts/{id}/")
}

/// List endpoints answer either a bare array or a paginated `{"results": [...]}`.
pub(crate) fn list_from_body<T: serde::de::DeserializeOwned>(body: Value) -> AppResult<Vec<T>> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("results") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    items
        .into_iter()
        .map(|item| {
            serde_json::from_value(item)
                .map_err(|e| AppError::from(format!("SYSTEM_ERROR: unexpected list item shape: {e}")))
        })
        .collect()
}

pub async fn list_posts(client: &ApiClient, category: Option<&str>) -> AppResult<Vec<Post>> {
    let mut request = ApiRequest::get("/posts/");
    if let Some(slug) = category.map(str::trim).filter(|s| !s.is_empty()) {
        request = request.query("category", slug);
    }
    let body: Value = client.send_json(request).await?;
    list_from_body(body)
}

pub async fn get_post(client: &ApiClient, id: i64) -> AppResult<Post> {
    client.send_json(ApiRequest::get(post_path(id))).await
}

pub async fn create_post(client: &ApiClient, post: &NewPost) -> AppResult<Post> {
    post.validate()?;
    let created: Post = client
        .send_json(ApiRequest::post("/posts/").json(post)?)
        .await?;
    tracing::info!(post_id = created.id, "post created");
    Ok(created)
}

pub async fn update_post(client: &ApiClient, id: i64, patch: &PostPatch) -> AppResult<Post> {
    patch.validate()?;
    client
        .send_json(ApiRequest::patch(post_path(id)).json(patch)?)
        .await
}

pub async fn delete_post(client: &ApiClient, id: i64) -> AppResult<()> {
    client
        .send_expect_success(ApiRequest::delete(post_path(id)))
        .await?;
    tracing::info!(post_id = id, "post deleted");
    Ok(())
}
