#![allow(dead_code)]

use std::sync::Arc;

use chrono::Duration;
use serde_json::Value;
use tempfile::TempDir;
use warp::{http::StatusCode, test::request};

use recipe_api::{
    context::AppContext,
    cryptography::hash_password,
    jwt::SessionKeys,
    memory::MemoryStore,
    routes::routes,
    schema::{Attribute, AttributeKind, NewUser, User},
    MediaStorage,
};

pub const PASSWORD: &str = "testpass123";

pub struct TestApp {
    pub ctx: AppContext,
    pub store: Arc<MemoryStore>,
    pub media_root: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        let media_root = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let keys = SessionKeys::new(b"integration-test-secret", Duration::hours(1)).unwrap();
        let media = MediaStorage::new(media_root.path(), 1024 * 1024);

        Self {
            ctx: AppContext::new(store.clone(), keys, media),
            store,
            media_root,
        }
    }

    /// Inserts an active user directly and returns it with a valid token.
    pub async fn user(&self, email: &str) -> (User, String) {
        let user = self
            .store
            .with_state(|state| {
                state.insert_user(NewUser {
                    email: email.to_owned(),
                    name: String::from("Test Name"),
                    password: hash_password(PASSWORD).unwrap(),
                    is_staff: false,
                    is_superuser: false,
                })
            })
            .await
            .unwrap();
        let token = self.ctx.keys.generate_jwt_session(&user).unwrap();

        (user, token)
    }

    pub async fn attributes(&self, kind: AttributeKind, user: &User) -> Vec<Attribute> {
        self.store
            .with_state(|state| state.attributes_of(kind, user.id))
            .await
    }

    pub async fn send(
        &self,
        method: &str,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = request().method(method).path(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Token {token}"));
        }
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder.reply(&routes(self.ctx.clone())).await;
        let body = if response.body().is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(response.body()).unwrap_or(Value::Null)
        };

        (response.status(), body)
    }

    pub async fn get(&self, path: &str, token: &str) -> (StatusCode, Value) {
        self.send("GET", path, Some(token), None).await
    }

    pub async fn post(&self, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send("POST", path, Some(token), Some(body)).await
    }

    pub async fn patch(&self, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send("PATCH", path, Some(token), Some(body)).await
    }

    pub async fn put(&self, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send("PUT", path, Some(token), Some(body)).await
    }
}

pub fn names(rows: &[Attribute]) -> Vec<&str> {
    rows.iter().map(|row| row.name.as_str()).collect()
}

pub fn json_names(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|rows| {
            rows.iter()
                .filter_map(|row| row["name"].as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default()
}

pub fn detail_url(id: i64) -> String {
    format!("/api/recipe/recipes/{id}/")
}
