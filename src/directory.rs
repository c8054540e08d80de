//! Client for the hosted document database.
//!
//! The store owns all persistent data; this service issues keyed reads and a
//! small set of writes over its REST surface and never caches documents.
//! The authorization core only ever reads (one user-record lookup per
//! resolution); the write methods exist for the resource handlers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("document store unavailable: {0}")]
    Unavailable(String),
    #[error("document store rejected request: HTTP {status}: {detail}")]
    Rejected { status: u16, detail: String },
    #[error("undecodable document: {0}")]
    Decode(String),
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Role-and-scope record keyed by provider subject id. This is the fallback
/// source of truth when a credential carries no usable embedded claims.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub subject_id: String,
    pub role: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub hostel_id: Option<String>,
    #[serde(default)]
    pub floor_ids: Option<Vec<String>>,
    #[serde(default)]
    pub room_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StudentDoc {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub hostel_id: String,
    pub floor_id: String,
    pub room_id: String,
    /// Provider subject id of the student account. Differs from `id` only
    /// in stores that predate id canonicalization.
    #[serde(default)]
    pub subject_id: Option<String>,
}

/// Self-service profile fields. Placement (hostel/floor/room) is
/// deliberately not patchable through this type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl StudentPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.phone.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomDoc {
    pub id: String,
    pub hostel_id: String,
    pub floor_id: String,
    pub capacity: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum IssueStatus {
    Open,
    InProgress,
    Resolved,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IssueDoc {
    pub id: String,
    pub hostel_id: String,
    pub floor_id: String,
    pub room_id: String,
    pub title: String,
    pub description: String,
    pub status: IssueStatus,
    pub reported_by: String,
    #[serde(default)]
    pub resolution_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait Directory: Send + Sync {
    async fn user_record(&self, subject_id: &str) -> DirectoryResult<Option<UserRecord>>;

    async fn student(&self, id: &str) -> DirectoryResult<Option<StudentDoc>>;
    async fn students_in(
        &self,
        hostel_id: &str,
        floor_id: Option<&str>,
    ) -> DirectoryResult<Vec<StudentDoc>>;
    async fn all_students(&self) -> DirectoryResult<Vec<StudentDoc>>;
    async fn update_student(&self, id: &str, patch: &StudentPatch) -> DirectoryResult<()>;
    /// Re-keys a student document, preserving contents. Used by the
    /// id-canonicalization sweep.
    async fn rewrite_student_id(&self, old_id: &str, new_id: &str) -> DirectoryResult<()>;

    async fn room(&self, id: &str) -> DirectoryResult<Option<RoomDoc>>;
    async fn rooms_in(
        &self,
        hostel_id: &str,
        floor_id: Option<&str>,
    ) -> DirectoryResult<Vec<RoomDoc>>;
    async fn occupants(&self, room_id: &str) -> DirectoryResult<Vec<StudentDoc>>;

    async fn issue(&self, id: &str) -> DirectoryResult<Option<IssueDoc>>;
    async fn issues_in(
        &self,
        hostel_id: &str,
        floor_id: Option<&str>,
    ) -> DirectoryResult<Vec<IssueDoc>>;
    async fn create_issue(&self, doc: &IssueDoc) -> DirectoryResult<()>;
    async fn update_issue(
        &self,
        id: &str,
        status: IssueStatus,
        resolution_note: Option<&str>,
    ) -> DirectoryResult<()>;
}

/// REST client for the hosted store. One instance per process, built at
/// startup around the shared outbound client and injected into handlers.
pub struct HttpDirectory {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpDirectory {
    pub fn new(http: reqwest::Client, base_url: String, api_key: String) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self { http, base_url, api_key }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get_doc<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> DirectoryResult<Option<T>> {
        let resp = self
            .http
            .get(self.url(path))
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;
        match resp.status() {
            s if s == reqwest::StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => resp
                .json::<T>()
                .await
                .map(Some)
                .map_err(|e| DirectoryError::Decode(e.to_string())),
            s => Err(rejected(s, resp).await),
        }
    }

    async fn list_docs<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> DirectoryResult<Vec<T>> {
        let resp = self
            .http
            .get(self.url(path))
            .header("x-api-key", &self.api_key)
            .query(query)
            .send()
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(rejected(status, resp).await);
        }
        resp.json::<Vec<T>>()
            .await
            .map_err(|e| DirectoryError::Decode(e.to_string()))
    }

    async fn send_write(&self, req: reqwest::RequestBuilder) -> DirectoryResult<()> {
        let resp = req
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(rejected(status, resp).await);
        }
        Ok(())
    }
}

async fn rejected(status: reqwest::StatusCode, resp: reqwest::Response) -> DirectoryError {
    if status.is_server_error() {
        return DirectoryError::Unavailable(format!("HTTP {status}"));
    }
    let detail = resp.text().await.unwrap_or_default();
    DirectoryError::Rejected { status: status.as_u16(), detail }
}

fn scope_query<'a>(hostel_id: &'a str, floor_id: Option<&'a str>) -> Vec<(&'static str, &'a str)> {
    let mut q = vec![("hostelId", hostel_id)];
    if let Some(f) = floor_id {
        q.push(("floorId", f));
    }
    q
}

#[async_trait]
impl Directory for HttpDirectory {
    async fn user_record(&self, subject_id: &str) -> DirectoryResult<Option<UserRecord>> {
        self.get_doc(&format!("users/{subject_id}")).await
    }

    async fn student(&self, id: &str) -> DirectoryResult<Option<StudentDoc>> {
        self.get_doc(&format!("students/{id}")).await
    }

    async fn students_in(
        &self,
        hostel_id: &str,
        floor_id: Option<&str>,
    ) -> DirectoryResult<Vec<StudentDoc>> {
        self.list_docs("students", &scope_query(hostel_id, floor_id)).await
    }

    async fn all_students(&self) -> DirectoryResult<Vec<StudentDoc>> {
        self.list_docs("students", &[]).await
    }

    async fn update_student(&self, id: &str, patch: &StudentPatch) -> DirectoryResult<()> {
        self.send_write(self.http.patch(self.url(&format!("students/{id}"))).json(patch))
            .await
    }

    async fn rewrite_student_id(&self, old_id: &str, new_id: &str) -> DirectoryResult<()> {
        self.send_write(
            self.http
                .post(self.url(&format!("students/{old_id}/rewrite")))
                .json(&serde_json::json!({ "newId": new_id })),
        )
        .await
    }

    async fn room(&self, id: &str) -> DirectoryResult<Option<RoomDoc>> {
        self.get_doc(&format!("rooms/{id}")).await
    }

    async fn rooms_in(
        &self,
        hostel_id: &str,
        floor_id: Option<&str>,
    ) -> DirectoryResult<Vec<RoomDoc>> {
        self.list_docs("rooms", &scope_query(hostel_id, floor_id)).await
    }

    async fn occupants(&self, room_id: &str) -> DirectoryResult<Vec<StudentDoc>> {
        self.list_docs(&format!("rooms/{room_id}/occupants"), &[]).await
    }

    async fn issue(&self, id: &str) -> DirectoryResult<Option<IssueDoc>> {
        self.get_doc(&format!("issues/{id}")).await
    }

    async fn issues_in(
        &self,
        hostel_id: &str,
        floor_id: Option<&str>,
    ) -> DirectoryResult<Vec<IssueDoc>> {
        self.list_docs("issues", &scope_query(hostel_id, floor_id)).await
    }

    async fn create_issue(&self, doc: &IssueDoc) -> DirectoryResult<()> {
        self.send_write(self.http.post(self.url("issues")).json(doc)).await
    }

    async fn update_issue(
        &self,
        id: &str,
        status: IssueStatus,
        resolution_note: Option<&str>,
    ) -> DirectoryResult<()> {
        let body = serde_json::json!({
            "status": status,
            "resolutionNote": resolution_note,
        });
        self.send_write(self.http.patch(self.url(&format!("issues/{id}"))).json(&body))
            .await
    }
}
