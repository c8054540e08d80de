//! Image CDN client: room photo listings, signed direct-upload tickets and
//! deletions. Uploads themselves go straight from the client to the CDN;
//! this service only issues the signature once the authorization gate has
//! allowed the operation, so the gate stays in front of every image write.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CdnError {
    #[error("image CDN unavailable: {0}")]
    Unavailable(String),
    #[error("image CDN rejected request: HTTP {status}: {detail}")]
    Rejected { status: u16, detail: String },
}

pub type CdnResult<T> = Result<T, CdnError>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredImage {
    pub public_id: String,
    pub secure_url: String,
    #[serde(default)]
    pub bytes: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ListingResponse {
    #[serde(default)]
    resources: Vec<StoredImage>,
}

/// Everything a browser needs to upload one image directly to the CDN.
#[derive(Debug, Clone, Serialize)]
pub struct UploadTicket {
    pub api_key: String,
    pub folder: String,
    pub timestamp: i64,
    pub signature: String,
}

pub struct ImageStore {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl ImageStore {
    pub fn new(http: reqwest::Client, base_url: String, api_key: String, api_secret: String) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self { http, base_url, api_key, api_secret }
    }

    fn folder_for_room(room_id: &str) -> String {
        format!("rooms/{room_id}")
    }

    pub async fn list_room_images(&self, room_id: &str) -> CdnResult<Vec<StoredImage>> {
        let resp = self
            .http
            .get(format!("{}/resources/image", self.base_url))
            .basic_auth(&self.api_key, Some(&self.api_secret))
            .query(&[("prefix", Self::folder_for_room(room_id).as_str())])
            .send()
            .await
            .map_err(|e| CdnError::Unavailable(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(rejected(status, resp).await);
        }
        let listing: ListingResponse =
            resp.json().await.map_err(|e| CdnError::Unavailable(e.to_string()))?;
        Ok(listing.resources)
    }

    /// Issue signed parameters for one direct upload into the room's folder.
    pub fn upload_ticket_for_room(&self, room_id: &str) -> UploadTicket {
        let folder = Self::folder_for_room(room_id);
        let timestamp = Utc::now().timestamp();
        let signature = sign_params(&folder, timestamp, &self.api_secret);
        UploadTicket { api_key: self.api_key.clone(), folder, timestamp, signature }
    }

    pub async fn delete_image(&self, public_id: &str) -> CdnResult<()> {
        let resp = self
            .http
            .delete(format!("{}/resources/image", self.base_url))
            .basic_auth(&self.api_key, Some(&self.api_secret))
            .query(&[("public_ids[]", public_id)])
            .send()
            .await
            .map_err(|e| CdnError::Unavailable(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(rejected(status, resp).await);
        }
        Ok(())
    }
}

async fn rejected(status: reqwest::StatusCode, resp: reqwest::Response) -> CdnError {
    if status.is_server_error() {
        return CdnError::Unavailable(format!("HTTP {status}"));
    }
    let detail = resp.text().await.unwrap_or_default();
    CdnError::Rejected { status: status.as_u16(), detail }
}

/// SHA-1 digest over the sorted upload parameters plus the API secret, hex
/// encoded, per the CDN's signed-upload contract.
fn sign_params(folder: &str, timestamp: i64, secret: &str) -> String {
    let payload = format!("folder={folder}&timestamp={timestamp}{secret}");
    let mut hasher = Sha1::new();
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_matches_known_vector() {
        let sig = sign_params("rooms/R1", 1_700_000_000, "topsecret");
        assert_eq!(sig, "4b805c75868f1dd438a5dc1b8aef5e7ece34dd5f");
    }

    #[test]
    fn signature_varies_with_each_input() {
        let base = sign_params("rooms/R1", 1_700_000_000, "topsecret");
        assert_ne!(base, sign_params("rooms/R2", 1_700_000_000, "topsecret"));
        assert_ne!(base, sign_params("rooms/R1", 1_700_000_001, "topsecret"));
        assert_ne!(base, sign_params("rooms/R1", 1_700_000_000, "other"));
    }
}
