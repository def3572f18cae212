//! Firebase App Distribution integration
//!
//! Uploads pre-release builds and distributes them to tester groups. Requests
//! are authorized with an API key sent in the `x-goog-api-key` header.

use crate::client::{json_str, require_str, StoreBase};
use crate::error::{OperationResult, Result};
use crate::traits::StoreAdapter;
use crate::types::*;
use chrono::Utc;
use reqwest::{Method, RequestBuilder};
use serde_json::{json, Value};
use tracing::info;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// App Distribution keeps a single set of release notes
const DEFAULT_NOTES_LOCALE: &str = "en-US";

/// Firebase App Distribution API client
pub struct FirebaseDistribution {
    base: StoreBase,
}

impl FirebaseDistribution {
    pub fn new(base: StoreBase) -> Self {
        Self { base }
    }

    async fn keyed(&self, method: Method, url: &str) -> Result<RequestBuilder> {
        let key = self.base.token().await?;
        Ok(self.base.http().request(method, url).header(API_KEY_HEADER, key))
    }

    /// `projects/{number}/apps/{app_id}` for a Firebase app id
    fn app_name(&self, app_id: &str) -> Result<String> {
        let number = project_number(app_id).ok_or_else(|| {
            self.base.invalid(format!(
                "{} is not a Firebase app id (expected 1:<project number>:<platform>:<hash>)",
                app_id
            ))
        })?;
        Ok(format!("projects/{}/apps/{}", number, app_id))
    }

    async fn upload_once(&self, request: &UploadRequest) -> Result<UploadResult> {
        self.base.validate_artifact(&request.artifact).await?;
        let app = self.app_name(&request.app_id)?;
        let file_name = request
            .artifact
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("app")
            .to_string();

        info!("Uploading {}...", request.artifact.display());
        let bytes = tokio::fs::read(&request.artifact).await?;
        let url = self.base.url(&format!("/upload/v1/{}/releases:upload", app));
        let http = self
            .keyed(Method::POST, &url)
            .await?
            .header("X-Goog-Upload-File-Name", file_name)
            .header("X-Goog-Upload-Protocol", "raw")
            .header("Content-Type", "application/octet-stream")
            .body(bytes);
        let response = self.base.send_json(http).await?;

        let operation = require_str(&response, "/name")?;
        info!(app = %request.app_id, %operation, "Upload accepted, processing");
        Ok(UploadResult {
            success: true,
            store_id: self.base.id().to_string(),
            build_id: Some(operation),
            status: ReleaseStatus::Processing,
            console_url: Some(console_url(&request.app_id)),
            uploaded_at: Utc::now(),
        })
    }

    /// Attach release notes and distribute an uploaded release to tester groups
    async fn distribute(&self, request: &ReleaseRequest) -> Result<ReleaseResult> {
        let release_name = request
            .build_id
            .as_deref()
            .ok_or_else(|| self.base.invalid("A release name is required to distribute"))?;

        let notes = request
            .release_notes
            .get(DEFAULT_NOTES_LOCALE)
            .or_else(|| request.release_notes.values().next());
        if let Some(notes) = notes {
            let url = self.base.url(&format!(
                "/v1/{}?updateMask=release_notes.text",
                release_name
            ));
            let http = self
                .keyed(Method::PATCH, &url)
                .await?
                .json(&json!({ "releaseNotes": { "text": notes } }));
            self.base.send_json(http).await?;
        }

        let groups: Vec<&str> = request
            .track
            .as_deref()
            .map(|t| t.split(',').map(str::trim).filter(|g| !g.is_empty()).collect())
            .unwrap_or_default();
        if groups.is_empty() {
            return Err(self.base.invalid("At least one tester group is required to distribute"));
        }

        let url = self.base.url(&format!("/v1/{}:distribute", release_name));
        let http = self
            .keyed(Method::POST, &url)
            .await?
            .json(&json!({ "groupAliases": groups }));
        self.base.send_json(http).await?;

        info!(release = release_name, groups = ?groups, "Distributed release");
        Ok(ReleaseResult {
            success: true,
            store_id: self.base.id().to_string(),
            release_id: Some(release_name.to_string()),
            status: ReleaseStatus::Live,
            track: request.track.clone(),
            rollout_fraction: None,
        })
    }

    async fn fetch_status(&self, release: &ReleaseRef) -> Result<StatusReport> {
        let latest = match &release.release_id {
            Some(name) => {
                let url = self.base.url(&format!("/v1/{}", name));
                self.base.send_json(self.keyed(Method::GET, &url).await?).await?
            }
            None => {
                let app = self.app_name(&release.app_id)?;
                let url = self.base.url(&format!("/v1/{}/releases?pageSize=1", app));
                let mut list = self.base.send_json(self.keyed(Method::GET, &url).await?).await?;
                list.pointer_mut("/releases/0").map(Value::take).unwrap_or_default()
            }
        };

        if latest.is_null() {
            return Err(self.base.invalid("The app has no releases"));
        }

        Ok(StatusReport {
            success: true,
            store_id: self.base.id().to_string(),
            release_id: json_str(&latest, "/name"),
            status: ReleaseStatus::Live,
            rollout_fraction: None,
            detail: json_str(&latest, "/displayVersion"),
        })
    }
}

/// Project number embedded in a Firebase app id (`1:1234567890:android:abc`)
fn project_number(app_id: &str) -> Option<&str> {
    let mut parts = app_id.split(':');
    let _version = parts.next()?;
    let number = parts.next()?;
    parts.next()?;
    (!number.is_empty() && number.chars().all(|c| c.is_ascii_digit())).then_some(number)
}

fn console_url(app_id: &str) -> String {
    format!(
        "https://console.firebase.google.com/project/_/appdistribution/app/{}/releases",
        app_id
    )
}

#[async_trait::async_trait]
impl StoreAdapter for FirebaseDistribution {
    fn id(&self) -> &str {
        self.base.id()
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Firebase
    }

    fn capabilities(&self) -> &StoreCapabilities {
        self.base.capabilities()
    }

    async fn authenticate(&self) -> OperationResult<()> {
        self.base.authenticate().await
    }

    async fn upload_build(&self, request: &UploadRequest) -> OperationResult<Support<UploadResult>> {
        self.base
            .with_retry("upload_build", || self.upload_once(request))
            .await
            .map(Support::Supported)
    }

    async fn create_release(&self, request: &ReleaseRequest) -> OperationResult<Support<ReleaseResult>> {
        self.base
            .with_retry("create_release", || self.distribute(request))
            .await
            .map(Support::Supported)
    }

    async fn update_listing(&self, _request: &ListingUpdate) -> OperationResult<Support<ActionResult>> {
        self.base.unsupported(Operation::UpdateListing)
    }

    async fn get_listing(&self, _query: &ListingQuery) -> OperationResult<Support<Listing>> {
        self.base.unsupported(Operation::GetListing)
    }

    async fn promote_release(&self, _request: &PromoteRequest) -> OperationResult<Support<ReleaseResult>> {
        self.base.unsupported(Operation::PromoteRelease)
    }

    async fn set_rollout(&self, _request: &RolloutRequest) -> OperationResult<Support<ReleaseResult>> {
        self.base.unsupported(Operation::SetRollout)
    }

    async fn resume_release(&self, _release: &ReleaseRef) -> OperationResult<Support<ReleaseResult>> {
        self.base.unsupported(Operation::ResumeRelease)
    }

    async fn submit_for_review(&self, _release: &ReleaseRef) -> OperationResult<Support<ActionResult>> {
        self.base.unsupported(Operation::SubmitForReview)
    }

    async fn get_status(&self, release: &ReleaseRef) -> OperationResult<Support<StatusReport>> {
        self.base
            .with_retry("get_status", || self.fetch_status(release))
            .await
            .map(Support::Supported)
    }

    async fn get_analytics(&self, _query: &AnalyticsQuery) -> OperationResult<Support<AnalyticsReport>> {
        self.base.unsupported(Operation::GetAnalytics)
    }

    async fn get_reviews(&self, _query: &ReviewQuery) -> OperationResult<Support<ReviewsPage>> {
        self.base.unsupported(Operation::GetReviews)
    }

    async fn rollback(&self, _release: &ReleaseRef) -> OperationResult<Support<ActionResult>> {
        self.base.unsupported(Operation::Rollback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_number() {
        assert_eq!(project_number("1:1234567890:android:321abc456def7890"), Some("1234567890"));
        assert_eq!(project_number("1:42:ios:ff"), Some("42"));
        assert_eq!(project_number("com.example.app"), None);
        assert_eq!(project_number("1:abc:android:x"), None);
    }
}
