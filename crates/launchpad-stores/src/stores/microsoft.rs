//! Microsoft Store integration
//!
//! Manages submissions through the Microsoft Store submission API (Partner
//! Center). Authorizes with an Azure AD client-credentials grant.

use crate::client::{json_str, require_str, StoreBase};
use crate::error::{OperationResult, Result};
use crate::traits::StoreAdapter;
use crate::types::*;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::info;

const API_PREFIX: &str = "/v1.0/my/applications";

/// Microsoft Store submission API client
pub struct MicrosoftStore {
    base: StoreBase,
}

impl MicrosoftStore {
    pub fn new(base: StoreBase) -> Self {
        Self { base }
    }

    async fn api_request(&self, method: Method, app_id: &str, path: &str, body: Option<Value>) -> Result<Value> {
        let url = self.base.url(&format!("{}/{}{}", API_PREFIX, app_id, path));
        let mut request = self.base.bearer(method, &url).await?;
        if let Some(body) = body {
            request = request.json(&body);
        }
        self.base.send_json(request).await
    }

    fn submission_id<'a>(&self, release: &'a ReleaseRef) -> Result<&'a str> {
        release
            .release_id
            .as_deref()
            .ok_or_else(|| self.base.invalid("A submission id is required"))
    }

    /// Create a submission cloned from the last published one
    async fn create_submission(&self, request: &ReleaseRequest) -> Result<ReleaseResult> {
        let response = self
            .api_request(Method::POST, &request.app_id, "/submissions", None)
            .await?;
        let submission_id = require_str(&response, "/id")?;

        if let Some(fraction) = request.rollout_fraction.filter(|f| *f < 1.0) {
            let mut submission = response.clone();
            submission["packageRollout"] = json!({
                "isPackageRollout": true,
                "packageRolloutPercentage": fraction * 100.0,
            });
            self.api_request(
                Method::PUT,
                &request.app_id,
                &format!("/submissions/{}", submission_id),
                Some(submission),
            )
            .await?;
        }

        info!(app = %request.app_id, %submission_id, "Created submission");
        Ok(ReleaseResult {
            success: true,
            store_id: self.base.id().to_string(),
            release_id: Some(submission_id),
            status: ReleaseStatus::Draft,
            track: None,
            rollout_fraction: request.rollout_fraction,
        })
    }

    async fn commit(&self, release: &ReleaseRef) -> Result<ActionResult> {
        let submission_id = self.submission_id(release)?;
        let response = self
            .api_request(
                Method::POST,
                &release.app_id,
                &format!("/submissions/{}/commit", submission_id),
                None,
            )
            .await?;

        let status = json_str(&response, "/status").unwrap_or_else(|| "CommitStarted".to_string());
        info!(app = %release.app_id, submission_id, %status, "Committed submission");
        Ok(ActionResult::new(self.base.id(), format!("Submission {}", status))
            .with_reference(submission_id))
    }

    async fn fetch_status(&self, release: &ReleaseRef) -> Result<StatusReport> {
        let submission_id = match &release.release_id {
            Some(id) => id.clone(),
            None => {
                let app = self
                    .api_request(Method::GET, &release.app_id, "", None)
                    .await?;
                json_str(&app, "/pendingApplicationSubmission/id")
                    .or_else(|| json_str(&app, "/lastPublishedApplicationSubmission/id"))
                    .ok_or_else(|| self.base.invalid("The application has no submissions"))?
            }
        };

        let response = self
            .api_request(
                Method::GET,
                &release.app_id,
                &format!("/submissions/{}/status", submission_id),
                None,
            )
            .await?;
        let raw = json_str(&response, "/status");

        Ok(StatusReport {
            success: true,
            store_id: self.base.id().to_string(),
            release_id: Some(submission_id),
            status: raw.as_deref().map(map_status).unwrap_or(ReleaseStatus::Unknown),
            rollout_fraction: None,
            detail: raw,
        })
    }

    async fn update_rollout(&self, request: &RolloutRequest) -> Result<ReleaseResult> {
        let submission_id = self.submission_id(&request.release)?;
        let app_id = &request.release.app_id;

        if request.fraction >= 1.0 {
            self.api_request(
                Method::POST,
                app_id,
                &format!("/submissions/{}/finalizepackagerollout", submission_id),
                None,
            )
            .await?;
        } else {
            let percentage = request.fraction * 100.0;
            self.api_request(
                Method::POST,
                app_id,
                &format!(
                    "/submissions/{}/updatepackagerolloutpercentage?percentage={}",
                    submission_id, percentage
                ),
                None,
            )
            .await?;
        }

        info!(app = %app_id, submission_id, fraction = request.fraction, "Updated package rollout");
        Ok(ReleaseResult {
            success: true,
            store_id: self.base.id().to_string(),
            release_id: Some(submission_id.to_string()),
            status: if request.fraction >= 1.0 {
                ReleaseStatus::Live
            } else {
                ReleaseStatus::InProgress
            },
            track: None,
            rollout_fraction: Some(request.fraction.min(1.0)),
        })
    }
}

fn map_status(status: &str) -> ReleaseStatus {
    match status {
        "PendingCommit" => ReleaseStatus::Draft,
        "CommitStarted" | "PreProcessing" | "Publishing" => ReleaseStatus::Processing,
        "Certification" => ReleaseStatus::InReview,
        "Release" => ReleaseStatus::Approved,
        "Published" => ReleaseStatus::Live,
        "CommitFailed" | "PreProcessingFailed" | "CertificationFailed" | "ReleaseFailed"
        | "Canceled" | "Failed" => ReleaseStatus::Rejected,
        _ => ReleaseStatus::Unknown,
    }
}

#[async_trait::async_trait]
impl StoreAdapter for MicrosoftStore {
    fn id(&self) -> &str {
        self.base.id()
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Microsoft
    }

    fn capabilities(&self) -> &StoreCapabilities {
        self.base.capabilities()
    }

    async fn authenticate(&self) -> OperationResult<()> {
        self.base.authenticate().await
    }

    async fn upload_build(&self, _request: &UploadRequest) -> OperationResult<Support<UploadResult>> {
        self.base.unsupported(Operation::UploadBuild)
    }

    async fn create_release(&self, request: &ReleaseRequest) -> OperationResult<Support<ReleaseResult>> {
        self.base
            .with_retry("create_release", || self.create_submission(request))
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

    async fn set_rollout(&self, request: &RolloutRequest) -> OperationResult<Support<ReleaseResult>> {
        self.base
            .with_retry("set_rollout", || self.update_rollout(request))
            .await
            .map(Support::Supported)
    }

    async fn resume_release(&self, _release: &ReleaseRef) -> OperationResult<Support<ReleaseResult>> {
        self.base.unsupported(Operation::ResumeRelease)
    }

    async fn submit_for_review(&self, release: &ReleaseRef) -> OperationResult<Support<ActionResult>> {
        self.base
            .with_retry("submit_for_review", || self.commit(release))
            .await
            .map(Support::Supported)
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
    fn test_map_status() {
        assert_eq!(map_status("Certification"), ReleaseStatus::InReview);
        assert_eq!(map_status("Published"), ReleaseStatus::Live);
        assert_eq!(map_status("CertificationFailed"), ReleaseStatus::Rejected);
        assert_eq!(map_status("PendingCommit"), ReleaseStatus::Draft);
    }
}
