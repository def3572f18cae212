//! Apple App Store Connect integration
//!
//! Authorizes with a short-lived ES256 JWT issued from an App Store Connect
//! API key. Binaries reach Apple through Xcode or Transporter, so this adapter
//! covers versions, review submissions, listings and customer reviews.

use crate::client::{json_str, require_str, StoreBase};
use crate::error::{OperationResult, Result};
use crate::traits::StoreAdapter;
use crate::types::*;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::info;

const DEFAULT_LOCALE: &str = "en-US";
const DEFAULT_REVIEW_LIMIT: usize = 20;

/// App Store Connect API client
pub struct AppStoreConnect {
    base: StoreBase,
}

impl AppStoreConnect {
    pub fn new(base: StoreBase) -> Self {
        Self { base }
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let request = self.base.bearer(Method::GET, &self.base.url(path)).await?;
        self.base.send_json(request).await
    }

    async fn send(&self, method: Method, path: &str, body: Value) -> Result<Value> {
        let request = self.base.bearer(method, &self.base.url(path)).await?;
        self.base.send_json(request.json(&body)).await
    }

    async fn create_version(&self, request: &ReleaseRequest) -> Result<ReleaseResult> {
        let mut relationships = json!({
            "app": { "data": { "type": "apps", "id": request.app_id } }
        });
        if let Some(build_id) = &request.build_id {
            relationships["build"] = json!({ "data": { "type": "builds", "id": build_id } });
        }

        let body = json!({
            "data": {
                "type": "appStoreVersions",
                "attributes": {
                    "platform": "IOS",
                    "versionString": request.version,
                },
                "relationships": relationships,
            }
        });

        let response = self.send(Method::POST, "/v1/appStoreVersions", body).await?;
        let version_id = require_str(&response, "/data/id")?;
        info!(app = %request.app_id, version = %request.version, %version_id, "Created App Store version");

        Ok(ReleaseResult {
            success: true,
            store_id: self.base.id().to_string(),
            release_id: Some(version_id),
            status: ReleaseStatus::Draft,
            track: None,
            rollout_fraction: None,
        })
    }

    async fn fetch_listing(&self, query: &ListingQuery) -> Result<Listing> {
        let locale = query.locale.as_deref().unwrap_or(DEFAULT_LOCALE);

        let infos = self
            .get(&format!("/v1/apps/{}/appInfos", query.app_id))
            .await?;
        let info_id = require_str(&infos, "/data/0/id")?;

        let localizations = self
            .get(&format!("/v1/appInfos/{}/appInfoLocalizations", info_id))
            .await?;
        let localization = localizations["data"]
            .as_array()
            .and_then(|items| {
                items
                    .iter()
                    .find(|item| item["attributes"]["locale"] == locale)
            })
            .cloned()
            .unwrap_or(Value::Null);

        Ok(Listing {
            success: true,
            store_id: self.base.id().to_string(),
            locale: locale.to_string(),
            title: json_str(&localization, "/attributes/name"),
            short_description: json_str(&localization, "/attributes/subtitle"),
            full_description: None,
        })
    }

    async fn submit(&self, release: &ReleaseRef) -> Result<ActionResult> {
        let version_id = release.release_id.as_deref().ok_or_else(|| {
            self.base
                .invalid("An App Store version id is required to submit for review")
        })?;

        let submission = self
            .send(
                Method::POST,
                "/v1/reviewSubmissions",
                json!({
                    "data": {
                        "type": "reviewSubmissions",
                        "attributes": { "platform": "IOS" },
                        "relationships": {
                            "app": { "data": { "type": "apps", "id": release.app_id } }
                        }
                    }
                }),
            )
            .await?;
        let submission_id = require_str(&submission, "/data/id")?;

        self.send(
            Method::POST,
            "/v1/reviewSubmissionItems",
            json!({
                "data": {
                    "type": "reviewSubmissionItems",
                    "relationships": {
                        "reviewSubmission": {
                            "data": { "type": "reviewSubmissions", "id": submission_id }
                        },
                        "appStoreVersion": {
                            "data": { "type": "appStoreVersions", "id": version_id }
                        }
                    }
                }
            }),
        )
        .await?;

        self.send(
            Method::PATCH,
            &format!("/v1/reviewSubmissions/{}", submission_id),
            json!({
                "data": {
                    "type": "reviewSubmissions",
                    "id": submission_id,
                    "attributes": { "submitted": true }
                }
            }),
        )
        .await?;

        info!(app = %release.app_id, %version_id, %submission_id, "Submitted for App Review");
        Ok(ActionResult::new(self.base.id(), "Submitted for App Review").with_reference(submission_id))
    }

    async fn fetch_status(&self, release: &ReleaseRef) -> Result<StatusReport> {
        let version = match &release.release_id {
            Some(id) => {
                let mut response = self.get(&format!("/v1/appStoreVersions/{}", id)).await?;
                response.pointer_mut("/data").map(Value::take).unwrap_or_default()
            }
            None => {
                let mut response = self
                    .get(&format!("/v1/apps/{}/appStoreVersions?limit=1", release.app_id))
                    .await?;
                response.pointer_mut("/data/0").map(Value::take).unwrap_or_default()
            }
        };

        let state = json_str(&version, "/attributes/appStoreState");
        Ok(StatusReport {
            success: true,
            store_id: self.base.id().to_string(),
            release_id: json_str(&version, "/id"),
            status: state.as_deref().map(map_state).unwrap_or(ReleaseStatus::Unknown),
            rollout_fraction: None,
            detail: state,
        })
    }

    async fn fetch_reviews(&self, query: &ReviewQuery) -> Result<ReviewsPage> {
        let limit = query.limit.unwrap_or(DEFAULT_REVIEW_LIMIT);
        let response = self
            .get(&format!(
                "/v1/apps/{}/customerReviews?limit={}&sort=-createdDate",
                query.app_id, limit
            ))
            .await?;

        let reviews = response["data"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .map(|item| UserReview {
                        id: json_str(item, "/id").unwrap_or_default(),
                        rating: item["attributes"]["rating"].as_u64().map(|r| r as u8),
                        title: json_str(item, "/attributes/title"),
                        body: json_str(item, "/attributes/body"),
                        author: json_str(item, "/attributes/reviewerNickname"),
                        created_at: json_str(item, "/attributes/createdDate"),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(ReviewsPage {
            success: true,
            store_id: self.base.id().to_string(),
            reviews,
        })
    }
}

fn map_state(state: &str) -> ReleaseStatus {
    match state {
        "PREPARE_FOR_SUBMISSION" | "DEVELOPER_REMOVED_FROM_SALE" => ReleaseStatus::Draft,
        "PROCESSING_FOR_APP_STORE" => ReleaseStatus::Processing,
        "WAITING_FOR_REVIEW" | "IN_REVIEW" => ReleaseStatus::InReview,
        "PENDING_DEVELOPER_RELEASE" | "PENDING_APPLE_RELEASE" => ReleaseStatus::Approved,
        "REJECTED" | "METADATA_REJECTED" | "INVALID_BINARY" => ReleaseStatus::Rejected,
        "READY_FOR_SALE" | "READY_FOR_DISTRIBUTION" => ReleaseStatus::Live,
        _ => ReleaseStatus::Unknown,
    }
}

#[async_trait::async_trait]
impl StoreAdapter for AppStoreConnect {
    fn id(&self) -> &str {
        self.base.id()
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Apple
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
            .with_retry("create_release", || self.create_version(request))
            .await
            .map(Support::Supported)
    }

    async fn update_listing(&self, _request: &ListingUpdate) -> OperationResult<Support<ActionResult>> {
        self.base.unsupported(Operation::UpdateListing)
    }

    async fn get_listing(&self, query: &ListingQuery) -> OperationResult<Support<Listing>> {
        self.base
            .with_retry("get_listing", || self.fetch_listing(query))
            .await
            .map(Support::Supported)
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

    async fn submit_for_review(&self, release: &ReleaseRef) -> OperationResult<Support<ActionResult>> {
        self.base
            .with_retry("submit_for_review", || self.submit(release))
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

    async fn get_reviews(&self, query: &ReviewQuery) -> OperationResult<Support<ReviewsPage>> {
        self.base
            .with_retry("get_reviews", || self.fetch_reviews(query))
            .await
            .map(Support::Supported)
    }

    async fn rollback(&self, _release: &ReleaseRef) -> OperationResult<Support<ActionResult>> {
        self.base.unsupported(Operation::Rollback)
    }
}
