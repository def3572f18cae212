//! Google Play Store integration
//!
//! Provides upload and release management via the Google Play Developer API.
//!
//! ## Authentication
//!
//! Uses a Google Cloud service account with Google Play Developer API access.
//! Every change happens inside an edit that is committed at the end of the
//! attempt; a failed attempt leaves its edit to expire.

use crate::client::{json_str, require_str, StoreBase};
use crate::error::{OperationResult, Result};
use crate::traits::StoreAdapter;
use crate::types::*;
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, info};

const API_PREFIX: &str = "/androidpublisher/v3/applications";
const UPLOAD_PREFIX: &str = "/upload/androidpublisher/v3/applications";
const DEFAULT_TRACK: &str = "internal";
const STATUS_TRACK: &str = "production";
const DEFAULT_REVIEW_LIMIT: usize = 20;

/// Google Play Developer API client
pub struct GooglePlayStore {
    base: StoreBase,
}

impl GooglePlayStore {
    pub fn new(base: StoreBase) -> Self {
        Self { base }
    }

    fn app_url(&self, package: &str, path: &str) -> String {
        self.base.url(&format!("{}/{}{}", API_PREFIX, package, path))
    }

    async fn api_request(&self, method: Method, url: &str, body: Option<Value>) -> Result<Value> {
        let mut request = self.base.bearer(method.clone(), url).await?;
        if let Some(body) = body {
            request = request.json(&body);
        }
        debug!("Making {} request to {}", method, url);
        self.base.send_json(request).await
    }

    /// Create a new edit session
    async fn create_edit(&self, package: &str) -> Result<String> {
        let response = self
            .api_request(Method::POST, &self.app_url(package, "/edits"), Some(json!({})))
            .await?;
        require_str(&response, "/id")
    }

    /// Commit an edit
    async fn commit_edit(&self, package: &str, edit_id: &str) -> Result<()> {
        let url = self.app_url(package, &format!("/edits/{}:commit", edit_id));
        self.api_request(Method::POST, &url, None).await?;
        Ok(())
    }

    async fn get_track(&self, package: &str, edit_id: &str, track: &str) -> Result<Value> {
        let url = self.app_url(package, &format!("/edits/{}/tracks/{}", edit_id, track));
        self.api_request(Method::GET, &url, None).await
    }

    async fn put_track(&self, package: &str, edit_id: &str, track: &str, releases: Vec<Value>) -> Result<()> {
        let url = self.app_url(package, &format!("/edits/{}/tracks/{}", edit_id, track));
        let body = json!({ "track": track, "releases": releases });
        self.api_request(Method::PUT, &url, Some(body)).await?;
        Ok(())
    }

    /// Upload an APK or AAB to an edit, returning its version code
    async fn upload_binary(&self, package: &str, edit_id: &str, request: &UploadRequest) -> Result<String> {
        let ext = request
            .artifact
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        let upload_type = match ext.as_str() {
            "aab" => "bundles",
            _ => "apks",
        };

        let url = self.base.url(&format!(
            "{}/{}/edits/{}/{}?uploadType=media",
            UPLOAD_PREFIX, package, edit_id, upload_type
        ));
        let file_content = tokio::fs::read(&request.artifact).await?;

        let http = self
            .base
            .bearer(Method::POST, &url)
            .await?
            .header("Content-Type", "application/octet-stream")
            .body(file_content);
        let response = self.base.send_json(http).await?;
        require_str(&response, "/versionCode")
    }

    async fn upload_once(&self, request: &UploadRequest) -> Result<UploadResult> {
        self.base.validate_artifact(&request.artifact).await?;
        let package = &request.app_id;

        info!("Creating edit session...");
        let edit_id = self.create_edit(package).await?;

        info!("Uploading {}...", request.artifact.display());
        let version_code = self.upload_binary(package, &edit_id, request).await?;

        if let Some(track) = &request.track {
            info!("Assigning to track '{}'...", track);
            let release = release_body(None, &version_code, None, &request.release_notes);
            self.put_track(package, &edit_id, track, vec![release]).await?;
        }

        info!("Committing edit...");
        self.commit_edit(package, &edit_id).await?;

        Ok(UploadResult {
            success: true,
            store_id: self.base.id().to_string(),
            build_id: Some(version_code),
            status: ReleaseStatus::Processing,
            console_url: Some(console_url(package)),
            uploaded_at: Utc::now(),
        })
    }

    async fn create_release_once(&self, request: &ReleaseRequest) -> Result<ReleaseResult> {
        let version_code = request
            .build_id
            .as_deref()
            .ok_or_else(|| self.base.invalid("A version code is required to create a Google Play release"))?;
        let track = request.track.as_deref().unwrap_or(DEFAULT_TRACK);
        let fraction = request.rollout_fraction.filter(|f| *f < 1.0);

        let edit_id = self.create_edit(&request.app_id).await?;
        let release = release_body(
            Some(&request.version),
            version_code,
            fraction,
            &request.release_notes,
        );
        self.put_track(&request.app_id, &edit_id, track, vec![release])
            .await?;
        self.commit_edit(&request.app_id, &edit_id).await?;

        info!(package = %request.app_id, track, version_code, "Created release");
        Ok(ReleaseResult {
            success: true,
            store_id: self.base.id().to_string(),
            release_id: Some(version_code.to_string()),
            status: if fraction.is_some() {
                ReleaseStatus::InProgress
            } else {
                ReleaseStatus::Live
            },
            track: Some(track.to_string()),
            rollout_fraction: fraction,
        })
    }

    async fn promote_once(&self, request: &PromoteRequest) -> Result<ReleaseResult> {
        let fraction = request.rollout_fraction.filter(|f| *f < 1.0);
        let edit_id = self.create_edit(&request.app_id).await?;

        let release = release_body(None, &request.build_id, fraction, &HashMap::new());
        self.put_track(&request.app_id, &edit_id, &request.to_track, vec![release])
            .await?;
        self.commit_edit(&request.app_id, &edit_id).await?;

        info!(
            package = %request.app_id,
            from = %request.from_track,
            to = %request.to_track,
            version_code = %request.build_id,
            "Promoted release"
        );
        Ok(ReleaseResult {
            success: true,
            store_id: self.base.id().to_string(),
            release_id: Some(request.build_id.clone()),
            status: if fraction.is_some() {
                ReleaseStatus::InProgress
            } else {
                ReleaseStatus::Live
            },
            track: Some(request.to_track.clone()),
            rollout_fraction: fraction,
        })
    }

    /// Rewrite the matching release of a track and commit
    ///
    /// `from_status` selects the release to change when no version code is given.
    async fn update_release(
        &self,
        release: &ReleaseRef,
        from_status: &str,
        to_status: &str,
        fraction: Option<f64>,
    ) -> Result<ReleaseResult> {
        let track = release.track.as_deref().unwrap_or(STATUS_TRACK);
        let edit_id = self.create_edit(&release.app_id).await?;
        let current = self.get_track(&release.app_id, &edit_id, track).await?;

        let mut releases = current["releases"].as_array().cloned().unwrap_or_default();
        let index = find_release(&releases, release.release_id.as_deref(), from_status)
            .ok_or_else(|| {
                self.base.invalid(format!(
                    "No {} release found on track '{}'",
                    from_status, track
                ))
            })?;

        let target = &mut releases[index];
        if let Some(entry) = target.as_object_mut() {
            entry.insert("status".to_string(), json!(to_status));
            match fraction {
                Some(f) => {
                    entry.insert("userFraction".to_string(), json!(f));
                }
                None if to_status == "completed" => {
                    entry.remove("userFraction");
                }
                None => {}
            }
        }
        let version_code = json_str(target, "/versionCodes/0");
        let user_fraction = target["userFraction"].as_f64();

        self.put_track(&release.app_id, &edit_id, track, releases)
            .await?;
        self.commit_edit(&release.app_id, &edit_id).await?;

        info!(package = %release.app_id, track, status = to_status, "Updated release");
        Ok(ReleaseResult {
            success: true,
            store_id: self.base.id().to_string(),
            release_id: version_code,
            status: map_status(to_status),
            track: Some(track.to_string()),
            rollout_fraction: user_fraction,
        })
    }

    async fn set_rollout_once(&self, request: &RolloutRequest) -> Result<ReleaseResult> {
        if !(0.0..=1.0).contains(&request.fraction) || request.fraction == 0.0 {
            return Err(self.base.invalid(format!(
                "Rollout fraction must be in (0, 1], got {}",
                request.fraction
            )));
        }

        if request.fraction >= 1.0 {
            self.update_release(&request.release, "inProgress", "completed", None)
                .await
        } else {
            self.update_release(
                &request.release,
                "inProgress",
                "inProgress",
                Some(request.fraction),
            )
            .await
        }
    }

    async fn status_once(&self, release: &ReleaseRef) -> Result<StatusReport> {
        let track = release.track.as_deref().unwrap_or(STATUS_TRACK);
        let edit_id = self.create_edit(&release.app_id).await?;
        let current = self.get_track(&release.app_id, &edit_id, track).await?;

        let releases = current["releases"].as_array().cloned().unwrap_or_default();
        let selected = match &release.release_id {
            Some(code) => releases
                .iter()
                .find(|r| has_version_code(r, code))
                .cloned(),
            None => releases.first().cloned(),
        }
        .unwrap_or(Value::Null);

        let raw = json_str(&selected, "/status");
        Ok(StatusReport {
            success: true,
            store_id: self.base.id().to_string(),
            release_id: json_str(&selected, "/versionCodes/0"),
            status: raw.as_deref().map(map_status).unwrap_or(ReleaseStatus::Unknown),
            rollout_fraction: selected["userFraction"].as_f64(),
            detail: raw,
        })
    }

    async fn reviews_once(&self, query: &ReviewQuery) -> Result<ReviewsPage> {
        let limit = query.limit.unwrap_or(DEFAULT_REVIEW_LIMIT);
        let url = self.app_url(&query.app_id, &format!("/reviews?maxResults={}", limit));
        let response = self.api_request(Method::GET, &url, None).await?;

        let reviews = response["reviews"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .map(|item| UserReview {
                        id: json_str(item, "/reviewId").unwrap_or_default(),
                        rating: item
                            .pointer("/comments/0/userComment/starRating")
                            .and_then(Value::as_u64)
                            .map(|r| r as u8),
                        title: None,
                        body: json_str(item, "/comments/0/userComment/text")
                            .map(|t| t.trim().to_string()),
                        author: json_str(item, "/authorName"),
                        created_at: json_str(item, "/comments/0/userComment/lastModified/seconds"),
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

fn console_url(package: &str) -> String {
    format!(
        "https://play.google.com/console/developers/app/{}/tracks",
        package
    )
}

/// Track release entry for a single version code
fn release_body(
    name: Option<&str>,
    version_code: &str,
    fraction: Option<f64>,
    release_notes: &HashMap<String, String>,
) -> Value {
    let mut release = json!({
        "versionCodes": [version_code],
        "status": if fraction.is_some() { "inProgress" } else { "completed" }
    });

    if let Some(name) = name {
        release["name"] = json!(name);
    }
    if let Some(fraction) = fraction {
        release["userFraction"] = json!(fraction);
    }

    let mut notes: Vec<(&String, &String)> = release_notes.iter().collect();
    notes.sort();
    if !notes.is_empty() {
        release["releaseNotes"] = notes
            .into_iter()
            .map(|(lang, text)| json!({ "language": lang, "text": text }))
            .collect();
    }

    release
}

fn has_version_code(release: &Value, code: &str) -> bool {
    release["versionCodes"]
        .as_array()
        .is_some_and(|codes| codes.iter().any(|c| c.as_str() == Some(code)))
}

fn find_release(releases: &[Value], version_code: Option<&str>, status: &str) -> Option<usize> {
    releases.iter().position(|r| match version_code {
        Some(code) => has_version_code(r, code),
        None => r["status"] == status,
    })
}

fn map_status(status: &str) -> ReleaseStatus {
    match status {
        "draft" => ReleaseStatus::Draft,
        "inProgress" => ReleaseStatus::InProgress,
        "halted" => ReleaseStatus::Halted,
        "completed" => ReleaseStatus::Live,
        _ => ReleaseStatus::Unknown,
    }
}

#[async_trait::async_trait]
impl StoreAdapter for GooglePlayStore {
    fn id(&self) -> &str {
        self.base.id()
    }

    fn kind(&self) -> StoreKind {
        StoreKind::GooglePlay
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
            .with_retry("create_release", || self.create_release_once(request))
            .await
            .map(Support::Supported)
    }

    async fn update_listing(&self, _request: &ListingUpdate) -> OperationResult<Support<ActionResult>> {
        self.base.unsupported(Operation::UpdateListing)
    }

    async fn get_listing(&self, _query: &ListingQuery) -> OperationResult<Support<Listing>> {
        self.base.unsupported(Operation::GetListing)
    }

    async fn promote_release(&self, request: &PromoteRequest) -> OperationResult<Support<ReleaseResult>> {
        self.base
            .with_retry("promote_release", || self.promote_once(request))
            .await
            .map(Support::Supported)
    }

    async fn set_rollout(&self, request: &RolloutRequest) -> OperationResult<Support<ReleaseResult>> {
        self.base
            .with_retry("set_rollout", || self.set_rollout_once(request))
            .await
            .map(Support::Supported)
    }

    async fn resume_release(&self, release: &ReleaseRef) -> OperationResult<Support<ReleaseResult>> {
        self.base
            .with_retry("resume_release", || {
                self.update_release(release, "halted", "inProgress", None)
            })
            .await
            .map(Support::Supported)
    }

    async fn submit_for_review(&self, _release: &ReleaseRef) -> OperationResult<Support<ActionResult>> {
        self.base.unsupported(Operation::SubmitForReview)
    }

    async fn get_status(&self, release: &ReleaseRef) -> OperationResult<Support<StatusReport>> {
        self.base
            .with_retry("get_status", || self.status_once(release))
            .await
            .map(Support::Supported)
    }

    async fn get_analytics(&self, _query: &AnalyticsQuery) -> OperationResult<Support<AnalyticsReport>> {
        self.base.unsupported(Operation::GetAnalytics)
    }

    async fn get_reviews(&self, query: &ReviewQuery) -> OperationResult<Support<ReviewsPage>> {
        self.base
            .with_retry("get_reviews", || self.reviews_once(query))
            .await
            .map(Support::Supported)
    }

    /// Halt the staged rollout; users keep the previous release
    async fn rollback(&self, release: &ReleaseRef) -> OperationResult<Support<ActionResult>> {
        let result = self
            .base
            .with_retry("rollback", || {
                self.update_release(release, "inProgress", "halted", None)
            })
            .await?;

        let mut action = ActionResult::new(self.base.id(), "Halted staged rollout");
        action.reference = result.release_id;
        Ok(Support::Supported(action))
    }
}
