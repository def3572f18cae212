//! vivo App Store integration
//!
//! The vivo developer API is a single router endpoint selected by the
//! `method` parameter. Each request is signed with HMAC-SHA256 over the
//! sorted parameters, using the account's `access_key` and secret.

use crate::client::{json_str, require_str, StoreBase};
use crate::error::{NormalizedError, OperationResult, Result};
use crate::traits::StoreAdapter;
use crate::types::*;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info;

const ROUTER_PATH: &str = "/router/rest";

const METHOD_UPLOAD_APK: &str = "app.upload.apk.app";
const METHOD_SYNC_UPDATE: &str = "app.sync.update.app";
const METHOD_QUERY_DETAILS: &str = "app.query.details";

/// vivo developer API client
pub struct VivoStore {
    base: StoreBase,
}

impl VivoStore {
    pub fn new(base: StoreBase) -> Self {
        Self { base }
    }

    async fn signed(&self, method: &str, extra: &[(&str, &str)]) -> Result<BTreeMap<String, String>> {
        let mut params = BTreeMap::new();
        params.insert("method".to_string(), method.to_string());
        params.insert("format".to_string(), "json".to_string());
        params.insert("v".to_string(), "1.0".to_string());
        params.insert("target_app_key".to_string(), "developer".to_string());
        for (key, value) in extra {
            params.insert(key.to_string(), value.to_string());
        }
        self.base.sign_params(ROUTER_PATH, params).await
    }

    async fn call_form(&self, params: &BTreeMap<String, String>) -> Result<Value> {
        let http = self
            .base
            .request(Method::POST, &self.base.url(ROUTER_PATH))
            .await?
            .form(params);
        let response = self.base.send_json(http).await?;
        check_code(self.base.id(), &response)?;
        Ok(response)
    }

    async fn upload_once(&self, request: &UploadRequest) -> Result<UploadResult> {
        self.base.validate_artifact(&request.artifact).await?;

        let params = self
            .signed(METHOD_UPLOAD_APK, &[("packageName", request.app_id.as_str())])
            .await?;

        let file_name = request
            .artifact
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("app.apk")
            .to_string();
        let bytes = tokio::fs::read(&request.artifact).await?;

        let mut form = Form::new();
        for (key, value) in params {
            form = form.text(key, value);
        }
        form = form.part("file", Part::bytes(bytes).file_name(file_name));

        info!("Uploading {}...", request.artifact.display());
        let http = self
            .base
            .request(Method::POST, &self.base.url(ROUTER_PATH))
            .await?
            .multipart(form);
        let response = self.base.send_json(http).await?;
        check_code(self.base.id(), &response)?;

        let serial = require_str(&response, "/data/serialnumber")?;
        info!(package = %request.app_id, %serial, "Uploaded package to vivo");
        Ok(UploadResult {
            success: true,
            store_id: self.base.id().to_string(),
            build_id: Some(serial),
            status: ReleaseStatus::Processing,
            console_url: None,
            uploaded_at: Utc::now(),
        })
    }

    async fn submit(&self, release: &ReleaseRef) -> Result<ActionResult> {
        let serial = release
            .release_id
            .as_deref()
            .ok_or_else(|| self.base.invalid("The upload serial number is required to submit"))?;

        let params = self
            .signed(
                METHOD_SYNC_UPDATE,
                &[
                    ("packageName", release.app_id.as_str()),
                    ("apk", serial),
                    ("onlineType", "1"),
                ],
            )
            .await?;
        self.call_form(&params).await?;

        info!(package = %release.app_id, serial, "Submitted update for vivo review");
        Ok(ActionResult::new(self.base.id(), "Submitted for review").with_reference(serial))
    }

    async fn fetch_status(&self, release: &ReleaseRef) -> Result<StatusReport> {
        let params = self
            .signed(METHOD_QUERY_DETAILS, &[("packageName", release.app_id.as_str())])
            .await?;
        let response = self.call_form(&params).await?;

        let state = response.pointer("/data/status").and_then(Value::as_i64);
        Ok(StatusReport {
            success: true,
            store_id: self.base.id().to_string(),
            release_id: json_str(&response, "/data/versionCode"),
            status: state.map(map_status).unwrap_or(ReleaseStatus::Unknown),
            rollout_fraction: None,
            detail: state.map(|s| s.to_string()),
        })
    }
}

/// Fail on a non-zero `code`
fn check_code(backend_id: &str, response: &Value) -> Result<()> {
    match response.get("code").and_then(Value::as_i64) {
        Some(0) | None => Ok(()),
        Some(code) => {
            let message = json_str(response, "/msg").unwrap_or_default();
            Err(NormalizedError::backend_rejected(backend_id, code, &message).into())
        }
    }
}

fn map_status(status: i64) -> ReleaseStatus {
    match status {
        1 => ReleaseStatus::Draft,
        2 => ReleaseStatus::InReview,
        3 => ReleaseStatus::Live,
        4 => ReleaseStatus::Rejected,
        _ => ReleaseStatus::Unknown,
    }
}

#[async_trait::async_trait]
impl StoreAdapter for VivoStore {
    fn id(&self) -> &str {
        self.base.id()
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Vivo
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

    async fn create_release(&self, _request: &ReleaseRequest) -> OperationResult<Support<ReleaseResult>> {
        self.base.unsupported(Operation::CreateRelease)
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
    use serde_json::json;

    #[test]
    fn test_check_code() {
        assert!(check_code("vivo", &json!({"code": 0, "data": {}})).is_ok());
        assert!(check_code("vivo", &json!({"code": 10001, "msg": "sign error"})).is_err());
    }

    #[test]
    fn test_map_status() {
        assert_eq!(map_status(3), ReleaseStatus::Live);
        assert_eq!(map_status(99), ReleaseStatus::Unknown);
    }
}
