//! Xiaomi GetApps integration
//!
//! The Xiaomi developer upload API authorizes each request with an RSA-SHA256
//! signature over the sorted request parameters. The developer account
//! (`user_name` in the credential config) is part of every request payload.

use crate::client::{json_str, StoreBase};
use crate::error::{NormalizedError, OperationResult, Result};
use crate::traits::StoreAdapter;
use crate::types::*;
use chrono::Utc;
use launchpad_auth::AuthError;
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::info;

const PUSH_PATH: &str = "/dev/push";
const QUERY_PATH: &str = "/dev/query";

/// `synchroType` for a new version of an existing app
const SYNC_UPDATE: u32 = 1;

/// Xiaomi developer upload API client
pub struct XiaomiStore {
    base: StoreBase,
}

impl XiaomiStore {
    pub fn new(base: StoreBase) -> Self {
        Self { base }
    }

    fn user_name(&self) -> Result<String> {
        self.base
            .auth()
            .credentials(self.base.id())
            .and_then(|c| c.get("user_name").map(String::from))
            .ok_or_else(|| {
                AuthError::MissingField {
                    backend: self.base.id().to_string(),
                    field: "user_name".to_string(),
                }
                .into()
            })
    }

    /// `RequestData` parameter plus signature
    async fn signed(&self, path: &str, request_data: Value) -> Result<BTreeMap<String, String>> {
        let mut params = BTreeMap::new();
        params.insert("RequestData".to_string(), request_data.to_string());
        self.base.sign_params(path, params).await
    }

    async fn push_once(&self, request: &UploadRequest) -> Result<UploadResult> {
        self.base.validate_artifact(&request.artifact).await?;

        let request_data = json!({
            "userName": self.user_name()?,
            "synchroType": SYNC_UPDATE,
            "appInfo": { "packageName": request.app_id },
        });
        let params = self.signed(PUSH_PATH, request_data).await?;

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
        form = form.part("apk", Part::bytes(bytes).file_name(file_name));

        info!("Uploading {}...", request.artifact.display());
        let http = self
            .base
            .request(Method::POST, &self.base.url(PUSH_PATH))
            .await?
            .multipart(form);
        let response = self.base.send_json(http).await?;
        check_result(self.base.id(), &response)?;

        info!(package = %request.app_id, "Pushed package to Xiaomi");
        Ok(UploadResult {
            success: true,
            store_id: self.base.id().to_string(),
            build_id: json_str(&response, "/packageInfo/versionCode"),
            status: ReleaseStatus::InReview,
            console_url: None,
            uploaded_at: Utc::now(),
        })
    }

    async fn query_once(&self, release: &ReleaseRef) -> Result<StatusReport> {
        let request_data = json!({
            "userName": self.user_name()?,
            "packageName": release.app_id,
        });
        let params = self.signed(QUERY_PATH, request_data).await?;

        let http = self
            .base
            .request(Method::POST, &self.base.url(QUERY_PATH))
            .await?
            .form(&params);
        let response = self.base.send_json(http).await?;
        check_result(self.base.id(), &response)?;

        let package = response.get("packageInfo").cloned().unwrap_or(Value::Null);
        let status = if package.is_null() {
            ReleaseStatus::Unknown
        } else {
            ReleaseStatus::Live
        };

        Ok(StatusReport {
            success: true,
            store_id: self.base.id().to_string(),
            release_id: json_str(&package, "/versionCode"),
            status,
            rollout_fraction: None,
            detail: json_str(&package, "/versionName"),
        })
    }
}

/// Fail on a non-zero `result`
fn check_result(backend_id: &str, response: &Value) -> Result<()> {
    match response.get("result").and_then(Value::as_i64) {
        Some(0) | None => Ok(()),
        Some(code) => {
            let message = json_str(response, "/message").unwrap_or_default();
            Err(NormalizedError::backend_rejected(backend_id, code, &message).into())
        }
    }
}

#[async_trait::async_trait]
impl StoreAdapter for XiaomiStore {
    fn id(&self) -> &str {
        self.base.id()
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Xiaomi
    }

    fn capabilities(&self) -> &StoreCapabilities {
        self.base.capabilities()
    }

    async fn authenticate(&self) -> OperationResult<()> {
        self.base.authenticate().await
    }

    async fn upload_build(&self, request: &UploadRequest) -> OperationResult<Support<UploadResult>> {
        self.base
            .with_retry("upload_build", || self.push_once(request))
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

    async fn submit_for_review(&self, _release: &ReleaseRef) -> OperationResult<Support<ActionResult>> {
        self.base.unsupported(Operation::SubmitForReview)
    }

    async fn get_status(&self, release: &ReleaseRef) -> OperationResult<Support<StatusReport>> {
        self.base
            .with_retry("get_status", || self.query_once(release))
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
    fn test_check_result() {
        assert!(check_result("xiaomi", &json!({"result": 0})).is_ok());
        let err = check_result("xiaomi", &json!({"result": 3, "message": "bad sign"})).unwrap_err();
        assert!(!err.is_retryable());
    }
}
