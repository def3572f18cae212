//! Huawei AppGallery Connect integration
//!
//! Uses the AppGallery Connect Publishing API. Requests carry both the
//! client-credentials bearer token and the `client_id` header. Every response
//! wraps its outcome in a `ret` object that must be checked even on HTTP 200.

use crate::client::{json_str, require_str, StoreBase};
use crate::error::{NormalizedError, OperationResult, Result};
use crate::traits::StoreAdapter;
use crate::types::*;
use chrono::Utc;
use launchpad_auth::AuthError;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder};
use serde_json::{json, Value};
use tracing::info;

const PUBLISH_PREFIX: &str = "/api/publish/v2";
const REPORT_PREFIX: &str = "/api/report/distribution-operation-quality/v1";
const DEFAULT_LOCALE: &str = "en-US";

/// AppGallery `fileType` for application packages
const FILE_TYPE_PACKAGE: u32 = 5;

/// AppGallery Connect Publishing API client
pub struct AppGalleryConnect {
    base: StoreBase,
}

impl AppGalleryConnect {
    pub fn new(base: StoreBase) -> Self {
        Self { base }
    }

    async fn authorized(&self, method: Method, url: &str) -> Result<RequestBuilder> {
        let client_id = self
            .base
            .auth()
            .credentials(self.base.id())
            .and_then(|c| c.get("client_id").map(String::from))
            .ok_or_else(|| AuthError::MissingField {
                backend: self.base.id().to_string(),
                field: "client_id".to_string(),
            })?;

        Ok(self
            .base
            .bearer(method, url)
            .await?
            .header("client_id", client_id))
    }

    async fn call(&self, request: RequestBuilder) -> Result<Value> {
        let response = self.base.send_json(request).await?;
        check_ret(self.base.id(), &response)?;
        Ok(response)
    }

    async fn publish(&self, method: Method, path_and_query: &str, body: Option<Value>) -> Result<Value> {
        let url = self.base.url(&format!("{}{}", PUBLISH_PREFIX, path_and_query));
        let mut request = self.authorized(method, &url).await?;
        if let Some(body) = body {
            request = request.json(&body);
        }
        self.call(request).await
    }

    async fn upload_once(&self, request: &UploadRequest) -> Result<UploadResult> {
        self.base.validate_artifact(&request.artifact).await?;
        let suffix = request
            .artifact
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("apk")
            .to_lowercase();
        let file_name = request
            .artifact
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("app.apk")
            .to_string();

        let target = self
            .publish(
                Method::GET,
                &format!("/upload-url?appId={}&suffix={}", request.app_id, suffix),
                None,
            )
            .await?;
        let upload_url = require_str(&target, "/uploadUrl")?;
        let auth_code = require_str(&target, "/authCode")?;

        info!("Uploading {}...", request.artifact.display());
        let bytes = tokio::fs::read(&request.artifact).await?;
        let form = Form::new()
            .text("authCode", auth_code)
            .text("fileCount", "1")
            .text("parseType", "1")
            .part("file", Part::bytes(bytes).file_name(file_name.clone()));
        let uploaded = self
            .base
            .send_json(self.base.request(Method::POST, &upload_url).await?.multipart(form))
            .await?;
        let file_url = require_str(&uploaded, "/result/UploadFileRsp/fileInfoList/0/fileDestUlr")?;

        let updated = self
            .publish(
                Method::PUT,
                &format!("/app-file-info?appId={}", request.app_id),
                Some(json!({
                    "fileType": FILE_TYPE_PACKAGE,
                    "files": [{ "fileName": file_name, "fileDestUrl": file_url }],
                })),
            )
            .await?;

        info!(app = %request.app_id, "Uploaded package to AppGallery");
        Ok(UploadResult {
            success: true,
            store_id: self.base.id().to_string(),
            build_id: json_str(&updated, "/pkgId"),
            status: ReleaseStatus::Processing,
            console_url: None,
            uploaded_at: Utc::now(),
        })
    }

    async fn submit(&self, release: &ReleaseRef) -> Result<ActionResult> {
        self.publish(
            Method::POST,
            &format!("/app-submit?appId={}", release.app_id),
            None,
        )
        .await?;

        info!(app = %release.app_id, "Submitted for AppGallery review");
        Ok(ActionResult::new(self.base.id(), "Submitted for review"))
    }

    async fn app_info(&self, app_id: &str, lang: Option<&str>) -> Result<Value> {
        let query = match lang {
            Some(lang) => format!("/app-info?appId={}&lang={}", app_id, lang),
            None => format!("/app-info?appId={}", app_id),
        };
        self.publish(Method::GET, &query, None).await
    }

    async fn fetch_status(&self, release: &ReleaseRef) -> Result<StatusReport> {
        let response = self.app_info(&release.app_id, None).await?;
        let state = response.pointer("/appInfo/releaseState").and_then(Value::as_i64);

        Ok(StatusReport {
            success: true,
            store_id: self.base.id().to_string(),
            release_id: json_str(&response, "/appInfo/versionNumber"),
            status: state.map(map_release_state).unwrap_or(ReleaseStatus::Unknown),
            rollout_fraction: None,
            detail: state.map(|s| s.to_string()),
        })
    }

    async fn fetch_listing(&self, query: &ListingQuery) -> Result<Listing> {
        let locale = query.locale.as_deref().unwrap_or(DEFAULT_LOCALE);
        let response = self.app_info(&query.app_id, Some(locale)).await?;

        let language = response["languages"]
            .as_array()
            .and_then(|langs| langs.iter().find(|l| l["lang"] == locale))
            .cloned()
            .unwrap_or(Value::Null);

        Ok(Listing {
            success: true,
            store_id: self.base.id().to_string(),
            locale: locale.to_string(),
            title: json_str(&language, "/appName"),
            short_description: json_str(&language, "/briefInfo"),
            full_description: json_str(&language, "/appDesc"),
        })
    }

    async fn update_listing_once(&self, update: &ListingUpdate) -> Result<ActionResult> {
        let mut body = json!({ "lang": update.locale });
        if let Some(title) = &update.title {
            body["appName"] = json!(title);
        }
        if let Some(brief) = &update.short_description {
            body["briefInfo"] = json!(brief);
        }
        if let Some(description) = &update.full_description {
            body["appDesc"] = json!(description);
        }

        self.publish(
            Method::PUT,
            &format!("/app-language-info?appId={}", update.app_id),
            Some(body),
        )
        .await?;

        info!(app = %update.app_id, locale = %update.locale, "Updated listing");
        Ok(ActionResult::new(self.base.id(), format!("Updated {} listing", update.locale)))
    }

    async fn fetch_analytics(&self, query: &AnalyticsQuery) -> Result<AnalyticsReport> {
        if query.end_date < query.start_date {
            return Err(self.base.invalid("Analytics end date precedes start date"));
        }

        let url = self.base.url(&format!(
            "{}/appDownloadExport/{}?language=en-US&startTime={}&endTime={}&groupBy=date",
            REPORT_PREFIX,
            query.app_id,
            query.start_date.format("%Y%m%d"),
            query.end_date.format("%Y%m%d"),
        ));
        let response = self.call(self.authorized(Method::GET, &url).await?).await?;

        Ok(AnalyticsReport {
            success: true,
            store_id: self.base.id().to_string(),
            start_date: query.start_date,
            end_date: query.end_date,
            report_url: json_str(&response, "/fileURL"),
            metrics: Default::default(),
        })
    }
}

/// Fail on a non-zero `ret.code`
fn check_ret(backend_id: &str, response: &Value) -> Result<()> {
    match response.pointer("/ret/code").and_then(Value::as_i64) {
        Some(0) | None => Ok(()),
        Some(code) => {
            let message = json_str(response, "/ret/msg").unwrap_or_default();
            Err(NormalizedError::backend_rejected(backend_id, code, &message).into())
        }
    }
}

fn map_release_state(state: i64) -> ReleaseStatus {
    match state {
        0 => ReleaseStatus::Live,
        1 | 8 => ReleaseStatus::Rejected,
        3 | 4 | 5 => ReleaseStatus::InReview,
        7 => ReleaseStatus::Draft,
        _ => ReleaseStatus::Unknown,
    }
}

#[async_trait::async_trait]
impl StoreAdapter for AppGalleryConnect {
    fn id(&self) -> &str {
        self.base.id()
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Huawei
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

    async fn update_listing(&self, request: &ListingUpdate) -> OperationResult<Support<ActionResult>> {
        self.base
            .with_retry("update_listing", || self.update_listing_once(request))
            .await
            .map(Support::Supported)
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

    async fn get_analytics(&self, query: &AnalyticsQuery) -> OperationResult<Support<AnalyticsReport>> {
        self.base
            .with_retry("get_analytics", || self.fetch_analytics(query))
            .await
            .map(Support::Supported)
    }

    async fn get_reviews(&self, _query: &ReviewQuery) -> OperationResult<Support<ReviewsPage>> {
        self.base.unsupported(Operation::GetReviews)
    }

    async fn rollback(&self, _release: &ReleaseRef) -> OperationResult<Support<ActionResult>> {
        self.base.unsupported(Operation::Rollback)
    }
}
