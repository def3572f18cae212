//! Common types for store adapters

use crate::rate_limit::RateLimitConfig;
use chrono::{DateTime, NaiveDate, Utc};
use launchpad_auth::CredentialType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// Known store backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreKind {
    /// Apple App Store Connect
    Apple,
    /// Google Play Developer API
    GooglePlay,
    /// Microsoft Store / Partner Center
    Microsoft,
    /// Huawei AppGallery Connect
    Huawei,
    /// Xiaomi GetApps
    Xiaomi,
    /// vivo App Store
    Vivo,
    /// Firebase App Distribution
    Firebase,
}

impl StoreKind {
    /// Every backend wired by the default registry
    pub const ALL: [StoreKind; 7] = [
        StoreKind::Apple,
        StoreKind::GooglePlay,
        StoreKind::Microsoft,
        StoreKind::Huawei,
        StoreKind::Xiaomi,
        StoreKind::Vivo,
        StoreKind::Firebase,
    ];

    /// Backend id used as the join key across auth, rate limiting and the registry
    pub fn id(&self) -> &'static str {
        match self {
            StoreKind::Apple => "apple",
            StoreKind::GooglePlay => "google-play",
            StoreKind::Microsoft => "microsoft",
            StoreKind::Huawei => "huawei",
            StoreKind::Xiaomi => "xiaomi",
            StoreKind::Vivo => "vivo",
            StoreKind::Firebase => "firebase",
        }
    }

    /// Look up a backend by id
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.id() == id)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            StoreKind::Apple => "Apple App Store",
            StoreKind::GooglePlay => "Google Play",
            StoreKind::Microsoft => "Microsoft Store",
            StoreKind::Huawei => "Huawei AppGallery",
            StoreKind::Xiaomi => "Xiaomi GetApps",
            StoreKind::Vivo => "vivo App Store",
            StoreKind::Firebase => "Firebase App Distribution",
        }
    }

    /// How requests to this backend are authorized
    pub fn auth_method(&self) -> AuthMethod {
        match self {
            StoreKind::Apple => AuthMethod::Jwt,
            StoreKind::GooglePlay => AuthMethod::OAuth2ServiceAccount,
            StoreKind::Microsoft | StoreKind::Huawei => AuthMethod::OAuth2ClientCredentials,
            StoreKind::Xiaomi => AuthMethod::Rsa,
            StoreKind::Vivo => AuthMethod::Hmac,
            StoreKind::Firebase => AuthMethod::ApiKey,
        }
    }

    /// Production API root
    pub fn default_base_url(&self) -> &'static str {
        match self {
            StoreKind::Apple => "https://api.appstoreconnect.apple.com",
            StoreKind::GooglePlay => "https://androidpublisher.googleapis.com",
            StoreKind::Microsoft => "https://manage.devcenter.microsoft.com",
            StoreKind::Huawei => "https://connect-api.cloud.huawei.com",
            StoreKind::Xiaomi => "https://api.developer.xiaomi.com/devupload",
            StoreKind::Vivo => "https://developer-api.vivo.com.cn",
            StoreKind::Firebase => "https://firebaseappdistribution.googleapis.com",
        }
    }

    /// Default token bucket for this backend
    pub fn default_rate_limit(&self) -> RateLimitConfig {
        match self {
            // 3600 requests per hour
            StoreKind::Apple => RateLimitConfig::new(20.0, 1.0),
            StoreKind::GooglePlay => RateLimitConfig::new(50.0, 3.0),
            StoreKind::Microsoft => RateLimitConfig::new(10.0, 1.0),
            StoreKind::Huawei => RateLimitConfig::new(10.0, 2.0),
            StoreKind::Xiaomi | StoreKind::Vivo => RateLimitConfig::new(5.0, 0.5),
            StoreKind::Firebase => RateLimitConfig::new(20.0, 2.0),
        }
    }

    /// Whether distribution requires a local regulatory filing (ICP)
    pub fn requires_icp(&self) -> bool {
        matches!(self, StoreKind::Huawei | StoreKind::Xiaomi | StoreKind::Vivo)
    }

    /// Static capability descriptor
    pub fn capabilities(&self) -> StoreCapabilities {
        use Operation::*;

        let (file_types, operations, max_upload_bytes): (&[&str], &[Operation], u64) = match self {
            StoreKind::Apple => (
                &["ipa", "pkg"],
                &[CreateRelease, GetListing, SubmitForReview, GetStatus, GetReviews],
                4 * GIB,
            ),
            StoreKind::GooglePlay => (
                &["aab", "apk"],
                &[
                    UploadBuild,
                    CreateRelease,
                    PromoteRelease,
                    SetRollout,
                    ResumeRelease,
                    Rollback,
                    GetStatus,
                    GetReviews,
                ],
                2 * GIB,
            ),
            StoreKind::Microsoft => (
                &["msix", "msixbundle", "msixupload", "appx", "appxbundle"],
                &[CreateRelease, SubmitForReview, GetStatus, SetRollout],
                25 * GIB,
            ),
            StoreKind::Huawei => (
                &["apk", "aab", "rpk"],
                &[
                    UploadBuild,
                    SubmitForReview,
                    GetStatus,
                    GetListing,
                    UpdateListing,
                    GetAnalytics,
                ],
                4 * GIB,
            ),
            StoreKind::Xiaomi => (&["apk"], &[UploadBuild, GetStatus], 500 * MIB),
            StoreKind::Vivo => (
                &["apk"],
                &[UploadBuild, SubmitForReview, GetStatus],
                GIB,
            ),
            StoreKind::Firebase => (
                &["apk", "aab", "ipa"],
                &[UploadBuild, CreateRelease, GetStatus],
                2 * GIB,
            ),
        };

        StoreCapabilities {
            store_id: self.id().to_string(),
            display_name: self.display_name().to_string(),
            auth_method: self.auth_method(),
            file_types: file_types.iter().map(|s| s.to_string()).collect(),
            operations: operations.to_vec(),
            max_upload_bytes,
            requires_icp: self.requires_icp(),
            rate_limit: self.default_rate_limit(),
        }
    }
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Publishing operations of the adapter contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    UploadBuild,
    CreateRelease,
    UpdateListing,
    GetListing,
    PromoteRelease,
    SetRollout,
    ResumeRelease,
    SubmitForReview,
    GetStatus,
    GetAnalytics,
    GetReviews,
    Rollback,
}

impl Operation {
    pub const ALL: [Operation; 12] = [
        Operation::UploadBuild,
        Operation::CreateRelease,
        Operation::UpdateListing,
        Operation::GetListing,
        Operation::PromoteRelease,
        Operation::SetRollout,
        Operation::ResumeRelease,
        Operation::SubmitForReview,
        Operation::GetStatus,
        Operation::GetAnalytics,
        Operation::GetReviews,
        Operation::Rollback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::UploadBuild => "upload_build",
            Operation::CreateRelease => "create_release",
            Operation::UpdateListing => "update_listing",
            Operation::GetListing => "get_listing",
            Operation::PromoteRelease => "promote_release",
            Operation::SetRollout => "set_rollout",
            Operation::ResumeRelease => "resume_release",
            Operation::SubmitForReview => "submit_for_review",
            Operation::GetStatus => "get_status",
            Operation::GetAnalytics => "get_analytics",
            Operation::GetReviews => "get_reviews",
            Operation::Rollback => "rollback",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authorization scheme of a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// OAuth2 JWT-bearer grant with a service account key
    OAuth2ServiceAccount,
    /// OAuth2 client-credentials grant
    OAuth2ClientCredentials,
    /// Locally signed ES256 JWT
    Jwt,
    /// RSA-SHA256 signature over request parameters
    Rsa,
    /// HMAC-SHA256 signature over request parameters
    Hmac,
    /// Static API key
    ApiKey,
}

impl AuthMethod {
    /// Credential family expected in the configuration
    pub fn credential_type(&self) -> CredentialType {
        match self {
            AuthMethod::OAuth2ServiceAccount | AuthMethod::OAuth2ClientCredentials => {
                CredentialType::OAuth2
            }
            AuthMethod::Jwt => CredentialType::Jwt,
            AuthMethod::Rsa => CredentialType::Rsa,
            AuthMethod::Hmac => CredentialType::Hmac,
            AuthMethod::ApiKey => CredentialType::ApiKey,
        }
    }

    /// Whether each request carries its own signature instead of a token
    pub fn is_signature(&self) -> bool {
        matches!(self, AuthMethod::Rsa | AuthMethod::Hmac)
    }
}

/// Immutable descriptor of what a backend supports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreCapabilities {
    pub store_id: String,
    pub display_name: String,
    pub auth_method: AuthMethod,
    /// Accepted artifact extensions, lowercase without the dot
    pub file_types: Vec<String>,
    pub operations: Vec<Operation>,
    pub max_upload_bytes: u64,
    pub requires_icp: bool,
    pub rate_limit: RateLimitConfig,
}

impl StoreCapabilities {
    pub fn supports(&self, operation: Operation) -> bool {
        self.operations.contains(&operation)
    }

    pub fn accepts_extension(&self, extension: &str) -> bool {
        let extension = extension.to_ascii_lowercase();
        self.file_types.iter().any(|t| *t == extension)
    }
}

/// Outcome of an operation that a backend may not offer
///
/// Serializes as the payload itself when supported, and as
/// `{"success": false, ...}` when not. Deserialization tries the unsupported
/// shape first, since it is the stricter of the two.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Support<T> {
    Unsupported(UnsupportedOperation),
    Supported(T),
}

impl<T> Support<T> {
    pub fn is_supported(&self) -> bool {
        matches!(self, Support::Supported(_))
    }

    /// The payload, if the operation was supported
    pub fn supported(self) -> Option<T> {
        match self {
            Support::Supported(value) => Some(value),
            Support::Unsupported(_) => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Support<U> {
        match self {
            Support::Supported(value) => Support::Supported(f(value)),
            Support::Unsupported(u) => Support::Unsupported(u),
        }
    }
}

/// Structured "not offered by this backend" result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsupportedOperation {
    pub success: bool,
    pub store_id: String,
    pub operation: Operation,
    pub message: String,
}

impl UnsupportedOperation {
    pub fn new(store_id: &str, operation: Operation) -> Self {
        Self {
            success: false,
            store_id: store_id.to_string(),
            operation,
            message: format!("{} does not support {}", store_id, operation),
        }
    }
}

/// Lifecycle state of a build or release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStatus {
    Draft,
    Processing,
    InReview,
    Approved,
    Rejected,
    /// Staged rollout in progress
    InProgress,
    Halted,
    Live,
    Unknown,
}

impl std::fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReleaseStatus::Draft => write!(f, "Draft"),
            ReleaseStatus::Processing => write!(f, "Processing"),
            ReleaseStatus::InReview => write!(f, "In Review"),
            ReleaseStatus::Approved => write!(f, "Approved"),
            ReleaseStatus::Rejected => write!(f, "Rejected"),
            ReleaseStatus::InProgress => write!(f, "Rolling Out"),
            ReleaseStatus::Halted => write!(f, "Halted"),
            ReleaseStatus::Live => write!(f, "Live"),
            ReleaseStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

// --- Requests ---

/// Upload an artifact
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadRequest {
    /// Store-side app identifier (bundle id, package name, app id)
    pub app_id: String,
    pub artifact: PathBuf,
    /// Track to assign the build to after upload
    pub track: Option<String>,
    /// Release notes per locale
    #[serde(default)]
    pub release_notes: HashMap<String, String>,
}

/// Create a release from an uploaded build
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReleaseRequest {
    pub app_id: String,
    pub version: String,
    /// Build reference returned by the upload (version code, build id, release name)
    pub build_id: Option<String>,
    pub track: Option<String>,
    /// Staged rollout fraction (0.0 - 1.0)
    pub rollout_fraction: Option<f64>,
    #[serde(default)]
    pub release_notes: HashMap<String, String>,
}

/// Identifies an existing release
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReleaseRef {
    pub app_id: String,
    pub release_id: Option<String>,
    pub track: Option<String>,
}

impl ReleaseRef {
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            ..Default::default()
        }
    }

    pub fn with_release(mut self, release_id: impl Into<String>) -> Self {
        self.release_id = Some(release_id.into());
        self
    }

    pub fn with_track(mut self, track: impl Into<String>) -> Self {
        self.track = Some(track.into());
        self
    }
}

/// Move a build from one track to another
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromoteRequest {
    pub app_id: String,
    pub build_id: String,
    pub from_track: String,
    pub to_track: String,
    pub rollout_fraction: Option<f64>,
}

/// Change the user fraction of a staged rollout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RolloutRequest {
    pub release: ReleaseRef,
    /// Fraction of users (0.0 - 1.0); 1.0 completes the rollout
    pub fraction: f64,
}

/// Read a store listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListingQuery {
    pub app_id: String,
    /// Defaults to the backend's primary locale
    pub locale: Option<String>,
}

/// Change localized listing text; unset fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListingUpdate {
    pub app_id: String,
    pub locale: String,
    pub title: Option<String>,
    pub short_description: Option<String>,
    pub full_description: Option<String>,
}

/// Request an analytics report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsQuery {
    pub app_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Fetch recent user reviews
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewQuery {
    pub app_id: String,
    pub limit: Option<usize>,
}

// --- Results ---

/// Result of an artifact upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResult {
    pub success: bool,
    pub store_id: String,
    /// Store-side build reference
    pub build_id: Option<String>,
    pub status: ReleaseStatus,
    pub console_url: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

/// Result of creating or changing a release
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseResult {
    pub success: bool,
    pub store_id: String,
    pub release_id: Option<String>,
    pub status: ReleaseStatus,
    pub track: Option<String>,
    pub rollout_fraction: Option<f64>,
}

/// Result of a state change without a richer payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub store_id: String,
    pub message: String,
    /// Store-side reference of the action (submission id, operation name)
    pub reference: Option<String>,
}

impl ActionResult {
    pub fn new(store_id: &str, message: impl Into<String>) -> Self {
        Self {
            success: true,
            store_id: store_id.to_string(),
            message: message.into(),
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

/// Localized store listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub success: bool,
    pub store_id: String,
    pub locale: String,
    pub title: Option<String>,
    pub short_description: Option<String>,
    pub full_description: Option<String>,
}

/// Current state of a release
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub success: bool,
    pub store_id: String,
    pub release_id: Option<String>,
    pub status: ReleaseStatus,
    pub rollout_fraction: Option<f64>,
    /// Raw state reported by the backend
    pub detail: Option<String>,
}

/// Analytics export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub success: bool,
    pub store_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Download link of the generated report
    pub report_url: Option<String>,
    #[serde(default)]
    pub metrics: HashMap<String, f64>,
}

/// A page of user reviews
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewsPage {
    pub success: bool,
    pub store_id: String,
    pub reviews: Vec<UserReview>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserReview {
    pub id: String,
    pub rating: Option<u8>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub author: Option<String>,
    pub created_at: Option<String>,
}
