//! Store adapter traits

use crate::error::OperationResult;
use crate::types::*;

/// Trait for store backend adapters
///
/// Every publishing operation is part of the contract. Backends that do not
/// offer an operation return [`Support::Unsupported`] without touching the
/// network; failures always surface as a single
/// [`NormalizedError`](crate::error::NormalizedError).
#[async_trait::async_trait]
pub trait StoreAdapter: Send + Sync {
    /// Backend id
    fn id(&self) -> &str;

    /// Backend kind
    fn kind(&self) -> StoreKind;

    /// Static capability descriptor, available without authenticating
    fn capabilities(&self) -> &StoreCapabilities;

    /// Verify that the configured credentials can authorize requests
    async fn authenticate(&self) -> OperationResult<()>;

    /// Upload an artifact
    async fn upload_build(&self, request: &UploadRequest) -> OperationResult<Support<UploadResult>>;

    /// Create a release from an uploaded build
    async fn create_release(
        &self,
        request: &ReleaseRequest,
    ) -> OperationResult<Support<ReleaseResult>>;

    /// Change localized listing text
    async fn update_listing(
        &self,
        request: &ListingUpdate,
    ) -> OperationResult<Support<ActionResult>>;

    /// Read localized listing text
    async fn get_listing(&self, query: &ListingQuery) -> OperationResult<Support<Listing>>;

    /// Move a build to another track
    async fn promote_release(
        &self,
        request: &PromoteRequest,
    ) -> OperationResult<Support<ReleaseResult>>;

    /// Change the rollout fraction of a staged release
    async fn set_rollout(&self, request: &RolloutRequest)
        -> OperationResult<Support<ReleaseResult>>;

    /// Resume a halted rollout
    async fn resume_release(&self, release: &ReleaseRef)
        -> OperationResult<Support<ReleaseResult>>;

    /// Submit a release for store review
    async fn submit_for_review(
        &self,
        release: &ReleaseRef,
    ) -> OperationResult<Support<ActionResult>>;

    /// Current state of a release
    async fn get_status(&self, release: &ReleaseRef) -> OperationResult<Support<StatusReport>>;

    /// Request an analytics report
    async fn get_analytics(
        &self,
        query: &AnalyticsQuery,
    ) -> OperationResult<Support<AnalyticsReport>>;

    /// Recent user reviews
    async fn get_reviews(&self, query: &ReviewQuery) -> OperationResult<Support<ReviewsPage>>;

    /// Stop a rollout and fall back to the previous release
    async fn rollback(&self, release: &ReleaseRef) -> OperationResult<Support<ActionResult>>;
}
