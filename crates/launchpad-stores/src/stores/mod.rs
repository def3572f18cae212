//! Concrete store adapters
//!
//! Each adapter composes a [`StoreBase`] and implements the full
//! [`StoreAdapter`] contract for one [`StoreKind`].

pub mod apple;
pub mod firebase;
pub mod google_play;
pub mod huawei;
pub mod microsoft;
pub mod vivo;
pub mod xiaomi;

pub use apple::AppStoreConnect;
pub use firebase::FirebaseDistribution;
pub use google_play::GooglePlayStore;
pub use huawei::AppGalleryConnect;
pub use microsoft::MicrosoftStore;
pub use vivo::VivoStore;
pub use xiaomi::XiaomiStore;

use crate::client::StoreBase;
use crate::traits::StoreAdapter;
use crate::types::StoreKind;
use std::sync::Arc;

/// Build the adapter for `base`'s kind
pub fn build_adapter(base: StoreBase) -> Arc<dyn StoreAdapter> {
    match base.kind() {
        StoreKind::Apple => Arc::new(AppStoreConnect::new(base)),
        StoreKind::GooglePlay => Arc::new(GooglePlayStore::new(base)),
        StoreKind::Microsoft => Arc::new(MicrosoftStore::new(base)),
        StoreKind::Huawei => Arc::new(AppGalleryConnect::new(base)),
        StoreKind::Xiaomi => Arc::new(XiaomiStore::new(base)),
        StoreKind::Vivo => Arc::new(VivoStore::new(base)),
        StoreKind::Firebase => Arc::new(FirebaseDistribution::new(base)),
    }
}
