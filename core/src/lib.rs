pub mod api;
pub mod error;
pub mod model;
pub mod pricing;
pub mod store;
pub mod targets;

pub use api::{
    upload_fallback_path, ApiConfig, DistributionMethod, OutputsListing, RunReport, ServiceClient,
    Step3Params, Step3Summary, UploadResponse, VersionInfo, DEFAULT_API_BASE,
    DEFAULT_MAX_RECIPIENTS, DEFAULT_PRICE_COMMODITY_MWH, DEFAULT_PRICE_DISTRIBUTION_MWH,
    DEFAULT_PRICE_FEED_IN_MWH, UPLOAD_KEY_CONSUMPTION, UPLOAD_KEY_GENERATION,
    UPLOAD_KEY_SELF_CONSUMPTION,
};
pub use error::{Error, StorageAction};
pub use model::{
    DistTariffMode, MeteringObject, PriceScope, PricingMode, ToggleState, TOGGLES_KEY,
};
pub use pricing::{
    distribution_cell, price_cell, visibility_for, PricingModeController, ScopeVisibility,
    UNIFORM_PLACEHOLDER,
};
pub use store::LocalStore;
