pub mod analytics;
pub mod category;
pub mod classifier;
pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use analytics::{compute_breakdown, AnalyticsReport, CategoryBreakdown, CategoryStat};
pub use category::{Category, ASSIGNABLE, MAX_CATEGORIES_PER_TRACE, REGISTRY};
pub use classifier::{
    create_classifier, Classification, ClassifierBackend, ClassifierError, ClassifierHealth,
    DegradedCause, GatewayConfig, GeminiClassifier, NullClassifier, APOLOGY_REPLY,
};
pub use config::SupportLensConfig;
pub use db::{RawAggregate, StoreError};
pub use error::SupportLensError;
pub use models::{NewTrace, Trace};
