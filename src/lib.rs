//! context-align - Temporal alignment and block labeling for neural recordings
//!
//! Turns long-format activity and behaviour streams into time-bucketed,
//! context-labeled feature matrices through a deterministic pipeline:
//! record adaptation → pivot → fixed-width resampling → stream alignment
//! → block labeling → JSON encoding.
//!
//! ## Modules
//!
//! - **Resampling**: mean-aggregate samples onto `[k*w, (k+1)*w)` buckets
//! - **Alignment**: put two streams on one grid and cut the unshared tail
//! - **Block labeling**: map session time to the safe/scary schedule

pub mod align;
pub mod block;
pub mod encoder;
pub mod error;
pub mod partition;
pub mod pipeline;
pub mod reshape;
pub mod resample;
pub mod schema;
pub mod session;
pub mod types;

pub use align::{align, AlignedStreams, StreamAligner};
pub use block::{label, BlockLabeler, BlockSchedule};
pub use encoder::{FeatureEncoder, FeaturePayload};
pub use error::ComputeError;
pub use pipeline::{build_feature_matrix, FeaturePipeline, FeatureRun, PipelineConfig};
pub use resample::Resampler;
pub use reshape::Reshaper;
pub use schema::{ColumnMap, RecordAdapter};
pub use session::SessionFamily;
pub use types::{
    BlockLabel, EntityLabel, FeatureMatrix, GroupKey, Interval, ResampledSeries, Sample,
    WideMatrix,
};

/// Crate version embedded in all payloads
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for payloads
pub const PRODUCER_NAME: &str = "context-align";
