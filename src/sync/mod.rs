//! Sync with the central store.
//!
//! - `protocol`: upload, model-check and analytics wire types
//! - `policy`: connectivity probe and the trust/cost gate
//! - `service`: the periodic push/pull loop

pub mod policy;
pub mod protocol;
pub mod service;

pub use policy::{Connectivity, ConnectivityProbe, SharedConnectivity, SkipReason, SyncPolicy};
pub use protocol::{CorrectionUpload, ModelCheckResponse, UploadRequest};
pub use service::{StepOutcome, SyncReport, SyncService};
