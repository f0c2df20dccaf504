#![deny(missing_docs)]
#![doc = "Core data model, error taxonomy and deterministic RNG for the LDATS changepoint engine."]

pub mod dataset;
pub mod errors;
pub mod float_serde;
pub mod rng;
pub mod terms;

pub use dataset::{DataTable, Observation, TimeSeriesDataset};
pub use errors::{ErrorInfo, LdatsError};
pub use rng::{derive_substream_seed, RngHandle};
pub use terms::TermSet;
