pub mod job;
pub mod loaders;
pub mod product;

pub use job::{generate_job_id, BatchProgress, ItemResult, JobReport};
pub use loaders::{load_identifiers, parse_identifiers};
pub use product::{ExtractionRequest, ExtractionResult, RequestKey};
