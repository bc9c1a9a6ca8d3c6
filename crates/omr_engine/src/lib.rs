//! OMR engine: file collection, the HTTP client for the evaluation service,
//! result caching and artifact downloads.
mod cache;
mod client;
mod collect;
mod engine;
mod filename;
mod persist;
mod submit;
mod types;

pub use cache::{CacheState, Records, ResultCache};
pub use client::{EvaluationService, ReqwestService, ServiceSettings};
pub use collect::{
    CollectError, CollectOutcome, CollectSettings, DirectoryReader, Entry, FsDirectory,
    TreeCollector,
};
pub use engine::{EngineConfig, EngineEvents, EngineHandle};
pub use filename::artifact_filename;
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use submit::{BatchSubmitter, SubmitError};
pub use types::{ArtifactError, EngineEvent, FailureKind, ServiceError};
