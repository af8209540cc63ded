//! Data model and error taxonomy for spindle pipelines.
//!
//! This crate defines the vocabulary shared by every other layer: the external
//! `Tool`s a pipeline drives, the `Phase` state model, parsed `OutputEvent`s,
//! the `ProgressSnapshot` value type, typed per-tool errors with their
//! deterministic `classify` function, and the validated `OperationRequest`
//! catalogue (burn, copy, read, erase, extract).

pub mod event;
pub mod identity;
pub mod phase;
pub mod request;
pub mod snapshot;
pub mod taxonomy;
pub mod tool;
pub mod types;

pub use event::OutputEvent;
pub use identity::{generate_run_id, RunIdentity};
pub use phase::{Failure, FailureKind, OperationKind, Phase};
pub use request::{
    parse_request_file, parse_request_str, BlankMode, BurnRequest, BurnSource, CopyRequest,
    EraseRequest, ExtractRequest, MediaCapacity, OperationRequest, ReadRequest, RequestError,
    ValidationError, WriteMode, WriteOptions,
};
pub use snapshot::{ProgressSnapshot, ProgressUnit};
pub use taxonomy::{
    classify, Cdda2wavError, CdrecordError, MkisofsError, ReadcdError, ToolError,
};
pub use tool::Tool;
pub use types::{DeviceId, RunId};
