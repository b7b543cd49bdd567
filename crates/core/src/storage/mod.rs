//! Attachment storage under a single upload root, using Apache OpenDAL.
//!
//! Every attachment lives directly under the root as a plain basename:
//! `{submitter_id}_{nanoseconds}_{sanitized_original}`. Temporary OCR
//! uploads live under `temp/` and are removed after extraction.

mod error;
mod service;

pub use error::StorageError;
pub use service::{
    ALLOWED_EXTENSIONS, UploadStore, sanitize_filename, validate_basename, validate_original_name,
};
