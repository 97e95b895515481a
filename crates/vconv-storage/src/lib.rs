//! Object storage for converted outputs.
//!
//! This crate provides:
//! - The [`ObjectStorage`] collaborator trait used by the uploader
//! - A Cloudflare R2 (S3-compatible) implementation
//! - Content-type and object-key helpers

pub mod client;
pub mod error;
pub mod storage;

pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use storage::{content_type_for, object_key_for, ObjectStorage, UploadedObject};
