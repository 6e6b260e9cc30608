//! Artifact delivery and storage.
//!
//! This crate provides:
//! - Cloudflare R2 uploads for finished videos
//! - A local serving directory used when no durable storage is configured
//! - HTTP byte-range parsing for the streaming endpoint

pub mod client;
pub mod delivery;
pub mod error;
pub mod local;
pub mod range;

pub use client::{R2Client, R2Config};
pub use delivery::{
    video_key, ArtifactDelivery, DeliveryConfig, LocalDelivery, R2Delivery, VIDEO_CONTENT_TYPE,
};
pub use error::{StorageError, StorageResult};
pub use local::{move_file, LocalVideoStore, LOCAL_URL_PREFIX};
pub use range::{unsatisfied_content_range, ByteRange};
