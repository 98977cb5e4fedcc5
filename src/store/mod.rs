//! Document store access: the `Recording` data model and the gateway that
//! connects to it.
//!
//! The store engine is opaque to the rest of the worker — the poller only
//! sees [`RecordStore`]'s find/update operations.

pub mod gateway;
pub mod recording;

pub use gateway::{MongoRecordStore, RecordStore, StoreError, TrustPolicy};
pub use recording::{Analysis, Recording, Status};
