//! Record store gateway: connection lifecycle and the three operations the
//! poller needs.
//!
//! # Overview
//!
//! [`RecordStore`] is the interface the poller talks to.  It is object-safe
//! and `Send + Sync` so it can be held behind an `Arc<dyn RecordStore>`.
//!
//! [`MongoRecordStore`] is the production implementation: a client opened
//! once at process start (no global singleton), exposing the `recordings`
//! collection.  Every read/modify/write is an independent find + update pair
//! — no transactions.  Two pollers racing on the same record is a known,
//! tolerated limitation of this design.

use async_trait::async_trait;
use futures::stream::TryStreamExt;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Bson, DateTime};
use mongodb::options::{ClientOptions, Tls, TlsOptions};
use mongodb::{Client, Collection};
use thiserror::Error;

use super::recording::{Analysis, Recording};
use crate::config::WorkerConfig;

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Errors from the document store boundary.  Any of these escaping a poll
/// pass is fatal to the worker — connectivity problems are not retried
/// per-record.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection string parsing, connectivity, or query failure.
    #[error(transparent)]
    Database(#[from] mongodb::error::Error),

    /// An analysis result could not be encoded as a BSON document.
    #[error("failed to encode analysis result: {0}")]
    Encode(#[from] mongodb::bson::ser::Error),
}

// ---------------------------------------------------------------------------
// TrustPolicy
// ---------------------------------------------------------------------------

/// TLS certificate validation policy for the store connection.
///
/// Managed cluster hosts (`mongodb.net`) historically needed validation
/// relaxed in some deployment environments; rather than a hardcoded bypass,
/// the policy is explicit and overridable via `MONGO_ALLOW_INVALID_CERTS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustPolicy {
    /// Validate server certificates against the system trust roots.
    SystemRoots,
    /// Accept invalid certificates — a compatibility trade-off, not a
    /// security recommendation.
    AllowInvalidCertificates,
}

impl TrustPolicy {
    /// Default policy for an endpoint when no explicit override is set.
    pub fn for_endpoint(uri: &str) -> Self {
        if uri.contains("mongodb.net") {
            TrustPolicy::AllowInvalidCertificates
        } else {
            TrustPolicy::SystemRoots
        }
    }
}

// ---------------------------------------------------------------------------
// RecordStore trait
// ---------------------------------------------------------------------------

/// Async interface over the recordings collection.
///
/// Implementors must be `Send + Sync` so they can be shared as
/// `Arc<dyn RecordStore>` between the poller and tests.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch up to `limit` records with status `pending`, oldest first.
    async fn find_pending(&self, limit: i64) -> Result<Vec<Recording>, StoreError>;

    /// Transition a record to `done`: set `analysis`, clear `error_message`,
    /// refresh `updated_at`.
    async fn mark_done(&self, id: ObjectId, analysis: &Analysis) -> Result<(), StoreError>;

    /// Transition a record to `error`: set `error_message`, refresh
    /// `updated_at`.
    async fn mark_error(&self, id: ObjectId, message: &str) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// MongoRecordStore
// ---------------------------------------------------------------------------

/// Production store handle over the `recordings` collection.
#[derive(Clone)]
pub struct MongoRecordStore {
    recordings: Collection<Recording>,
}

impl MongoRecordStore {
    /// Name of the collection holding recording documents.
    pub const COLLECTION: &'static str = "recordings";

    /// Open a client against the configured endpoint and select the
    /// recordings collection.
    ///
    /// The client is opened exactly once here and lives for the process;
    /// dropping the store closes it.
    pub async fn connect(config: &WorkerConfig) -> Result<Self, StoreError> {
        let mut options = ClientOptions::parse(&config.mongo_uri).await?;

        let policy = config
            .trust_policy
            .unwrap_or_else(|| TrustPolicy::for_endpoint(&config.mongo_uri));
        if policy == TrustPolicy::AllowInvalidCertificates {
            log::warn!("store TLS: accepting invalid certificates (compatibility mode)");
            options.tls = Some(Tls::Enabled(
                TlsOptions::builder()
                    .allow_invalid_certificates(true)
                    .build(),
            ));
        }

        let client = Client::with_options(options)?;
        let recordings = client
            .database(&config.mongo_db_name)
            .collection::<Recording>(Self::COLLECTION);

        Ok(Self { recordings })
    }
}

#[async_trait]
impl RecordStore for MongoRecordStore {
    async fn find_pending(&self, limit: i64) -> Result<Vec<Recording>, StoreError> {
        // Explicit oldest-first ordering so a burst of uploads cannot starve
        // earlier records behind the batch cap.
        let cursor = self
            .recordings
            .find(doc! { "status": "pending" })
            .sort(doc! { "created_at": 1 })
            .limit(limit)
            .await?;

        Ok(cursor.try_collect().await?)
    }

    async fn mark_done(&self, id: ObjectId, analysis: &Analysis) -> Result<(), StoreError> {
        let analysis = mongodb::bson::to_document(analysis)?;
        self.recordings
            .update_one(
                doc! { "_id": id },
                doc! { "$set": {
                    "status": "done",
                    "analysis": analysis,
                    "error_message": Bson::Null,
                    "updated_at": DateTime::now(),
                }},
            )
            .await?;
        Ok(())
    }

    async fn mark_error(&self, id: ObjectId, message: &str) -> Result<(), StoreError> {
        self.recordings
            .update_one(
                doc! { "_id": id },
                doc! { "$set": {
                    "status": "error",
                    "error_message": message,
                    "updated_at": DateTime::now(),
                }},
            )
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
