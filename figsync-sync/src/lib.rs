//! # figsync-sync
//!
//! Publishing generated files to a version-control host.
//!
//! - [`diff`]: delta against the last publish, unified diffs
//! - [`snapshot_store`]: the last published state per document
//! - [`host`]: the [`VcsHost`] capability, GitHub and in-memory
//! - [`builder`]: blobs, tree, commit and a fresh branch
//! - [`publish`]: open or update the change request
//! - [`pipeline`]: [`Synchronizer::synchronize`], the whole run

pub mod builder;
pub mod diff;
pub mod error;
pub mod host;
pub mod pipeline;
pub mod publish;
pub mod snapshot_store;

pub use builder::{BaseMoved, BuildOutcome, BuildRequest, SnapshotBuilder, VcObjectGraph};
pub use diff::{compute_delta, render_unified, FileDiff, SnapshotDelta};
pub use error::{HostError, PublishError, SnapshotError, StoreError, SyncError};
pub use host::{GitHubHost, HostOp, MemoryHost, VcsHost};
pub use pipeline::{NoOpReason, NoOpReport, PublishReport, SyncOutcome, SyncPlan, Synchronizer};
pub use publish::{ChangePublisher, ChangeRequest};
pub use snapshot_store::{
    FileSnapshotStore, MemorySnapshotStore, PublishedSnapshot, SnapshotStore,
};
