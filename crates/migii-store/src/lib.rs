//! `migii-store`: SQLite persistence for workers and job postings.
//!
//! Every write publishes a [`ChangeEvent`](migii_protocol::ChangeEvent) on the
//! store's [`ChangeJournal`], which is what [`SqliteChangeFeed`] exposes as a
//! native change stream when `database.change_streams` is enabled.

pub mod db;
pub mod error;
pub mod feed;
pub mod journal;
pub mod store;
pub mod types;

pub use error::{Result, StoreError};
pub use feed::SqliteChangeFeed;
pub use journal::ChangeJournal;
pub use store::Store;
pub use types::{
    JobPosting, JobStatus, NewJobPosting, NewWorker, Worker, WorkerDocument, WorkerFilter,
    WorkerStatus,
};
