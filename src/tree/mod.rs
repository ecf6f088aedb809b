//! In-memory drive tree: items, path resolution and uploads

pub mod drive_tree;
pub mod item;
pub mod resolver;
pub mod upload_worker;

pub use drive_tree::{CachePolicy, DriveTree};
pub use item::{Item, SyncStatus, ROOT_INO};
pub use upload_worker::{RetryConfig, UploadWorker};
