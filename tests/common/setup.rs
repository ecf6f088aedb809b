#![allow(dead_code)]

use super::fixtures::{
    create_test_file_item, create_test_folder_item, create_test_root, ROOT_ID,
};
use super::mock_onedrive_client::MockOneDriveClient;
use onedrive_fuse::fuse::OneDriveFuse;
use onedrive_fuse::onedrive_service::OneDriveClientTrait;
use onedrive_fuse::tree::{CachePolicy, DriveTree, RetryConfig, UploadWorker};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

pub const HELLO_ID: &str = "file_hello";
pub const DOCS_ID: &str = "folder_docs";
pub const REPORT_ID: &str = "file_report";
pub const EMPTY_ID: &str = "folder_empty";

/// Quick retries so failing uploads settle fast
pub fn fast_retry(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        delay_ms: 1,
    }
}

/// A small drive:
///
/// ```text
/// /hello.txt            "Hello, OneDrive!"
/// /Documents/report.md  "# Report"
/// /Empty/
/// ```
pub fn populated_mock() -> MockOneDriveClient {
    let mock = MockOneDriveClient::new(create_test_root());
    mock.set_children(
        "/",
        vec![
            create_test_file_item(HELLO_ID, "hello.txt", 16, ROOT_ID),
            create_test_folder_item(DOCS_ID, "Documents", 1, ROOT_ID),
            create_test_folder_item(EMPTY_ID, "Empty", 0, ROOT_ID),
        ],
    );
    mock.set_children(
        "/Documents",
        vec![create_test_file_item(REPORT_ID, "report.md", 8, DOCS_ID)],
    );
    mock.set_content(HELLO_ID, b"Hello, OneDrive!");
    mock.set_content(REPORT_ID, b"# Report");
    mock
}

/// Tree over the mock, built around the fixture root without calling get_root.
/// Must be called from inside a tokio runtime.
pub fn build_tree(mock: &MockOneDriveClient, policy: CachePolicy, retry: RetryConfig) -> Arc<DriveTree> {
    let client: Arc<dyn OneDriveClientTrait> = Arc::new(mock.clone());
    let uploader = UploadWorker::new(Handle::current(), retry);
    DriveTree::new(client, create_test_root(), policy, uploader)
}

pub fn default_tree(mock: &MockOneDriveClient) -> Arc<DriveTree> {
    build_tree(mock, CachePolicy::default(), fast_retry(1))
}

pub fn build_fs(mock: &MockOneDriveClient) -> OneDriveFuse {
    OneDriveFuse::new(default_tree(mock), Handle::current(), Duration::from_secs(1))
}
