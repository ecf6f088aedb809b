use crate::common::fixtures::{create_test_file_item, create_test_folder_item, touched, ROOT_ID};
use crate::common::setup::{
    build_tree, default_tree, fast_retry, populated_mock, DOCS_ID, HELLO_ID, REPORT_ID,
};
use onedrive_fuse::tree::{CachePolicy, SyncStatus, ROOT_INO};
use onedrive_fuse::FsError;
use std::time::Duration;

#[tokio::test]
async fn test_children_are_listed_once() {
    let mock = populated_mock();
    let tree = default_tree(&mock);

    let first = tree.get_children("/").await.unwrap();
    let names: Vec<&str> = first.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["Documents", "Empty", "hello.txt"]);
    assert_eq!(mock.get_call_count("list_children"), 1);

    let second = tree.get_children("/").await.unwrap();
    assert_eq!(second, first);
    assert_eq!(mock.get_call_count("list_children"), 1);
}

#[tokio::test]
async fn test_resolve_nested_path() {
    let mock = populated_mock();
    let tree = default_tree(&mock);

    let ino = tree.get_item("/Documents/report.md").await.unwrap();
    assert_eq!(tree.path_of(ino).await.unwrap(), "/Documents/report.md");
    let id = tree.with_item(ino, |item| item.id.clone()).await.unwrap();
    assert_eq!(id, REPORT_ID);
    // One listing for "/" and one for "/Documents"
    assert_eq!(mock.get_call_count("list_children"), 2);

    // Already cached: no further calls, same inode
    assert_eq!(tree.get_item("/Documents/report.md").await.unwrap(), ino);
    assert_eq!(mock.get_call_count("list_children"), 2);
}

#[tokio::test]
async fn test_resolve_root_needs_no_remote_call() {
    let mock = populated_mock();
    let tree = default_tree(&mock);

    assert_eq!(tree.get_item("/").await.unwrap(), ROOT_INO);
    assert_eq!(tree.get_item("").await.unwrap(), ROOT_INO);
    assert!(mock.get_all_call_counts().is_empty());
}

#[tokio::test]
async fn test_resolve_missing_and_through_file() {
    let mock = populated_mock();
    let tree = default_tree(&mock);

    let missing = tree.get_item("/Documents/nope.txt").await.unwrap_err();
    assert!(missing.is_not_found());

    let through_file = tree.get_item("/hello.txt/inner").await.unwrap_err();
    assert!(matches!(through_file, FsError::NotADirectory(_)));
}

#[tokio::test]
async fn test_children_of_file_is_empty() {
    let mock = populated_mock();
    let tree = default_tree(&mock);

    assert!(tree.get_children("/hello.txt").await.unwrap().is_empty());
    // Only the root listing was needed to find the file
    assert_eq!(mock.get_call_count("list_children"), 1);
}

#[tokio::test]
async fn test_failed_listing_is_retried_on_next_access() {
    let mock = populated_mock();
    let tree = default_tree(&mock);

    mock.make_operation_fail("list_children");
    let err = tree.get_children("/").await.unwrap_err();
    assert!(matches!(err, FsError::Remote(_)));

    mock.clear_operation_failures();
    assert_eq!(tree.get_children("/").await.unwrap().len(), 3);
    assert_eq!(mock.get_call_count("list_children"), 2);
}

#[tokio::test]
async fn test_root_nlink_counts_subdirectories() {
    let mock = populated_mock();
    let tree = default_tree(&mock);

    // Unfetched children count as none
    assert_eq!(tree.with_item(ROOT_INO, |i| i.nlink()).await.unwrap(), 2);

    tree.children(ROOT_INO).await.unwrap();
    assert_eq!(tree.with_item(ROOT_INO, |i| i.nlink()).await.unwrap(), 4);

    let file = tree.get_item("/hello.txt").await.unwrap();
    assert_eq!(tree.with_item(file, |i| i.nlink()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_expired_listing_is_merged_by_name() {
    let mock = populated_mock();
    let tree = build_tree(
        &mock,
        CachePolicy {
            children_ttl: Some(Duration::ZERO),
        },
        fast_retry(1),
    );

    let docs = tree.get_item("/Documents").await.unwrap();
    let hello = tree.get_item("/hello.txt").await.unwrap();
    let local = tree.create_file(ROOT_INO, "draft.txt").await.unwrap();

    // Remote side: hello.txt edited, Empty deleted, a new file appeared
    mock.set_children(
        "/",
        vec![
            touched(create_test_file_item(HELLO_ID, "hello.txt", 16, ROOT_ID), 20),
            create_test_folder_item(DOCS_ID, "Documents", 1, ROOT_ID),
            create_test_file_item("file_new", "new.txt", 3, ROOT_ID),
        ],
    );

    let names: Vec<String> = tree
        .get_children("/")
        .await
        .unwrap()
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert_eq!(names, vec!["Documents", "draft.txt", "hello.txt", "new.txt"]);

    // Surviving entries keep their inode numbers
    assert_eq!(tree.get_item("/Documents").await.unwrap(), docs);
    assert_eq!(tree.get_item("/hello.txt").await.unwrap(), hello);
    assert_eq!(tree.get_item("/draft.txt").await.unwrap(), local);
    assert_eq!(tree.with_item(hello, |i| i.size).await.unwrap(), 20);
    assert!(tree.get_item("/Empty").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_expired_listing_served_stale_when_refresh_fails() {
    let mock = populated_mock();
    let tree = build_tree(
        &mock,
        CachePolicy {
            children_ttl: Some(Duration::ZERO),
        },
        fast_retry(1),
    );

    assert_eq!(tree.get_children("/").await.unwrap().len(), 3);
    mock.make_operation_fail("list_children");
    assert_eq!(tree.get_children("/").await.unwrap().len(), 3);
    assert_eq!(mock.get_call_count("list_children"), 2);
}

#[tokio::test]
async fn test_open_fetches_remote_content_each_time() {
    let mock = populated_mock();
    let tree = default_tree(&mock);
    let hello = tree.get_item("/hello.txt").await.unwrap();

    tree.open_file(hello).await.unwrap();
    assert_eq!(tree.read(hello, 0, 5).await.unwrap(), b"Hello");

    mock.set_content(HELLO_ID, b"Changed remotely");
    tree.open_file(hello).await.unwrap();
    assert_eq!(tree.read(hello, 0, 7).await.unwrap(), b"Changed");
    assert_eq!(mock.get_call_count("download_content"), 2);
}

#[tokio::test]
async fn test_fetch_refused_while_dirty() {
    let mock = populated_mock();
    let tree = default_tree(&mock);
    let hello = tree.get_item("/hello.txt").await.unwrap();

    tree.fetch_content(hello).await.unwrap();
    tree.write(hello, 0, b"J").await.unwrap();

    let err = tree.fetch_content(hello).await.unwrap_err();
    assert!(matches!(err, FsError::UnflushedChanges(_)));
    assert_eq!(err.errno(), libc::EBUSY);
    assert_eq!(tree.read(hello, 0, 16).await.unwrap(), b"Jello, OneDrive!");
    assert_eq!(mock.get_call_count("download_content"), 1);

    // Opening keeps serving the local buffer
    tree.open_file(hello).await.unwrap();
    assert_eq!(mock.get_call_count("download_content"), 1);
}

#[tokio::test]
async fn test_fetch_content_of_directory() {
    let mock = populated_mock();
    let tree = default_tree(&mock);
    let docs = tree.get_item("/Documents").await.unwrap();

    let err = tree.fetch_content(docs).await.unwrap_err();
    assert!(matches!(err, FsError::IsADirectory(_)));
    assert_eq!(mock.get_call_count("download_content"), 0);
}

#[tokio::test]
async fn test_truncate_downloads_before_cutting() {
    let mock = populated_mock();
    let tree = default_tree(&mock);
    let hello = tree.get_item("/hello.txt").await.unwrap();

    tree.truncate(hello, 5).await.unwrap();
    assert_eq!(mock.get_call_count("download_content"), 1);
    assert_eq!(tree.read(hello, 0, 100).await.unwrap(), b"Hello");
    assert_eq!(tree.with_item(hello, |i| i.size).await.unwrap(), 5);
    assert!(tree.with_item(hello, |i| i.is_dirty()).await.unwrap());
}

#[tokio::test]
async fn test_truncate_to_zero_skips_download() {
    let mock = populated_mock();
    let tree = default_tree(&mock);
    let hello = tree.get_item("/hello.txt").await.unwrap();

    tree.truncate(hello, 0).await.unwrap();
    assert_eq!(mock.get_call_count("download_content"), 0);
    assert!(tree.read(hello, 0, 100).await.unwrap().is_empty());
    assert_eq!(tree.sync_status(hello).await.unwrap(), SyncStatus::Pending);
}

#[tokio::test]
async fn test_create_file_is_local_and_pending() {
    let mock = populated_mock();
    let tree = default_tree(&mock);

    let ino = tree.create_file(ROOT_INO, "notes.txt").await.unwrap();
    let (local, dirty, path) = tree
        .with_item(ino, |i| (i.is_local_only(), i.is_dirty(), i.path()))
        .await
        .unwrap();
    assert!(local);
    assert!(dirty);
    assert_eq!(path, "/notes.txt");
    assert_eq!(tree.sync_status(ino).await.unwrap(), SyncStatus::Pending);
    assert_eq!(tree.lookup(ROOT_INO, "notes.txt").await.unwrap(), ino);
    assert_eq!(mock.get_call_count("upload_new_file"), 0);
}

#[tokio::test]
async fn test_create_rejects_existing_and_bad_names() {
    let mock = populated_mock();
    let tree = default_tree(&mock);

    let exists = tree.create_file(ROOT_INO, "hello.txt").await.unwrap_err();
    assert!(matches!(exists, FsError::AlreadyExists(_)));

    for bad in ["", ".", "..", "a/b"] {
        let err = tree.create_file(ROOT_INO, bad).await.unwrap_err();
        assert!(matches!(err, FsError::InvalidName(_)), "{:?}", bad);
    }

    let hello = tree.get_item("/hello.txt").await.unwrap();
    let in_file = tree.create_file(hello, "x").await.unwrap_err();
    assert!(matches!(in_file, FsError::NotADirectory(_)));
}

#[tokio::test]
async fn test_create_dir_starts_with_empty_listing() {
    let mock = populated_mock();
    let tree = default_tree(&mock);
    let docs = tree.get_item("/Documents").await.unwrap();
    let listings = mock.get_call_count("list_children");

    let ino = tree.create_dir(docs, "Archive").await.unwrap();
    assert_eq!(
        mock.created_folders(),
        vec![("/Documents".to_string(), "Archive".to_string())]
    );
    assert!(tree.children(ino).await.unwrap().is_empty());
    assert_eq!(tree.get_item("/Documents/Archive").await.unwrap(), ino);
    assert_eq!(mock.get_call_count("list_children"), listings);
}

#[tokio::test]
async fn test_remove_file_forgets_inode() {
    let mock = populated_mock();
    let tree = default_tree(&mock);
    let hello = tree.get_item("/hello.txt").await.unwrap();
    let before = tree.len();

    tree.remove_file(ROOT_INO, "hello.txt").await.unwrap();
    assert_eq!(mock.deleted(), vec![HELLO_ID.to_string()]);
    assert!(tree.node(hello).is_err());
    assert_eq!(tree.len(), before - 1);
    assert!(tree.lookup(ROOT_INO, "hello.txt").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_remove_local_file_skips_remote_delete() {
    let mock = populated_mock();
    let tree = default_tree(&mock);

    tree.create_file(ROOT_INO, "scratch").await.unwrap();
    tree.remove_file(ROOT_INO, "scratch").await.unwrap();
    assert_eq!(mock.get_call_count("delete_item"), 0);
}

#[tokio::test]
async fn test_remove_dir_keeps_item_when_remote_delete_fails() {
    let mock = populated_mock();
    let tree = default_tree(&mock);
    let empty = tree.get_item("/Empty").await.unwrap();

    mock.make_operation_fail("delete_item");
    let err = tree.remove_dir(ROOT_INO, "Empty").await.unwrap_err();
    assert!(matches!(err, FsError::Remote(_)));
    assert_eq!(tree.get_item("/Empty").await.unwrap(), empty);
}

#[tokio::test]
async fn test_remove_dir_subtree_is_forgotten() {
    let mock = populated_mock();
    let tree = default_tree(&mock);
    let docs = tree.get_item("/Documents").await.unwrap();
    let report = tree.get_item("/Documents/report.md").await.unwrap();

    tree.remove_file(docs, "report.md").await.unwrap();
    tree.remove_dir(ROOT_INO, "Documents").await.unwrap();
    assert_eq!(mock.deleted(), vec![REPORT_ID.to_string(), DOCS_ID.to_string()]);
    assert!(tree.node(docs).is_err());
    assert!(tree.node(report).is_err());
}

#[tokio::test]
async fn test_truncate_beyond_buffer_limit_is_refused() {
    let mock = populated_mock();
    let tree = default_tree(&mock);
    let hello = tree.get_item("/hello.txt").await.unwrap();

    let err = tree.truncate(hello, i64::MAX as u64).await.unwrap_err();
    assert!(matches!(err, FsError::FileTooLarge(_)));
    assert_eq!(err.errno(), libc::EFBIG);
    // Refused before anything is downloaded
    assert_eq!(mock.get_call_count("download_content"), 0);
    assert!(!tree.with_item(hello, |i| i.is_dirty()).await.unwrap());
}

#[tokio::test]
async fn test_write_past_buffer_limit_is_refused() {
    let mock = populated_mock();
    let tree = default_tree(&mock);
    let ino = tree.create_file(ROOT_INO, "sparse.bin").await.unwrap();
    tree.write(ino, 0, b"head").await.unwrap();

    let err = tree.write(ino, i64::MAX as u64 - 1, b"ab").await.unwrap_err();
    assert_eq!(err.errno(), libc::EFBIG);
    let err = tree.write(ino, u64::MAX, b"ab").await.unwrap_err();
    assert!(matches!(err, FsError::FileTooLarge(_)));

    assert_eq!(tree.read(ino, 0, 64).await.unwrap(), b"head");
    assert_eq!(tree.with_item(ino, |i| i.size).await.unwrap(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_listings_share_one_fetch() {
    let mock = populated_mock();
    let tree = default_tree(&mock);

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let tree = tree.clone();
            tokio::spawn(async move { tree.get_children("/Documents").await })
        })
        .collect();
    for task in tasks {
        let children = task.await.unwrap().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].0, "report.md");
    }

    // One listing for the root and one for /Documents
    assert_eq!(mock.get_call_count("list_children"), 2);
    let docs = tree.get_item("/Documents").await.unwrap();
    let report = tree.get_item("/Documents/report.md").await.unwrap();
    assert_eq!(tree.lookup(docs, "report.md").await.unwrap(), report);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writes_land_intact() {
    let mock = populated_mock();
    let tree = default_tree(&mock);
    let ino = tree.create_file(ROOT_INO, "shared.bin").await.unwrap();
    let start = tree.with_item(ino, |i| i.revision()).await.unwrap();

    let tasks: Vec<_> = (0..16u8)
        .map(|i| {
            let tree = tree.clone();
            tokio::spawn(async move { tree.write(ino, i as u64 * 4, &[i; 4]).await })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), 4);
    }

    let content = tree.read(ino, 0, 128).await.unwrap();
    assert_eq!(content.len(), 64);
    for (i, chunk) in content.chunks(4).enumerate() {
        assert_eq!(chunk, [i as u8; 4]);
    }
    let (size, revision, dirty) = tree
        .with_item(ino, |i| (i.size, i.revision(), i.is_dirty()))
        .await
        .unwrap();
    assert_eq!(size, 64);
    assert_eq!(revision, start + 16);
    assert!(dirty);
}
