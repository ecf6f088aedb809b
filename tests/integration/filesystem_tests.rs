use crate::common::fixtures::ROOT_ID;
use crate::common::setup::{build_fs, populated_mock, EMPTY_ID, HELLO_ID};
use fuser::FileType;
use onedrive_fuse::fuse::utils::mount_owner;
use onedrive_fuse::tree::SyncStatus;
use onedrive_fuse::FsError;
use std::time::{Duration, SystemTime};

#[tokio::test]
async fn test_ignored_paths_never_reach_the_drive() {
    let mock = populated_mock();
    let fs = build_fs(&mock);

    for path in ["/.DS_Store", "/.Trash-1000", "/autorun.inf", "/BDMV"] {
        let err = fs.get_attr(path).await.unwrap_err();
        assert!(err.is_not_found(), "{}", path);
    }
    assert!(fs.open_dir("/.Trash").await.unwrap_err().is_not_found());
    assert!(mock.get_all_call_counts().is_empty());
}

#[tokio::test]
async fn test_get_attr_of_root() {
    let mock = populated_mock();
    let fs = build_fs(&mock);

    let attr = fs.get_attr("/").await.unwrap();
    assert_eq!(attr.kind, FileType::Directory);
    assert_eq!(attr.size, 4096);
    assert_eq!(attr.perm, 0o755);
    assert_eq!((attr.uid, attr.gid), mount_owner());
}

#[tokio::test]
async fn test_get_attr_of_file() {
    let mock = populated_mock();
    let fs = build_fs(&mock);

    let attr = fs.get_attr("/hello.txt").await.unwrap();
    assert_eq!(attr.kind, FileType::RegularFile);
    assert_eq!(attr.size, 16);
    assert_eq!(attr.perm, 0o644);
    assert_eq!(attr.nlink, 1);
    // Attributes come from the listing; nothing is downloaded
    assert_eq!(mock.get_call_count("download_content"), 0);
}

#[tokio::test]
async fn test_lookup_failures_read_as_missing() {
    let mock = populated_mock();
    let fs = build_fs(&mock);

    mock.make_operation_fail("list_children");
    let err = fs.get_attr("/hello.txt").await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.errno(), libc::ENOENT);

    mock.clear_operation_failures();
    assert!(fs.get_attr("/hello.txt").await.is_ok());
    assert!(fs.get_attr("/missing").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_open_dir_lists_entries_with_kinds() {
    let mock = populated_mock();
    let fs = build_fs(&mock);

    let entries = fs.open_dir("/").await.unwrap();
    let listed: Vec<(&str, FileType)> =
        entries.iter().map(|e| (e.name.as_str(), e.kind)).collect();
    assert_eq!(
        listed,
        vec![
            ("Documents", FileType::Directory),
            ("Empty", FileType::Directory),
            ("hello.txt", FileType::RegularFile),
        ]
    );

    let docs = fs.open_dir("/Documents").await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].name, "report.md");
}

#[tokio::test]
async fn test_open_dir_errors() {
    let mock = populated_mock();
    let fs = build_fs(&mock);

    let err = fs.open_dir("/hello.txt").await.unwrap_err();
    assert!(matches!(err, FsError::NotADirectory(_)));

    mock.make_operation_fail("list_children");
    assert!(fs.open_dir("/Documents").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_chmod_and_chown_are_refused() {
    let mock = populated_mock();
    let fs = build_fs(&mock);

    let chmod = fs.chmod("/hello.txt", 0o600).unwrap_err();
    assert_eq!(chmod.errno(), libc::EPERM);
    let chown = fs.chown("/hello.txt", Some(0), None).unwrap_err();
    assert_eq!(chown.errno(), libc::EPERM);
    assert!(mock.get_all_call_counts().is_empty());
}

#[tokio::test]
async fn test_remote_file_opens_read_only() {
    let mock = populated_mock();
    let fs = build_fs(&mock);

    for flags in [libc::O_WRONLY, libc::O_RDWR] {
        let err = fs.open("/hello.txt", flags).await.unwrap_err();
        assert_eq!(err.errno(), libc::EPERM);
    }
    assert_eq!(mock.get_call_count("download_content"), 0);

    let fh = fs.open("/hello.txt", libc::O_RDONLY).await.unwrap();
    assert_eq!(fs.read(fh, 7, 8).await.unwrap(), b"OneDrive");
    assert_eq!(fs.read(fh, 100, 8).await.unwrap(), b"");

    let write = fs.write(fh, 0, b"nope").await.unwrap_err();
    assert!(matches!(write, FsError::PermissionDenied(_)));
    fs.release(fh);
    assert_eq!(fs.file_handles().open_count(), 0);
}

#[tokio::test]
async fn test_open_directory_as_file() {
    let mock = populated_mock();
    let fs = build_fs(&mock);

    let err = fs.open("/Documents", libc::O_RDONLY).await.unwrap_err();
    assert!(matches!(err, FsError::IsADirectory(_)));
}

#[tokio::test]
async fn test_create_write_read_and_flush() {
    let mock = populated_mock();
    let fs = build_fs(&mock);

    let (fh, attr) = fs.create("/Documents/todo.txt").await.unwrap();
    assert_eq!(attr.kind, FileType::RegularFile);
    assert_eq!(attr.size, 0);

    assert_eq!(fs.write(fh, 0, b"buy milk").await.unwrap(), 8);
    assert_eq!(fs.read(fh, 4, 4).await.unwrap(), b"milk");
    assert_eq!(fs.get_attr("/Documents/todo.txt").await.unwrap().size, 8);

    let upload = fs.flush(fh).await.unwrap().expect("dirty file schedules an upload");
    upload.await.unwrap();
    fs.release(fh);

    let uploads = mock.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].target, "folder_docs");
    assert_eq!(uploads[0].name.as_deref(), Some("todo.txt"));
    assert_eq!(uploads[0].data, b"buy milk");

    let ino = fs.tree().get_item("/Documents/todo.txt").await.unwrap();
    let (dirty, local) = fs
        .tree()
        .with_item(ino, |i| (i.is_dirty(), i.is_local_only()))
        .await
        .unwrap();
    assert!(!dirty);
    assert!(!local);
    assert_eq!(fs.tree().sync_status(ino).await.unwrap(), SyncStatus::Clean);
}

#[tokio::test]
async fn test_touch_uploads_empty_file() {
    let mock = populated_mock();
    let fs = build_fs(&mock);

    let (fh, _) = fs.create("/empty.log").await.unwrap();
    fs.flush(fh).await.unwrap().unwrap().await.unwrap();

    let uploads = mock.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].target, ROOT_ID);
    assert!(uploads[0].data.is_empty());

    // A second flush of a clean file does nothing
    assert!(fs.flush(fh).await.unwrap().is_none());
    assert_eq!(mock.get_call_count("upload_new_file"), 1);
}

#[tokio::test]
async fn test_local_file_can_be_reopened_for_write() {
    let mock = populated_mock();
    let fs = build_fs(&mock);

    let (fh, _) = fs.create("/draft.md").await.unwrap();
    fs.write(fh, 0, b"one").await.unwrap();
    fs.release(fh);

    let fh = fs.open("/draft.md", libc::O_WRONLY).await.unwrap();
    fs.write(fh, 3, b" two").await.unwrap();
    assert_eq!(fs.read(fh, 0, 64).await.unwrap(), b"one two");
    assert_eq!(mock.get_call_count("download_content"), 0);
}

#[tokio::test]
async fn test_create_existing_path() {
    let mock = populated_mock();
    let fs = build_fs(&mock);

    let err = fs.create("/hello.txt").await.unwrap_err();
    assert_eq!(err.errno(), libc::EEXIST);
    let err = fs.create("/nowhere/new.txt").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_mkdir_creates_remote_folder() {
    let mock = populated_mock();
    let fs = build_fs(&mock);

    let attr = fs.mkdir("/New Folder").await.unwrap();
    assert_eq!(attr.kind, FileType::Directory);
    assert_eq!(attr.perm, 0o755);

    fs.mkdir("/Documents/Sub dir").await.unwrap();
    assert_eq!(
        mock.created_folders(),
        vec![
            ("/".to_string(), "New Folder".to_string()),
            ("/Documents".to_string(), "Sub dir".to_string()),
        ]
    );

    let listings = mock.get_call_count("list_children");
    assert!(fs.open_dir("/Documents/Sub dir").await.unwrap().is_empty());
    assert_eq!(mock.get_call_count("list_children"), listings);
}

#[tokio::test]
async fn test_mkdir_errors() {
    let mock = populated_mock();
    let fs = build_fs(&mock);

    let exists = fs.mkdir("/Documents").await.unwrap_err();
    assert_eq!(exists.errno(), libc::EEXIST);

    mock.make_operation_fail("create_folder");
    let remote = fs.mkdir("/Photos").await.unwrap_err();
    assert!(matches!(remote, FsError::Remote(_)));
    assert!(fs.get_attr("/Photos").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_rmdir() {
    let mock = populated_mock();
    let fs = build_fs(&mock);

    let not_empty = fs.rmdir("/Documents").await.unwrap_err();
    assert_eq!(not_empty.errno(), libc::ENOTEMPTY);
    assert_eq!(mock.get_call_count("delete_item"), 0);

    let not_dir = fs.rmdir("/hello.txt").await.unwrap_err();
    assert_eq!(not_dir.errno(), libc::ENOTDIR);

    fs.rmdir("/Empty").await.unwrap();
    assert_eq!(mock.deleted(), vec![EMPTY_ID.to_string()]);
    assert!(fs.get_attr("/Empty").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_unlink() {
    let mock = populated_mock();
    let fs = build_fs(&mock);

    let fh = fs.open("/hello.txt", libc::O_RDONLY).await.unwrap();
    fs.unlink("/hello.txt").await.unwrap();
    assert_eq!(mock.deleted(), vec![HELLO_ID.to_string()]);
    assert!(fs.file_handles().get(fh).is_none());
    assert!(fs.get_attr("/hello.txt").await.unwrap_err().is_not_found());

    let is_dir = fs.unlink("/Documents").await.unwrap_err();
    assert_eq!(is_dir.errno(), libc::EISDIR);
    let missing = fs.unlink("/hello.txt").await.unwrap_err();
    assert!(missing.is_not_found());
}

#[tokio::test]
async fn test_truncate_by_path() {
    let mock = populated_mock();
    let fs = build_fs(&mock);

    let (fh, _) = fs.create("/word.txt").await.unwrap();
    fs.write(fh, 0, b"HELLOWORLD").await.unwrap();

    let attr = fs.truncate("/word.txt", 5).await.unwrap();
    assert_eq!(attr.size, 5);
    assert_eq!(fs.read(fh, 0, 100).await.unwrap(), b"HELLO");

    let attr = fs.truncate("/word.txt", 8).await.unwrap();
    assert_eq!(attr.size, 8);
    assert_eq!(fs.read(fh, 0, 100).await.unwrap(), b"HELLO\0\0\0");
}

#[tokio::test]
async fn test_huge_sizes_report_file_too_large() {
    let mock = populated_mock();
    let fs = build_fs(&mock);

    let err = fs.truncate("/hello.txt", i64::MAX as u64).await.unwrap_err();
    assert_eq!(err.errno(), libc::EFBIG);

    let (fh, _) = fs.create("/huge.bin").await.unwrap();
    let err = fs.write(fh, i64::MAX as u64 - 1, b"ab").await.unwrap_err();
    assert_eq!(err.errno(), libc::EFBIG);
    assert_eq!(fs.get_attr("/huge.bin").await.unwrap().size, 0);
    assert_eq!(mock.get_call_count("download_content"), 0);
}

#[tokio::test]
async fn test_write_past_end_fills_gap_with_zeros() {
    let mock = populated_mock();
    let fs = build_fs(&mock);

    let (fh, _) = fs.create("/sparse.bin").await.unwrap();
    fs.write(fh, 4, b"ab").await.unwrap();
    assert_eq!(fs.read(fh, 0, 16).await.unwrap(), b"\0\0\0\0ab");
}

#[tokio::test]
async fn test_utimens_sets_mtime() {
    let mock = populated_mock();
    let fs = build_fs(&mock);

    let when = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
    let attr = fs.utimens("/hello.txt", when).await.unwrap();
    assert_eq!(attr.mtime, when);
    assert_eq!(fs.get_attr("/hello.txt").await.unwrap().mtime, when);

    // Timestamps alone do not make the file dirty
    let ino = fs.tree().get_item("/hello.txt").await.unwrap();
    assert!(!fs.tree().with_item(ino, |i| i.is_dirty()).await.unwrap());
}

#[tokio::test]
async fn test_unknown_handle() {
    let mock = populated_mock();
    let fs = build_fs(&mock);

    assert!(fs.read(42, 0, 1).await.unwrap_err().is_not_found());
    assert!(fs.flush(42).await.unwrap_err().is_not_found());
}
