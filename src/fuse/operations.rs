//! FUSE filesystem operations implementation

use crate::error::{FsError, FsResult};
use crate::fuse::filesystem::OneDriveFuse;
use crate::fuse::utils::sync_await;
use crate::onedrive_service::path_utils::join_path;
use crate::tree::ROOT_INO;
use fuser::{
    FileType, Filesystem, KernelConfig, MountOption, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request,
    TimeOrNow,
};
use libc::c_int;
use log::{debug, error, info};
use std::ffi::OsStr;
use std::path::Path;
use std::time::SystemTime;

/// Kernel-facing mount settings
#[derive(Debug, Clone)]
pub struct MountConfig {
    pub fs_name: String,
    pub allow_other: bool,
    pub auto_unmount: bool,
}

impl MountConfig {
    pub fn options(&self) -> Vec<MountOption> {
        let mut options = vec![
            MountOption::RW,
            MountOption::FSName(self.fs_name.clone()),
            MountOption::NoAtime,
        ];
        if self.allow_other {
            options.push(MountOption::AllowOther);
        }
        if self.auto_unmount {
            options.push(MountOption::AutoUnmount);
        }
        options
    }
}

/// Mount and serve until the filesystem is unmounted. Blocks the calling
/// thread, which must not belong to the tokio runtime.
pub fn mount_filesystem(fs: OneDriveFuse, mountpoint: &Path, config: &MountConfig) -> anyhow::Result<()> {
    info!("Mounting OneDrive FUSE filesystem at: {}", mountpoint.display());
    fuser::mount2(fs, mountpoint, &config.options())
        .map_err(|e| anyhow::anyhow!("Failed to mount filesystem: {}", e))?;
    info!("Filesystem at {} unmounted", mountpoint.display());
    Ok(())
}

impl OneDriveFuse {
    fn block_on<F, T>(&self, future: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        sync_await(self.runtime(), future)
    }

    fn path_of(&self, ino: u64) -> FsResult<String> {
        self.block_on(self.tree().path_of(ino))
    }

    fn child_path(&self, parent: u64, name: &OsStr) -> FsResult<String> {
        let parent_path = self.path_of(parent)?;
        Ok(join_path(&parent_path, &name.to_string_lossy()))
    }

    fn log_failure(operation: &str, target: &str, e: &FsError) {
        match e {
            FsError::NotFound(_) => debug!("{} {}: {}", operation, target, e),
            FsError::Remote(_) => error!("{} {} failed: {}", operation, target, e),
            _ => info!("{} {} refused: {}", operation, target, e),
        }
    }

    /// setattr in terms of the path-based operations
    fn apply_setattr(
        &self,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        mtime: Option<TimeOrNow>,
    ) -> FsResult<fuser::FileAttr> {
        let path = self.path_of(ino)?;
        if let Some(mode) = mode {
            self.chmod(&path, mode)?;
        }
        if uid.is_some() || gid.is_some() {
            self.chown(&path, uid, gid)?;
        }
        if let Some(size) = size {
            self.block_on(self.truncate(&path, size))?;
        }
        if let Some(mtime) = mtime {
            let mtime = match mtime {
                TimeOrNow::SpecificTime(time) => time,
                TimeOrNow::Now => SystemTime::now(),
            };
            self.block_on(self.utimens(&path, mtime))?;
        }
        self.block_on(self.attr_of(ino))
    }
}

impl Filesystem for OneDriveFuse {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        info!("FUSE filesystem initialized");
        Ok(())
    }

    fn destroy(&mut self) {
        info!("FUSE filesystem shutting down");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        debug!("LOOKUP: parent={}, name={}", parent, name.to_string_lossy());
        let result = self
            .child_path(parent, name)
            .and_then(|path| self.block_on(self.get_attr(&path)));
        match result {
            Ok(attr) => reply.entry(&self.attr_ttl(), &attr, 0),
            Err(e) => {
                Self::log_failure("LOOKUP", &name.to_string_lossy(), &e);
                reply.error(e.errno());
            }
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        debug!("GETATTR: ino={}", ino);
        match self.block_on(self.attr_of(ino)) {
            Ok(attr) => reply.attr(&self.attr_ttl(), &attr),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        debug!("SETATTR: ino={}", ino);
        match self.apply_setattr(ino, mode, uid, gid, size, mtime) {
            Ok(attr) => reply.attr(&self.attr_ttl(), &attr),
            Err(e) => {
                Self::log_failure("SETATTR", &ino.to_string(), &e);
                reply.error(e.errno());
            }
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        debug!("OPENDIR: ino={}", ino);
        let result = self
            .path_of(ino)
            .and_then(|path| self.block_on(self.open_dir(&path)));
        match result {
            Ok(_) => reply.opened(self.file_handles().open_dir(ino), 0),
            Err(e) => {
                Self::log_failure("OPENDIR", &ino.to_string(), &e);
                reply.error(e.errno());
            }
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        debug!("READDIR: ino={}, offset={}", ino, offset);
        let result = self.path_of(ino).and_then(|path| {
            let entries = self.block_on(self.open_dir(&path))?;
            let parent = if ino == ROOT_INO {
                ino
            } else {
                self.block_on(self.tree().with_item(ino, |item| item.parent_ino()))?
                    .unwrap_or(ROOT_INO)
            };
            Ok((entries, parent))
        });
        let (entries, parent) = match result {
            Ok(found) => found,
            Err(e) => {
                reply.error(e.errno());
                return;
            }
        };

        let dots = [
            (ino, FileType::Directory, ".".to_string()),
            (parent, FileType::Directory, "..".to_string()),
        ];
        let all = dots
            .into_iter()
            .chain(entries.into_iter().map(|e| (e.ino, e.kind, e.name)));
        for (i, (entry_ino, kind, name)) in all.enumerate().skip(offset as usize) {
            // Buffer is full
            if reply.add(entry_ino, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, _flags: i32, reply: ReplyEmpty) {
        OneDriveFuse::release(&*self, fh);
        reply.ok();
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let result = self
            .child_path(parent, name)
            .and_then(|path| self.block_on(OneDriveFuse::mkdir(&*self, &path)));
        match result {
            Ok(attr) => reply.entry(&self.attr_ttl(), &attr, 0),
            Err(e) => {
                Self::log_failure("MKDIR", &name.to_string_lossy(), &e);
                reply.error(e.errno());
            }
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let result = self
            .child_path(parent, name)
            .and_then(|path| self.block_on(OneDriveFuse::rmdir(&*self, &path)));
        match result {
            Ok(()) => reply.ok(),
            Err(e) => {
                Self::log_failure("RMDIR", &name.to_string_lossy(), &e);
                reply.error(e.errno());
            }
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let result = self
            .child_path(parent, name)
            .and_then(|path| self.block_on(OneDriveFuse::unlink(&*self, &path)));
        match result {
            Ok(()) => reply.ok(),
            Err(e) => {
                Self::log_failure("UNLINK", &name.to_string_lossy(), &e);
                reply.error(e.errno());
            }
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let result = self
            .child_path(parent, name)
            .and_then(|path| self.block_on(OneDriveFuse::create(&*self, &path)));
        match result {
            Ok((fh, attr)) => reply.created(&self.attr_ttl(), &attr, 0, fh, 0),
            Err(e) => {
                Self::log_failure("CREATE", &name.to_string_lossy(), &e);
                reply.error(e.errno());
            }
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let result = self
            .path_of(ino)
            .and_then(|path| self.block_on(OneDriveFuse::open(&*self, &path, flags)));
        match result {
            Ok(fh) => reply.opened(fh, 0),
            Err(e) => {
                Self::log_failure("OPEN", &ino.to_string(), &e);
                reply.error(e.errno());
            }
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        debug!("READ: ino={}, fh={}, offset={}, size={}", ino, fh, offset, size);
        match self.block_on(OneDriveFuse::read(&*self, fh, offset.max(0) as u64, size as usize)) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        debug!("WRITE: ino={}, fh={}, offset={}, size={}", ino, fh, offset, data.len());
        match self.block_on(OneDriveFuse::write(&*self, fh, offset.max(0) as u64, data)) {
            Ok(written) => reply.written(written),
            Err(e) => {
                Self::log_failure("WRITE", &ino.to_string(), &e);
                reply.error(e.errno());
            }
        }
    }

    fn flush(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        // The upload runs detached; close returns right away
        match self.block_on(OneDriveFuse::flush(&*self, fh)) {
            Ok(_) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        OneDriveFuse::release(&*self, fh);
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        debug!("STATFS");

        // Return dummy filesystem statistics
        reply.statfs(
            1_000_000_000, // Total blocks
            500_000_000,   // Free blocks
            500_000_000,   // Available blocks
            1_000_000,     // Total files
            500_000,       // Free files
            512,           // Block size
            255,           // Max filename length
            0,             // Fragment size
        );
    }
}
