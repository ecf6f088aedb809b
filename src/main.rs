use anyhow::{anyhow, Context, Result};
use clap::{Arg, ArgAction, Command};
use log::{error, info, LevelFilter};
use onedrive_fuse::auth::OneDriveAuth;
use onedrive_fuse::config::ProjectConfig;
use onedrive_fuse::fuse::{mount_filesystem, OneDriveFuse};
use onedrive_fuse::log_appender::{parse_level, setup_logging};
use onedrive_fuse::onedrive_service::{OneDriveClient, OneDriveClientTrait};
use onedrive_fuse::tree::{DriveTree, UploadWorker};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn cli() -> Command {
    Command::new("onedrive-fuse")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Mount OneDrive as a FUSE filesystem")
        .arg(
            Arg::new("mountpoint")
                .value_name("MOUNTPOINT")
                .help("Directory to mount the drive on")
                .required_unless_present("auth-only"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Settings file to use instead of the default one")
                .num_args(1),
        )
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .help("Log at debug level")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("auth-only")
                .long("auth-only")
                .help("Run the browser login, store the tokens and exit")
                .action(ArgAction::SetTrue),
        )
}

fn unmount(mountpoint: &Path) -> std::io::Result<std::process::Output> {
    std::process::Command::new("fusermount")
        .arg("-u")
        .arg(mountpoint)
        .output()
}

fn main() -> Result<()> {
    let matches = cli().get_matches();
    let settings_path = matches.get_one::<String>("config").map(PathBuf::from);
    let auth_only = matches.get_flag("auth-only");

    let project_config = ProjectConfig::new(settings_path.as_deref())?;
    let settings = project_config.settings.clone();
    let level = if matches.get_flag("debug") {
        LevelFilter::Debug
    } else {
        parse_level(&settings.log_level)?
    };
    setup_logging(project_config.data_dir(), level)?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    let auth = Arc::new(OneDriveAuth::new(project_config.config_dir())?);

    runtime.block_on(async {
        if auth_only || !auth.has_stored_tokens() {
            auth.authorize().await?;
        }
        Ok::<_, anyhow::Error>(())
    })?;
    if auth_only {
        info!("Authorization complete");
        return Ok(());
    }

    let mountpoint = matches
        .get_one::<String>("mountpoint")
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("A mount point is required"))?;

    // Clears stale mounts such as "Transport endpoint is not connected"
    let _ = unmount(&mountpoint);
    if !mountpoint.is_dir() {
        return Err(anyhow!(
            "Mount point is not an existing directory: {}",
            mountpoint.display()
        ));
    }

    let client: Arc<dyn OneDriveClientTrait> = Arc::new(OneDriveClient::new(auth));
    let uploader = UploadWorker::new(runtime.handle().clone(), settings.upload.retry_config());
    let tree = runtime.block_on(DriveTree::load(client, settings.cache.policy(), uploader))?;
    let fs = OneDriveFuse::new(tree, runtime.handle().clone(), settings.mount.attr_ttl());

    let mountpoint_for_shutdown = mountpoint.clone();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal, unmounting...");
        if let Err(e) = unmount(&mountpoint_for_shutdown) {
            error!("Failed to unmount filesystem: {}", e);
        }
    })
    .context("Error setting Ctrl-C handler")?;

    // FUSE blocks; keep it off the runtime so callbacks can block_on
    let mount_config = settings.mount.mount_config();
    let mount_thread = std::thread::spawn(move || mount_filesystem(fs, &mountpoint, &mount_config));
    match mount_thread.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("FUSE thread panicked")),
    }
}
