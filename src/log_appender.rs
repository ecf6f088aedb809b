use anyhow::{anyhow, Result};
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::rolling_file::policy::compound::{
    roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger, CompoundPolicy,
};
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::fs;
use std::path::Path;

const LOG_FILE_NAME: &str = "onedrive-fuse.log";
const LOG_FILE_LIMIT: u64 = 10 * 1024 * 1024;

/// Map a settings value like "debug" onto a level filter
pub fn parse_level(level: &str) -> Result<LevelFilter> {
    level
        .parse()
        .map_err(|_| anyhow!("Unknown log level: {}", level))
}

/// Console plus rolling file logging under `<log_dir>/logs`
pub fn setup_logging(log_dir: &Path, level: LevelFilter) -> Result<()> {
    let logs = log_dir.join("logs");
    fs::create_dir_all(&logs)?;

    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{h({l})} {d(%Y-%m-%d %H:%M:%S)} {M} - {m}{n}",
        )))
        .build();

    // Keep 3 compressed archives next to the live file
    let archive_pattern = logs.join("onedrive-fuse.{}.log.gz");
    let roller = FixedWindowRoller::builder().base(1).build(
        archive_pattern
            .to_str()
            .ok_or_else(|| anyhow!("Log directory is not valid UTF-8"))?,
        3,
    )?;
    let trigger = SizeTrigger::new(LOG_FILE_LIMIT);
    let policy = CompoundPolicy::new(Box::new(trigger), Box::new(roller));

    let file = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d} {l} {M}::{m}{n}")))
        .build(logs.join(LOG_FILE_NAME), Box::new(policy))?;

    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .appender(Appender::builder().build("file", Box::new(file)))
        .build(
            Root::builder()
                .appender("stdout")
                .appender("file")
                .build(level),
        )?;

    log4rs::init_config(config)?;
    Ok(())
}
