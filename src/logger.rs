use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use time::{
    format_description::{self, parse},
    OffsetDateTime,
};
use tracing::{subscriber::set_global_default, Level};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, FmtSubscriber};

/// Log every event to a timestamp-named file in `dir` (current directory if `None`).
///
/// # Errors
/// When the file cannot be created or a global subscriber is already installed.
pub fn init_logger(dir: Option<&Path>) -> anyhow::Result<PathBuf> {
    let file_name = get_log_file_name()?;
    let path = dir.map_or_else(|| PathBuf::from(&file_name), |dir| dir.join(&file_name));
    let file = File::create(&path)
        .with_context(|| format!("could not create log file {}", path.display()))?;
    install(BoxMakeWriter::new(file), Level::TRACE, false)?;
    Ok(path)
}

/// Log events up to `level` to stderr.
pub fn init_stderr_logger(level: Level) -> anyhow::Result<()> {
    install(BoxMakeWriter::new(std::io::stderr), level, true)
}

fn install(writer: BoxMakeWriter, level: Level, ansi: bool) -> anyhow::Result<()> {
    let local_offset =
        time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
    let timer = tracing_subscriber::fmt::time::OffsetTime::new(
        local_offset,
        format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second]")
            .context("invalid log timestamp format")?,
    );

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_ansi(ansi)
        .with_timer(timer)
        .with_thread_names(true)
        .with_writer(writer)
        .finish();

    set_global_default(subscriber).map_err(|e| {
        anyhow!("could not set global default tracing subscriber (already set?): {e}")
    })
}

fn get_log_file_name() -> anyhow::Result<String> {
    let format = parse("[year]-[month]-[day]_[hour]:[minute]:[second]_log.txt")
        .context("invalid log file name format")?;
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(&format).context("could not format log file name")
}
