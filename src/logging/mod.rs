//! 日志系统: 控制台 + 按日滚动的文件输出.
//!
//! 解码核心通过 `log` 门面输出, tracing-subscriber 的 `tracing-log` 桥接把这些
//! 记录转发到同一组 layer.

use anyhow::{Context, Result};
use chrono::{Datelike, Duration as ChronoDuration, Local, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, FormatEvent, FormatFields, format::Writer},
    layer::{Layer, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// 文件日志级别, 可被 `RUST_LOG` 覆盖
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_directory")]
    pub directory: String,
    #[serde(default = "default_prefix")]
    pub file_prefix: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    /// 是否同时输出到控制台
    #[serde(default = "default_true")]
    pub console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            directory: default_directory(),
            file_prefix: default_prefix(),
            retention_days: default_retention_days(),
            console: true,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_directory() -> String {
    "logs".to_string()
}

fn default_prefix() -> String {
    "tao-avc".to_string()
}

fn default_retention_days() -> i64 {
    30
}

fn default_true() -> bool {
    true
}

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// 初始化全局日志订阅器
///
/// 全局订阅器只能安装一次, 重复调用返回错误.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let directory = Path::new(&config.directory);
    fs::create_dir_all(directory)
        .with_context(|| format!("创建日志目录失败, path={}", directory.display()))?;
    cleanup_logs(config)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(&config.file_prefix)
        .filename_suffix("log")
        .build(directory)
        .context("创建滚动日志文件失败")?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_filter = env_filter(&config.level);
    let file_layer = fmt::Layer::default()
        .with_writer(non_blocking)
        .with_ansi(false)
        .event_format(FileFormatter)
        .with_filter(file_filter);

    let console_layer = config.console.then(|| {
        fmt::Layer::default()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .event_format(ConsoleFormatter)
            .with_filter(env_filter(&config.level))
    });

    Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("安装全局日志订阅器失败")?;
    LOG_GUARD.set(guard).ok();
    Ok(())
}

/// `RUST_LOG` 优先, 否则使用配置级别
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

pub(crate) fn build_log_path(directory: &Path, prefix: &str, date: NaiveDate) -> PathBuf {
    directory.join(format!("{}.{}.log", prefix, date.format("%Y-%m-%d")))
}

/// 删除超过保留天数的历史日志
pub(crate) fn cleanup_logs(config: &LoggingConfig) -> Result<usize> {
    let directory = Path::new(&config.directory);
    if !directory.exists() {
        return Ok(0);
    }
    let cutoff = Local::now().date_naive() - ChronoDuration::days(config.retention_days);
    let mut removed = 0;
    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy().to_string();
        let Some(date) = parse_log_name(&file_name, &config.file_prefix) else {
            continue;
        };
        if date < cutoff && fs::remove_file(entry.path()).is_ok() {
            removed += 1;
        }
    }
    Ok(removed)
}

fn parse_log_name(file_name: &str, prefix: &str) -> Option<NaiveDate> {
    let date_part = file_name
        .strip_prefix(prefix)?
        .strip_prefix('.')?
        .strip_suffix(".log")?;
    if date_part.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

fn write_timestamp(writer: &mut Writer<'_>) -> std::fmt::Result {
    let now = Local::now();
    write!(
        writer,
        "[{:02}-{:02} {:02}:{:02}:{:02}.{:03}] ",
        now.month(),
        now.day(),
        now.hour(),
        now.minute(),
        now.second(),
        now.timestamp_subsec_millis()
    )
}

struct ConsoleFormatter;

impl<S, N> FormatEvent<S, N> for ConsoleFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let meta = event.metadata();
        write_timestamp(&mut writer)?;
        let color = match *meta.level() {
            tracing::Level::ERROR => "\x1b[31m",
            tracing::Level::WARN => "\x1b[33m",
            tracing::Level::INFO => "\x1b[32m",
            _ => "\x1b[34m",
        };
        write!(
            writer,
            "{}{:5}\x1b[0m {} > ",
            color,
            meta.level().to_string(),
            meta.target()
        )?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

struct FileFormatter;

impl<S, N> FormatEvent<S, N> for FileFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        write_timestamp(&mut writer)?;
        write!(writer, "{:5} > ", event.metadata().level().to_string())?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_build_log_path() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 6);
        match date {
            Some(date) => {
                let path = build_log_path(Path::new("logs"), "decoder", date);
                assert_eq!(path, PathBuf::from("logs/decoder.2026-02-06.log"));
            }
            None => panic!("测试日期初始化失败"),
        }
    }

    #[test]
    fn test_parse_log_name() {
        assert_eq!(
            parse_log_name("decoder.2026-02-06.log", "decoder"),
            NaiveDate::from_ymd_opt(2026, 2, 6)
        );
        assert!(parse_log_name("decoder.log", "decoder").is_none());
        assert!(parse_log_name("other.2026-02-06.log", "decoder").is_none());
        assert!(parse_log_name("decoder.2026-2-6.log", "decoder").is_none());
    }

    #[test]
    fn test_cleanup_removes_expired_logs() {
        let temp_dir = match TempDir::new() {
            Ok(temp_dir) => temp_dir,
            Err(err) => panic!("创建临时目录失败: {}", err),
        };
        let config = LoggingConfig {
            directory: temp_dir.path().to_string_lossy().to_string(),
            file_prefix: "decoder".to_string(),
            retention_days: 7,
            ..LoggingConfig::default()
        };
        let today = Local::now().date_naive();
        let old = build_log_path(temp_dir.path(), "decoder", today - ChronoDuration::days(30));
        let recent = build_log_path(temp_dir.path(), "decoder", today - ChronoDuration::days(1));
        let unrelated = temp_dir.path().join("notes.txt");
        for path in [&old, &recent, &unrelated] {
            assert!(fs::write(path, b"x").is_ok(), "写入测试文件失败");
        }

        let removed = cleanup_logs(&config);
        assert!(removed.is_ok(), "清理日志失败: {:?}", removed.err());
        assert_eq!(removed.ok(), Some(1));
        assert!(!old.exists(), "过期日志应被删除");
        assert!(recent.exists(), "保留期内的日志不应删除");
        assert!(unrelated.exists(), "无关文件不应删除");
    }
}
