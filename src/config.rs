//! 运行配置: 日志与解码器选项, 从 JSON 文件加载.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tao_h264::DecoderOptions;

use crate::logging::LoggingConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub decoder: DecoderOptions,
}

impl Config {
    /// 解析 JSON 配置, 缺省字段取默认值
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("解析配置失败")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败, path={}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("配置文件无效, path={}", path.display()))
    }

    /// 文件存在时加载, 否则使用默认配置
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = Config::from_json(r#"{"decoder": {"threads": 4, "strict": true}}"#);
        let config = match config {
            Ok(config) => config,
            Err(err) => panic!("解析配置失败: {err:#}"),
        };
        assert_eq!(config.decoder.threads, 4);
        assert!(config.decoder.strict);
        assert_eq!(config.logging, LoggingConfig::default(), "未给出的日志配置应取默认值");
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = match TempDir::new() {
            Ok(temp_dir) => temp_dir,
            Err(err) => panic!("创建临时目录失败: {}", err),
        };
        let path = temp_dir.path().join("tao-avc.json");
        let text = r#"{"logging": {"level": "debug", "retention_days": 3}}"#;
        assert!(std::fs::write(&path, text).is_ok());

        let config = match Config::load(&path) {
            Ok(config) => config,
            Err(err) => panic!("加载配置失败: {err:#}"),
        };
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.retention_days, 3);
        assert_eq!(config.logging.file_prefix, "tao-avc");
        assert_eq!(config.decoder, DecoderOptions::default());
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let temp_dir = match TempDir::new() {
            Ok(temp_dir) => temp_dir,
            Err(err) => panic!("创建临时目录失败: {}", err),
        };
        let config = Config::load_or_default(temp_dir.path().join("absent.json"));
        assert_eq!(config.ok(), Some(Config::default()));
        assert!(Config::load(temp_dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(Config::from_json("{ threads").is_err());
    }
}
