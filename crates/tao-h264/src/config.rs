//! 解码器选项.

use serde::{Deserialize, Serialize};

/// 宏块解码核心的运行选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderOptions {
    /// 并行解码 slice 的线程数, 0 表示使用 rayon 默认值, 1 表示顺序解码
    pub threads: usize,
    /// 严格模式: 任一 slice 出错即返回错误, 否则标记图像损坏后继续
    pub strict: bool,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            threads: 1,
            strict: false,
        }
    }
}

impl DecoderOptions {
    /// 是否需要并行解码
    pub fn is_parallel(&self) -> bool {
        self.threads != 1
    }
}
