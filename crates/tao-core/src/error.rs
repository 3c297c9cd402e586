//! 统一错误类型定义.
//!
//! 所有 tao crate 共用的错误类型, 解码核心的错误最终都可以转换为 `TaoError`.

use thiserror::Error;

/// tao 统一错误类型
#[derive(Debug, Error)]
pub enum TaoError {
    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 不支持的码流特性
    #[error("不支持的操作: {0}")]
    Unsupported(String),

    /// 编解码器错误
    #[error("编解码器错误: {0}")]
    Codec(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 已到达流末尾
    #[error("已到达流末尾")]
    Eof,

    /// 无效数据 (损坏的码流等)
    #[error("无效数据: {0}")]
    InvalidData(String),
}

/// tao 统一 Result 类型
pub type TaoResult<T> = Result<T, TaoError>;
