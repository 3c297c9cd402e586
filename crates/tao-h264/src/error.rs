//! H.264 宏块解码错误类型.

use tao_core::TaoError;
use thiserror::Error;

/// 宏块解码过程中可能出现的错误
///
/// 任何一种错误都会终止当前 slice 的解码, 由上层决定如何恢复.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum H264Error {
    /// 语法元素越界 (total_coeff, mb_type, cbp, 子宏块类型, 参考索引等)
    #[error("H264: 语法元素损坏: {what}={value}")]
    CorruptedSyntax { what: &'static str, value: i64 },

    /// level 前缀超出支持范围
    #[error("H264: 无效的 level 前缀: {0}")]
    InvalidLevelPrefix(u32),

    /// run_before 消耗的零系数多于剩余值
    #[error("H264: 剩余零系数为负: {0}")]
    NegativeZerosLeft(i32),

    /// 码流在宏块中途耗尽
    #[error("H264: 码流比特不足: 需要 {needed}, 剩余 {available}")]
    InsufficientBits { needed: usize, available: usize },

    /// 量化参数在一次回绕后仍越界
    #[error("H264: 量化参数越界: {0}")]
    QuantizerOutOfRange(i32),

    /// 当前实现不支持的码流特性
    #[error("H264: 不支持的特性: {0}")]
    Unsupported(&'static str),
}

impl H264Error {
    /// 构造语法损坏错误
    pub(crate) fn corrupted(what: &'static str, value: impl Into<i64>) -> Self {
        Self::CorruptedSyntax {
            what,
            value: value.into(),
        }
    }
}

/// H.264 解码结果类型
pub type H264Result<T> = Result<T, H264Error>;

/// 带宏块坐标的解码错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("H264: 宏块 ({mb_x}, {mb_y}) 解码失败: {source}")]
pub struct MbDecodeError {
    pub mb_x: usize,
    pub mb_y: usize,
    #[source]
    pub source: H264Error,
}

impl From<H264Error> for TaoError {
    fn from(e: H264Error) -> Self {
        match e {
            H264Error::Unsupported(what) => TaoError::Unsupported(what.to_string()),
            other => TaoError::InvalidData(other.to_string()),
        }
    }
}

impl From<MbDecodeError> for TaoError {
    fn from(e: MbDecodeError) -> Self {
        match e.source {
            H264Error::Unsupported(what) => TaoError::Unsupported(what.to_string()),
            _ => TaoError::Codec(e.to_string()),
        }
    }
}
