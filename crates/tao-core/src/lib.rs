//! # tao-core
//!
//! tao-avc 的底层基础设施: 统一错误类型与按位读写码流的工具.
//!
//! 上层的宏块解码核心只依赖这里的 `BitReader` 读取熵编码语法元素,
//! `BitWriter` 主要用于构造测试码流.

pub mod bitreader;
pub mod bitwriter;
pub mod error;

// 重导出常用类型
pub use bitreader::BitReader;
pub use bitwriter::BitWriter;
pub use error::{TaoError, TaoResult};
