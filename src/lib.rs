//! # tao-avc
//!
//! 纯 Rust 实现的 H.264/AVC CAVLC 宏块解码核心, 对标 FFmpeg 的 h264 解码器宏块层.
//!
//! 本 crate 汇总工作区内的各个组件, 并提供日志与配置加载:
//! - **码流读取**: 按位读取与指数哥伦布码 (`tao-core`)
//! - **宏块解码**: CAVLC 残差, 运动矢量预测, 运动补偿与重建 (`tao-h264`)
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use tao_avc::config::Config;
//!
//! let config = Config::load_or_default("tao-avc.json").unwrap();
//! tao_avc::logging::init(&config.logging).unwrap();
//! println!("tao-avc {}, 线程数 {}", tao_avc::version(), config.decoder.threads);
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `tao-core` | 错误类型与位读写 |
//! | `tao-h264` | H.264 CAVLC 宏块解码 |

pub mod config;
pub mod logging;

/// 错误类型与位读写
pub use tao_core as core;

/// H.264 宏块解码核心
pub use tao_h264 as h264;

/// 获取版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
