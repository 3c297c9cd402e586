//! # tao-h264
//!
//! H.264/AVC CAVLC 宏块解码核心, 对标 FFmpeg libavcodec 中的 h264_cavlc 与 h264_mb.
//!
//! 输入为已去除防竞争字节的 slice 数据与上层解析好的参数集/slice 头,
//! 输出为重建到图像平面中的样本以及逐宏块的类型, 量化参数, CBP,
//! 非零系数计数与运动数据 (供去块滤波和后续图像使用).
//!
//! ## 支持范围
//!
//! - I/P/B slice, 4x4 与 8x8 变换, Intra4x4/8x8/16x16/PCM
//! - 4:0:0, 4:2:0, 4:2:2, 位深 8..=14
//! - 空间/时域直接预测, 显式/隐式加权预测
//! - 同一图像的多个 slice 并行解码, 参考图像按行进度同步
//!
//! CABAC, 去块滤波, 场编码与 NAL/参数集解析不在本 crate 范围内.
//!
//! ## 使用示例
//!
//! ```rust
//! use std::sync::Arc;
//! use tao_core::BitReader;
//! use tao_h264::{PicParams, Picture, SeqParams, SharedPicture, SliceDecoder, SliceParams, SliceType};
//!
//! let sps = SeqParams::new(1, 1);
//! let pps = PicParams::default();
//! let picture = SharedPicture::new(Picture::<u8>::new(&sps), 0);
//! let slice = SliceParams::new(SliceType::I, 0, 0, 26);
//! let mut decoder =
//!     SliceDecoder::new(&sps, &pps, slice, Arc::clone(&picture), [Vec::new(), Vec::new()]).unwrap();
//!
//! // I_16x16 DC 预测, 色度 DC, qp 不变, 亮度 DC 无系数, rbsp 停止位
//! let data = [0b0101_1110];
//! let stats = decoder.decode(&mut BitReader::new(&data)).unwrap();
//! assert_eq!(stats.decoded_mbs, 1);
//! assert_eq!(picture.read().planes[0].at(0, 0), 128);
//! ```

pub(crate) mod bitstream;
pub(crate) mod cache;
pub mod config;
pub(crate) mod dequant;
pub(crate) mod direct;
pub mod dsp;
pub mod error;
pub(crate) mod macroblock;
pub mod mb_type;
pub(crate) mod mc;
pub(crate) mod mvpred;
pub mod params;
pub mod picture;
pub(crate) mod recon;
pub(crate) mod residual;
pub mod sample;
pub mod slice;
pub mod tables;
pub mod vlc;

// 重导出常用类型
pub use config::DecoderOptions;
pub use error::{H264Error, H264Result, MbDecodeError};
pub use mb_type::{MbFlags, MbKind};
pub use params::{
    ChromaFormat, ExplicitWeights, PicParams, SeqParams, SliceParams, SliceType, WeightEntry,
    WeightMode,
};
pub use picture::{FrameProgress, Picture, Plane, RefPicture, SharedPicture};
pub use sample::Sample;
pub use slice::{PictureStats, SliceData, SliceDecoder, SliceStats, decode_picture};
