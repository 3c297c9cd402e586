//! 像素级运算: 反变换, 帧内预测, 插值, 加权.

pub mod idct;
pub mod intra_pred;
pub mod qpel;
pub mod weight;
