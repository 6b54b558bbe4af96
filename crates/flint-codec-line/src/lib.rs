#![warn(missing_docs)]
#![deny(unsafe_code)]

//! `flint-codec-line` 提供引擎的参考协议：以 `\r\n` 终结的 UTF-8
//! 文本行，以及一个演示分级分帧组合的长度前缀过滤器。
//!
//! # 设计背景（Why）
//! - 行协议语义直观、便于在回显场景下端到端验证引擎契约（线序、
//!   分割不变性、超长拒绝），是所有传输/通道测试的公共载体；
//! - 组合过滤器展示"外层切载荷、内层再分帧"的管道组合方式，证明
//!   [`PipelineFilter`] 契约对分级协议同样成立。
//!
//! # 契约说明（What）
//! - [`LinePipelineFilter`]：帧终结于 `\n`，紧邻的 `\r` 一并剥除；
//!   超出预算的行在终结符到达前即被拒绝；
//! - [`LengthPrefixedPipelineFilter`]：u32 大端长度头 + 载荷，载荷
//!   完整后一次性交给内层过滤器重新分帧。

mod length;
mod line;

pub use length::LengthPrefixedPipelineFilter;
pub use line::{LinePipelineFilter, TextPackage};
