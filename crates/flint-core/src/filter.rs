//! # filter 模块说明
//!
//! ## 角色定位（Why）
//! - 定义把字节流切分为离散包的增量解码契约：通道每收到一段字节就
//!   调用过滤器一次，过滤器要么产出一个完整包，要么声明"还不够"；
//! - 分帧状态（半行缓冲、已扫描位置等）全部留在过滤器实例内部，一个
//!   实例只服务一条通道，绝不跨通道共享。
//!
//! ## 契约要点（What）
//! - 过滤器对输入的消费严格顺序、无重叠：通道保证每个字节只经过
//!   `filter` 一次，且按到达顺序交付；
//! - 可恢复性：同一帧被任意切分为多次调用时，产出必须与一次性缓冲
//!   整帧完全一致（分割不变性）；
//! - 预算：[`FilterContext`] 携带包长上限，一旦能证明当前帧必然超限，
//!   过滤器应立即返回 [`FramingError::PackageTooLarge`]，不必等待
//!   终结符到达。

use bytes::BytesMut;

use crate::error::FramingError;

/// 分帧调用的上下文，携带通道侧下发的预算约束。
///
/// 仿照编解码上下文的惯例独立成类型，后续扩展（如分帧统计）不需要
/// 改动 [`PipelineFilter`] 的签名。
#[derive(Debug)]
pub struct FilterContext {
    max_package_size: Option<usize>,
}

impl FilterContext {
    /// 构造携带包长预算的上下文；`None` 表示不设限。
    pub fn new(max_package_size: Option<usize>) -> Self {
        Self { max_package_size }
    }

    /// 当前生效的包长上限。
    pub fn max_package_size(&self) -> Option<usize> {
        self.max_package_size
    }
}

/// 把字节流增量切分为离散包的管道过滤器契约。
///
/// # 教案式说明
/// - **意图 (Why)**：通道引擎与具体协议解耦的关键接缝。换一个过滤器
///   实现，同一条通道就承载另一种行/帧协议；
/// - **契约 (What)**：
///   - 输入 `src` 是通道持有的接收缓冲，过滤器从头部消费字节
///     （`split_to`/`advance`），未消费的部分留待下次调用；
///   - 返回 `Ok(Some(package))` 表示产出一个完整包，缓冲中可能仍有
///     后续帧的字节；返回 `Ok(None)` 表示需要更多字节；
///   - 返回 `Err` 对通道是致命的：通道关闭，不产出部分包；
/// - **组合 (How)**：过滤器可以包装另一个过滤器实现分级分帧——外层
///   负责从字节流中切出完整载荷，再把载荷交给内层重新分帧。组合时
///   外层必须保证交给内层的载荷完整且顺序不变；
/// - **风险 (Trade-offs)**：契约允许过滤器在 `Ok(None)` 时不消费任何
///   字节，通道据此用缓冲长度做超限兜底；过滤器自身提前判定超限可以
///   给出更精确的帧长信息。
pub trait PipelineFilter: Send + 'static {
    /// 过滤器产出的包类型。
    type Package: Send + 'static;

    /// 尝试从缓冲头部切出一个完整包。
    fn filter(
        &mut self,
        src: &mut BytesMut,
        ctx: &mut FilterContext,
    ) -> Result<Option<Self::Package>, FramingError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 最小过滤器：固定两字节一帧，用于验证契约本身。
    struct PairFilter;

    impl PipelineFilter for PairFilter {
        type Package = [u8; 2];

        fn filter(
            &mut self,
            src: &mut BytesMut,
            _ctx: &mut FilterContext,
        ) -> Result<Option<Self::Package>, FramingError> {
            if src.len() < 2 {
                return Ok(None);
            }
            let frame = src.split_to(2);
            Ok(Some([frame[0], frame[1]]))
        }
    }

    #[test]
    fn incomplete_input_leaves_buffer_untouched() {
        let mut filter = PairFilter;
        let mut ctx = FilterContext::new(None);
        let mut buf = BytesMut::from(&b"a"[..]);
        assert!(
            filter
                .filter(&mut buf, &mut ctx)
                .expect("filter ok")
                .is_none()
        );
        assert_eq!(&buf[..], b"a");
    }

    #[test]
    fn complete_frame_is_consumed_from_front() {
        let mut filter = PairFilter;
        let mut ctx = FilterContext::new(None);
        let mut buf = BytesMut::from(&b"abcd"[..]);
        let first = filter
            .filter(&mut buf, &mut ctx)
            .expect("filter ok")
            .expect("frame ready");
        assert_eq!(first, *b"ab");
        assert_eq!(&buf[..], b"cd");
    }
}
