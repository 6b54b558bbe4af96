use bytes::{Buf, BytesMut};

use flint_core::error::FramingError;
use flint_core::filter::{FilterContext, PipelineFilter};

const HEADER_LEN: usize = 4;

/// 长度前缀外层过滤器：演示分级分帧的管道组合。
///
/// # 教案式说明
/// - **意图 (Why)**：验证过滤器契约的组合性——外层从字节流中按
///   u32 大端长度头切出完整载荷，内层拿到的永远是"恰好一帧"的
///   字节，再按自己的协议产出业务包；
/// - **逻辑 (How)**：
///   1. 头部不足 4 字节时等待；头部就绪即校验载荷长度预算并记录
///      待收长度（跨调用保持，头部只解析一次）；
///   2. 载荷凑齐后整体切出，交给内层过滤器重新分帧；
///   3. 内层必须从完整载荷中恰好产出一个包，否则视为帧结构损坏；
/// - **契约 (What)**：组合后的产出类型即内层的包类型；外层对内层的
///   交付保持顺序且互不重叠，与通道对外层的交付契约一致；
/// - **风险 (Trade-offs)**：载荷被整体切出后才交给内层，意味着单帧
///   载荷会在内存中完整驻留一次；预算检查在头部阶段前置，超限帧
///   不会缓冲其载荷。
#[derive(Debug)]
pub struct LengthPrefixedPipelineFilter<F> {
    inner: F,
    pending: Option<usize>,
}

impl<F> LengthPrefixedPipelineFilter<F> {
    /// 以内层过滤器构造组合过滤器。
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            pending: None,
        }
    }
}

impl<F> PipelineFilter for LengthPrefixedPipelineFilter<F>
where
    F: PipelineFilter,
{
    type Package = F::Package;

    fn filter(
        &mut self,
        src: &mut BytesMut,
        ctx: &mut FilterContext,
    ) -> Result<Option<Self::Package>, FramingError> {
        let expected = match self.pending {
            Some(expected) => expected,
            None => {
                if src.len() < HEADER_LEN {
                    return Ok(None);
                }
                let mut header = [0u8; HEADER_LEN];
                header.copy_from_slice(&src[..HEADER_LEN]);
                let length = u32::from_be_bytes(header) as usize;
                if let Some(limit) = ctx.max_package_size()
                    && length > limit
                {
                    return Err(FramingError::PackageTooLarge { length, limit });
                }
                src.advance(HEADER_LEN);
                self.pending = Some(length);
                length
            }
        };

        if src.len() < expected {
            return Ok(None);
        }
        let mut payload = src.split_to(expected);
        self.pending = None;

        match self.inner.filter(&mut payload, ctx)? {
            Some(package) if payload.is_empty() => Ok(Some(package)),
            Some(_) => Err(FramingError::corrupt(
                "length-prefixed payload contains trailing bytes",
            )),
            None => Err(FramingError::corrupt(
                "length-prefixed payload did not form a complete inner frame",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::LinePipelineFilter;

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut wire = (payload.len() as u32).to_be_bytes().to_vec();
        wire.extend_from_slice(payload);
        wire
    }

    #[test]
    fn staged_framing_reaches_inner_filter() {
        let mut filter = LengthPrefixedPipelineFilter::new(LinePipelineFilter::new());
        let mut src = BytesMut::from(&frame(b"wrapped\r\n")[..]);
        let package = filter
            .filter(&mut src, &mut FilterContext::new(None))
            .expect("filter ok")
            .expect("package ready");
        assert_eq!(package.text(), "wrapped");
        assert!(src.is_empty());
    }

    #[test]
    fn header_split_across_reads_is_resumable() {
        let wire = frame(b"resume\r\n");
        let mut filter = LengthPrefixedPipelineFilter::new(LinePipelineFilter::new());
        let mut ctx = FilterContext::new(None);
        let mut src = BytesMut::new();

        // 头部与载荷各自分两半交付，产出必须与整帧一致。
        for (index, byte) in wire.iter().enumerate() {
            src.extend_from_slice(&[*byte]);
            let outcome = filter.filter(&mut src, &mut ctx).expect("filter ok");
            if index + 1 == wire.len() {
                assert_eq!(outcome.expect("final byte completes frame").text(), "resume");
            } else {
                assert!(outcome.is_none(), "byte {index} must not complete the frame");
            }
        }
    }

    #[test]
    fn oversized_payload_is_rejected_at_header() {
        let mut filter = LengthPrefixedPipelineFilter::new(LinePipelineFilter::new());
        let mut ctx = FilterContext::new(Some(16));
        let mut src = BytesMut::from(&frame(&[b'x'; 64])[..]);
        let err = filter
            .filter(&mut src, &mut ctx)
            .expect_err("budget exceeded");
        assert!(matches!(
            err,
            FramingError::PackageTooLarge {
                length: 64,
                limit: 16
            }
        ));
    }

    #[test]
    fn trailing_bytes_inside_payload_are_corrupt() {
        let mut filter = LengthPrefixedPipelineFilter::new(LinePipelineFilter::new());
        let mut src = BytesMut::from(&frame(b"line\r\nextra")[..]);
        let err = filter
            .filter(&mut src, &mut FilterContext::new(None))
            .expect_err("trailing bytes");
        assert!(matches!(err, FramingError::Corrupt { .. }));
    }

    #[test]
    fn incomplete_inner_frame_is_corrupt() {
        let mut filter = LengthPrefixedPipelineFilter::new(LinePipelineFilter::new());
        let mut src = BytesMut::from(&frame(b"no terminator")[..]);
        let err = filter
            .filter(&mut src, &mut FilterContext::new(None))
            .expect_err("inner frame incomplete");
        assert!(matches!(err, FramingError::Corrupt { .. }));
    }
}
