use bytes::BytesMut;

use flint_core::error::FramingError;
use flint_core::filter::{FilterContext, PipelineFilter};

const LF: u8 = b'\n';
const CR: u8 = b'\r';

/// 一行文本解析出的协议包：终结符已剥除的不可变文本。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextPackage {
    text: String,
}

impl TextPackage {
    fn new(text: String) -> Self {
        Self { text }
    }

    /// 行文本内容（不含 `\r\n`）。
    pub fn text(&self) -> &str {
        &self.text
    }

    /// 消费包取出文本所有权。
    pub fn into_text(self) -> String {
        self.text
    }
}

impl core::fmt::Display for TextPackage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.text)
    }
}

/// 基于行终结符的增量分帧过滤器。
///
/// # 教案式说明
/// - **意图 (Why)**：参考协议的分帧实现，同时作为过滤器契约的教学
///   样例：可恢复、零重叠、预算前置；
/// - **逻辑 (How)**：
///   1. 从上次扫描位置继续查找 `\n`，一帧跨越多次底层读取时不重复
///      扫描已看过的前缀；
///   2. 找到终结符即切出整帧，剥除 `\n` 与紧邻的 `\r` 后校验 UTF-8；
///   3. 未找到终结符时，若已缓冲长度超出预算则立即拒绝：超长行
///      不可能再变合法；
/// - **契约 (What)**：
///   - 产出 [`TextPackage`]；同一帧任意切分下产出一致；
///   - 非法 UTF-8 报 [`FramingError::Corrupt`]，超长报
///     [`FramingError::PackageTooLarge`]，二者对通道均致命；
/// - **前置条件**：实例独占于一条通道，跨通道复用会破坏扫描位置；
/// - **风险 (Trade-offs)**：裸 `\n`（无 `\r`）按行终结符宽容接受，
///   与参考协议的写出端（恒为 `\r\n`）保持不对称的健壮性。
#[derive(Debug, Default)]
pub struct LinePipelineFilter {
    /// 已确认不含终结符的前缀长度，避免重复扫描。
    searched: usize,
}

impl LinePipelineFilter {
    /// 创建新的行分帧过滤器。
    pub fn new() -> Self {
        Self::default()
    }
}

impl PipelineFilter for LinePipelineFilter {
    type Package = TextPackage;

    fn filter(
        &mut self,
        src: &mut BytesMut,
        ctx: &mut FilterContext,
    ) -> Result<Option<Self::Package>, FramingError> {
        let Some(offset) = src[self.searched..].iter().position(|byte| *byte == LF) else {
            self.searched = src.len();
            // 末尾的 `\r` 可能是尚未到齐的终结符前半，不计入行长。
            let pending = match src.last() {
                Some(&CR) => src.len() - 1,
                _ => src.len(),
            };
            if let Some(limit) = ctx.max_package_size()
                && pending > limit
            {
                return Err(FramingError::PackageTooLarge {
                    length: pending,
                    limit,
                });
            }
            return Ok(None);
        };

        let terminator = self.searched + offset;
        let payload_len = if terminator > 0 && src[terminator - 1] == CR {
            terminator - 1
        } else {
            terminator
        };
        if let Some(limit) = ctx.max_package_size()
            && payload_len > limit
        {
            return Err(FramingError::PackageTooLarge {
                length: payload_len,
                limit,
            });
        }

        let frame = src.split_to(terminator + 1);
        self.searched = 0;
        let payload = &frame[..payload_len];
        match core::str::from_utf8(payload) {
            Ok(text) => Ok(Some(TextPackage::new(text.to_owned()))),
            Err(_) => Err(FramingError::corrupt("line payload is not valid UTF-8")),
        }
    }
}
