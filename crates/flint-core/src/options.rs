//! 通道构造期配置。配置一经传入 [`Channel`](crate::channel::Channel)
//! 即不可变，运行期行为只读取快照。

use tracing::Span;

/// 接收缓冲单次扩容的默认字节数。
pub const DEFAULT_RECEIVE_BUFFER_SIZE: usize = 4096;
/// 发送路径缓冲写入器的默认容量。
pub const DEFAULT_SEND_BUFFER_SIZE: usize = 4096;
/// 单个包的默认长度上限。
pub const DEFAULT_MAX_PACKAGE_SIZE: usize = 1024 * 1024;

/// 通道构造期配置集合。
///
/// # 教案式说明
/// - **意图 (Why)**：把缓冲尺寸、包长预算与日志落点集中为一个值对象，
///   避免通道构造函数的参数膨胀；同一份配置可以复用到多条连接；
/// - **契约 (What)**：
///   - `receive_buffer_size`：接收循环每次向传输索取的字节数上界；
///   - `send_buffer_size`：发送半部缓冲写入器的容量，每次 `send`
///     之后整体冲刷，该值只约束内存占用而非排队上限；
///   - `max_package_size`：分帧预算，`None` 表示不设限；
///   - `span`：通道事件挂载的 tracing span，作为日志落点注入；
/// - **前置条件**：尺寸参数必须大于零，Builder 方法不做运行时校验，
///   传零值属于调用方契约违例；
/// - **后置条件**：通道持有配置的克隆，构造后修改原值不影响通道。
#[derive(Clone, Debug)]
pub struct ChannelOptions {
    receive_buffer_size: usize,
    send_buffer_size: usize,
    max_package_size: Option<usize>,
    span: Span,
}

impl ChannelOptions {
    /// 创建携带默认值的配置。
    pub fn new() -> Self {
        Self {
            receive_buffer_size: DEFAULT_RECEIVE_BUFFER_SIZE,
            send_buffer_size: DEFAULT_SEND_BUFFER_SIZE,
            max_package_size: Some(DEFAULT_MAX_PACKAGE_SIZE),
            span: Span::none(),
        }
    }

    /// 覆盖接收缓冲扩容尺寸。
    pub fn with_receive_buffer_size(mut self, size: usize) -> Self {
        self.receive_buffer_size = size;
        self
    }

    /// 覆盖发送缓冲容量。
    pub fn with_send_buffer_size(mut self, size: usize) -> Self {
        self.send_buffer_size = size;
        self
    }

    /// 覆盖包长上限；`None` 表示不设限。
    pub fn with_max_package_size(mut self, limit: Option<usize>) -> Self {
        self.max_package_size = limit;
        self
    }

    /// 指定通道事件挂载的 tracing span。
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// 接收缓冲扩容尺寸。
    pub fn receive_buffer_size(&self) -> usize {
        self.receive_buffer_size
    }

    /// 发送缓冲容量。
    pub fn send_buffer_size(&self) -> usize {
        self.send_buffer_size
    }

    /// 包长上限。
    pub fn max_package_size(&self) -> Option<usize> {
        self.max_package_size
    }

    /// 通道事件挂载的 span。
    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let options = ChannelOptions::new()
            .with_receive_buffer_size(128)
            .with_send_buffer_size(256)
            .with_max_package_size(Some(512));
        assert_eq!(options.receive_buffer_size(), 128);
        assert_eq!(options.send_buffer_size(), 256);
        assert_eq!(options.max_package_size(), Some(512));
    }

    #[test]
    fn default_budget_is_bounded() {
        // Why: 未显式配置时也必须存在包长预算，防止恶意超长帧耗尽内存。
        assert_eq!(
            ChannelOptions::default().max_package_size(),
            Some(DEFAULT_MAX_PACKAGE_SIZE)
        );
    }
}
