//! 传输对象与所有权移交的值类型。
//!
//! 传输是对一条双工字节流的**独占**句柄：挂接期间由通道独占，
//! [`detach`](crate::channel::Channel::detach) 之后由调用方独占，
//! 任何时刻都不存在两个所有者。

use std::net::SocketAddr;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};

/// 通道可以承载的传输抽象：任意双工异步字节流。
///
/// 以空 trait + 全覆盖实现的方式声明，纯 TCP 流与 TLS 包装流自动
/// 满足，调用方也可以注入内存双工流做测试。
pub trait Transport: AsyncRead + AsyncWrite + Send + Sync + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Sync + Unpin + 'static {}

/// 类型擦除后的传输对象，供客户端在纯 TCP 与 TLS 之间统一持有。
pub type BoxTransport = Box<dyn Transport>;

/// 连接器链运行成功的结果：传输本体加端点元数据。
///
/// # 教案级说明
/// - **意图 (Why)**：装饰链逐级包装传输时，地址元数据必须随传输一起
///   向外层传递，否则 TLS 包装后将丢失原始 TCP 连接的端点信息；
/// - **契约 (What)**：`stream` 的所有权完全归持有者；两个地址字段在
///   链各级之间原样透传；
/// - **后置条件**：调用 [`into_channel`](Self::into_channel) 之后传输
///   归通道独占。
#[derive(Debug)]
pub struct Connected<T: Transport> {
    /// 建立完成（含所有装饰层握手）的传输。
    pub stream: T,
    /// 本端地址。
    pub local_addr: SocketAddr,
    /// 对端地址。
    pub peer_addr: SocketAddr,
}

impl<T: Transport> Connected<T> {
    /// 把建连结果装配为通道，传输所有权随之移交。
    pub fn into_channel<F>(
        self,
        filter: F,
        options: crate::options::ChannelOptions,
    ) -> crate::channel::Channel<T, F>
    where
        F: crate::filter::PipelineFilter,
    {
        crate::channel::Channel::new(
            self.stream,
            self.local_addr,
            self.peer_addr,
            filter,
            options,
        )
    }
}

/// `detach` 移交给调用方的传输及其随行数据。
///
/// # 教案式说明
/// - **意图 (Why)**：拆离不仅交还流本体，还必须交还"已从传输读出、
///   但过滤器尚未消费"的字节，否则这些字节将凭空丢失；
/// - **契约 (What)**：
///   - `stream`：完整可用的传输，读写均不再经过通道；
///   - `residue`：拆离时刻接收缓冲中的剩余字节，可能为空；这些字节
///     在时间序上位于调用方后续将从 `stream` 读到的一切之前；
///   - 地址字段与建连时一致；
/// - **前置条件**：只能经由 [`Channel::detach`](crate::channel::Channel::detach)
///   获得；拆离后原通道对传输的一切访问都被状态机拒绝。
pub struct DetachedTransport<T: Transport> {
    /// 交还调用方的传输。
    pub stream: T,
    /// 已读出但未被过滤器消费的字节。
    pub residue: Bytes,
    /// 本端地址。
    pub local_addr: SocketAddr,
    /// 对端地址。
    pub peer_addr: SocketAddr,
}

impl<T: Transport> core::fmt::Debug for DetachedTransport<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DetachedTransport")
            .field("stream", &format_args!("<transport>"))
            .field("residue", &self.residue)
            .field("local_addr", &self.local_addr)
            .field("peer_addr", &self.peer_addr)
            .finish()
    }
}
