//! # connector 模块说明
//!
//! ## 角色定位（Why）
//! - 以装饰链（而非按传输类型派生子类）建模建连过程：基础连接器负责
//!   OS 层 TCP 建连，装饰连接器接过内层结果再叠加一层协议（典型为
//!   TLS 握手），层数不限，构造顺序即包装顺序；
//! - 链本身无状态、可跨连接尝试复用；任一级失败即整链失败，错误携带
//!   失败阶段。
//!
//! ## 实现策略（How）
//! - 契约用 `async-trait` 声明以保持对象安全，客户端可以把整条链装箱
//!   持有而不感知具体层级；
//! - 端点以 `host:port` 文本表达，基础连接器负责名称解析，解析失败归
//!   入 [`ConnectStage::Resolve`](crate::error::ConnectStage::Resolve)。

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpStream, lookup_host};
use tokio::time::timeout;
use tracing::debug;

use crate::error::{ConnectError, ConnectStage};
use crate::transport::{BoxTransport, Connected, Transport};

/// 基础 TCP 建连的默认超时。
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// 建连链中的一级：创建基础传输，或包装内层传输。
///
/// # 教案式注释
/// - **意图 (Why)**：让"纯 TCP"与"TCP + TLS"走同一条代码路径，差异
///   只在链的组装，不在通道引擎；
/// - **契约 (What)**：
///   - `endpoint` 为 `host:port` 文本；装饰器原样转发给内层；
///   - 成功时返回 [`Connected`]，其中地址元数据由最内层（TCP）采集、
///     各装饰层透传；
///   - 失败时返回 [`ConnectError`]，`stage()` 指向出错层级；
/// - **前置条件**：必须在 Tokio 运行时内调用；
/// - **后置条件**：返回的传输已完成本级及以内所有层的握手。
#[async_trait]
pub trait Connector: Send + Sync {
    /// 本级连接器产出的传输类型。
    type Output: Transport;

    /// 运行到本级为止的建连链。
    async fn connect(&self, endpoint: &str) -> Result<Connected<Self::Output>, ConnectError>;
}

/// 链的最内层：带超时的 OS 层 TCP 建连。
///
/// # 教案式说明
/// - **意图 (Why)**：所有连接链的公共起点；解析、建连、端点采集与
///   `TCP_NODELAY` 设置集中在此，装饰层不重复处理；
/// - **契约 (What)**：`connect` 依次执行名称解析（`Resolve` 阶段）与
///   TCP 建连（`Tcp` 阶段），超时按 [`with_timeout`](Self::with_timeout)
///   配置，默认 [`DEFAULT_CONNECT_TIMEOUT`]；
/// - **风险 (Trade-offs)**：解析出多个地址时只尝试第一个，不做
///   happy-eyeballs 回退；需要多地址策略的调用方可自带连接器实现。
#[derive(Clone, Debug)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    /// 使用默认超时创建连接器。
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// 覆盖建连超时。
    pub fn with_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    async fn resolve(&self, endpoint: &str) -> Result<SocketAddr, ConnectError> {
        let mut addrs = lookup_host(endpoint)
            .await
            .map_err(|err| ConnectError::io(ConnectStage::Resolve, err))?;
        addrs.next().ok_or_else(|| {
            ConnectError::new(
                ConnectStage::Resolve,
                format!("endpoint `{endpoint}` resolved to no addresses"),
            )
        })
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Output = TcpStream;

    async fn connect(&self, endpoint: &str) -> Result<Connected<Self::Output>, ConnectError> {
        let addr = self.resolve(endpoint).await?;
        let stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ConnectError::timeout(ConnectStage::Tcp))?
            .map_err(|err| ConnectError::io(ConnectStage::Tcp, err))?;
        stream
            .set_nodelay(true)
            .map_err(|err| ConnectError::io(ConnectStage::Tcp, err))?;
        let local_addr = stream
            .local_addr()
            .map_err(|err| ConnectError::io(ConnectStage::Tcp, err))?;
        let peer_addr = stream
            .peer_addr()
            .map_err(|err| ConnectError::io(ConnectStage::Tcp, err))?;
        debug!(target: "flint::connector", %local_addr, %peer_addr, "tcp connected");
        Ok(Connected {
            stream,
            local_addr,
            peer_addr,
        })
    }
}

/// 输出做了类型擦除的连接器链，客户端用它统一持有任意层数的链。
pub type DynConnector = Box<dyn Connector<Output = BoxTransport>>;

struct BoxingConnector<C> {
    inner: C,
}

#[async_trait]
impl<C> Connector for BoxingConnector<C>
where
    C: Connector,
{
    type Output = BoxTransport;

    async fn connect(&self, endpoint: &str) -> Result<Connected<Self::Output>, ConnectError> {
        let connected = self.inner.connect(endpoint).await?;
        Ok(Connected {
            stream: Box::new(connected.stream) as BoxTransport,
            local_addr: connected.local_addr,
            peer_addr: connected.peer_addr,
        })
    }
}

/// 把任意连接器链装箱为 [`DynConnector`]。
pub fn boxed<C>(connector: C) -> DynConnector
where
    C: Connector + 'static,
{
    Box::new(BoxingConnector { inner: connector })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test(flavor = "multi_thread")]
    async fn tcp_connector_reaches_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");

        let accept = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.expect("accept");
            let mut byte = [0u8; 1];
            stream.read_exact(&mut byte).await.expect("read probe");
            byte[0]
        });

        let connector = TcpConnector::new();
        let mut connected = connector
            .connect(&addr.to_string())
            .await
            .expect("connect succeeds");
        assert_eq!(connected.peer_addr, addr);
        connected.stream.write_all(&[0x42]).await.expect("write");
        assert_eq!(accept.await.expect("join"), 0x42);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn refused_connection_reports_tcp_stage() {
        // Why: 失败必须指明层级，`Tcp` 阶段的拒绝不能伪装成解析失败。
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);

        let err = TcpConnector::new()
            .connect(&addr.to_string())
            .await
            .expect_err("connect must fail");
        assert_eq!(err.stage(), ConnectStage::Tcp);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unresolvable_endpoint_reports_resolve_stage() {
        let err = TcpConnector::new()
            .connect("name-that-does-not-resolve.invalid:4040")
            .await
            .expect_err("resolution must fail");
        assert_eq!(err.stage(), ConnectStage::Resolve);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn boxed_chain_erases_transport_type() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let accept = tokio::spawn(async move {
            let _ = listener.accept().await.expect("accept");
        });

        let chain = boxed(TcpConnector::new());
        let connected = chain
            .connect(&addr.to_string())
            .await
            .expect("boxed connect succeeds");
        assert_eq!(connected.peer_addr, addr);
        accept.await.expect("join");
    }
}
