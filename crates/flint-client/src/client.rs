use std::net::SocketAddr;

use thiserror::Error;
use tracing::debug;

use flint_core::channel::{Channel, ChannelState};
use flint_core::connector::{DynConnector, TcpConnector, boxed};
use flint_core::error::{ChannelError, ConnectError};
use flint_core::filter::PipelineFilter;
use flint_core::options::ChannelOptions;
use flint_core::transport::{BoxTransport, DetachedTransport};
use flint_transport_tls::{TlsClientOptions, TlsConnector, TlsError};

/// 客户端门面的错误域。
#[derive(Debug, Error)]
pub enum ClientError {
    /// 尚未建立连接即调用收发。
    #[error("client is not connected")]
    NotConnected,
    /// 已有活跃或已终结的连接，门面不支持原地重连。
    #[error("client already holds a connection")]
    AlreadyConnected,
    /// 连接器链失败。
    #[error(transparent)]
    Connect(#[from] ConnectError),
    /// 通道运行期失败。
    #[error(transparent)]
    Channel(#[from] ChannelError),
    /// TLS 构造期配置失败。
    #[error(transparent)]
    Tls(#[from] TlsError),
}

/// 单条逻辑连接的客户端门面。
///
/// # 教案式说明
/// - **意图 (Why)**：把"链建连 → 装通道 → 逐包收发"的样板流程折叠
///   为四个动词：`connect`、`send`、`receive`、`close`；拆离场景再
///   加一个 `detach`；
/// - **契约 (What)**：
///   - 连接器链在构造期注入：[`new`](Self::new) 使用纯 TCP 基础级，
///     [`secure`](Self::secure) 在其前插入 TLS 装饰级，
///     [`with_connector`](Self::with_connector) 接受任意自定义链；
///   - `receive` 是通道包序列的逐包视图：`Ok(Some(_))` 一个包、
///     `Ok(None)` 对端优雅关闭、`Err(_)` 带错终止或状态机拒绝；
///   - 过滤器实例随门面构造注入，连接建立后归通道独占；
/// - **前置条件**：所有异步方法都要求在 Tokio 运行时内调用；
/// - **风险 (Trade-offs)**：门面绑定一条逻辑连接，关闭或拆离后需要
///   重建门面才能再连接。
pub struct EasyClient<F: PipelineFilter> {
    connector: DynConnector,
    options: ChannelOptions,
    filter: Option<F>,
    channel: Option<Channel<BoxTransport, F>>,
}

impl<F: PipelineFilter> EasyClient<F> {
    /// 以纯 TCP 连接器链与默认配置创建客户端。
    pub fn new(filter: F) -> Self {
        Self::with_connector(filter, boxed(TcpConnector::new()), ChannelOptions::default())
    }

    /// 以纯 TCP 连接器链与指定通道配置创建客户端。
    pub fn with_options(filter: F, options: ChannelOptions) -> Self {
        Self::with_connector(filter, boxed(TcpConnector::new()), options)
    }

    /// 以任意连接器链创建客户端。这是装饰点本身：想要几级就叠几级。
    pub fn with_connector(filter: F, connector: DynConnector, options: ChannelOptions) -> Self {
        Self {
            connector,
            options,
            filter: Some(filter),
            channel: None,
        }
    }

    /// 创建在 TCP 基础级之前插入 TLS 装饰级的安全客户端。
    ///
    /// 与明文客户端共享全部后续路径，差异只在连接器链的组装。
    pub fn secure(filter: F, tls: TlsClientOptions) -> Result<Self, ClientError> {
        Self::secure_with_options(filter, tls, ChannelOptions::default())
    }

    /// 安全客户端的完整构造入口，允许同时指定通道配置。
    pub fn secure_with_options(
        filter: F,
        tls: TlsClientOptions,
        options: ChannelOptions,
    ) -> Result<Self, ClientError> {
        let chain = TlsConnector::new(TcpConnector::new(), tls)?;
        Ok(Self::with_connector(filter, boxed(chain), options))
    }

    /// 运行连接器链并装配通道。
    pub async fn connect(&mut self, endpoint: &str) -> Result<(), ClientError> {
        if self.channel.is_some() {
            return Err(ClientError::AlreadyConnected);
        }
        let filter = self.filter.take().ok_or(ClientError::AlreadyConnected)?;
        let connected = match self.connector.connect(endpoint).await {
            Ok(connected) => connected,
            Err(err) => {
                // 连接失败后保留过滤器，允许对同一门面重试 connect。
                self.filter = Some(filter);
                return Err(ClientError::Connect(err));
            }
        };
        debug!(
            target: "flint::client",
            endpoint,
            peer_addr = %connected.peer_addr,
            "connected",
        );
        self.channel = Some(connected.into_channel(filter, self.options.clone()));
        Ok(())
    }

    /// 向连接写出一段字节。
    pub async fn send(&self, data: &[u8]) -> Result<(), ClientError> {
        let channel = self.channel.as_ref().ok_or(ClientError::NotConnected)?;
        channel.send(data).await.map_err(ClientError::from)
    }

    /// 接收下一个包；挂起直到包到达或通道终结。
    pub async fn receive(&mut self) -> Result<Option<F::Package>, ClientError> {
        let channel = self.channel.as_mut().ok_or(ClientError::NotConnected)?;
        match channel.packages().next().await {
            Some(Ok(package)) => Ok(Some(package)),
            Some(Err(err)) => Err(ClientError::Channel(err)),
            None => Ok(None),
        }
    }

    /// 关闭连接。未连接或重复关闭均无副作用。
    pub async fn close(&mut self) {
        if let Some(channel) = &self.channel {
            channel.close().await;
        }
    }

    /// 把活的传输交还调用方；此后本门面上的收发一律被拒绝。
    pub async fn detach(&mut self) -> Result<DetachedTransport<BoxTransport>, ClientError> {
        let channel = self.channel.as_mut().ok_or(ClientError::NotConnected)?;
        channel.detach().await.map_err(ClientError::from)
    }

    /// 当前通道状态；尚未连接时为 `None`。
    pub fn state(&self) -> Option<ChannelState> {
        self.channel.as_ref().map(Channel::state)
    }

    /// 已建立连接的对端地址。
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.channel.as_ref().map(Channel::peer_addr)
    }

    /// 已建立连接的本端地址。
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.channel.as_ref().map(Channel::local_addr)
    }
}
