use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

use flint_core::channel::{Channel, ChannelSender};
use flint_core::error::ChannelError;
use flint_core::filter::PipelineFilter;
use flint_core::options::ChannelOptions;
use flint_core::transport::BoxTransport;
use flint_transport_tls::TlsAcceptor;

/// 包处理器的对象层形态。
type BoxPackageHandler<P> =
    Arc<dyn Fn(ChannelHandle, P) -> BoxFuture<'static, Result<(), ChannelError>> + Send + Sync>;

/// 交给包处理器的通道句柄：在接收循环运行期间向同一连接回写。
///
/// 句柄可克隆、可跨任务移动；`close` 会让该连接的接收循环尽快退出。
#[derive(Clone)]
pub struct ChannelHandle {
    sender: ChannelSender<BoxTransport>,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
}

impl ChannelHandle {
    /// 向连接写出一段字节，与其他发送方按获锁顺序串行。
    pub async fn send(&self, data: &[u8]) -> Result<(), ChannelError> {
        self.sender.send(data).await
    }

    /// 关闭该连接。幂等。
    pub async fn close(&self) {
        self.sender.close().await;
    }

    /// 本端地址。
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 对端地址。
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

/// 调度器错误域。
#[derive(Debug, Error)]
pub enum ServerError {
    /// 监听地址绑定失败。
    #[error("failed to bind listener on {addr}")]
    Bind {
        /// 请求绑定的地址文本。
        addr: String,
        /// 底层 IO 错误。
        #[source]
        source: io::Error,
    },
    /// 未注册包处理器即启动。
    #[error("no package handler registered")]
    MissingHandler,
}

/// 服务端调度器的建造器。
///
/// # 教案级注释
/// - **意图 (Why)**：把"每条连接一个全新过滤器实例"固化为构造约束：
///   建造器持有过滤器工厂而非过滤器实例，装配期逐连接调用；
/// - **契约 (What)**：
///   - [`on_package`](Self::on_package) 必须在 [`bind`](Self::bind)
///     之前调用，否则绑定报 [`ServerError::MissingHandler`]；
///   - [`with_tls`](Self::with_tls) 配置后，接受的传输先完成服务端
///     握手再装配通道；
///   - [`with_channel_options`](Self::with_channel_options) 对所有
///     连接生效；
/// - **后置条件**：`bind` 成功即开始接受连接。
pub struct ServerBuilder<F: PipelineFilter> {
    filter_factory: Arc<dyn Fn() -> F + Send + Sync>,
    handler: Option<BoxPackageHandler<F::Package>>,
    options: ChannelOptions,
    tls: Option<TlsAcceptor>,
}

impl<F: PipelineFilter + Sync> ServerBuilder<F> {
    /// 以过滤器工厂创建建造器。
    pub fn new(filter_factory: impl Fn() -> F + Send + Sync + 'static) -> Self {
        Self {
            filter_factory: Arc::new(filter_factory),
            handler: None,
            options: ChannelOptions::default(),
            tls: None,
        }
    }

    /// 注册包处理器：每个产出的包调用一次，携带可回写的通道句柄。
    pub fn on_package<H, Fut>(mut self, handler: H) -> Self
    where
        H: Fn(ChannelHandle, F::Package) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ChannelError>> + Send + 'static,
    {
        self.handler = Some(Arc::new(
            move |handle, package| -> BoxFuture<'static, Result<(), ChannelError>> {
                Box::pin(handler(handle, package))
            },
        ));
        self
    }

    /// 覆盖所有连接共用的通道配置。
    pub fn with_channel_options(mut self, options: ChannelOptions) -> Self {
        self.options = options;
        self
    }

    /// 为接受的连接启用服务端 TLS 握手。
    pub fn with_tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls = Some(acceptor);
        self
    }

    /// 绑定监听地址并开始接受连接。
    pub async fn bind(self, addr: &str) -> Result<Server, ServerError> {
        let handler = self.handler.ok_or(ServerError::MissingHandler)?;
        let listener = TcpListener::bind(addr).await.map_err(|err| ServerError::Bind {
            addr: addr.to_owned(),
            source: err,
        })?;
        let local_addr = listener.local_addr().map_err(|err| ServerError::Bind {
            addr: addr.to_owned(),
            source: err,
        })?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let accept_task = tokio::spawn(accept_loop(
            listener,
            self.filter_factory,
            handler,
            self.options,
            self.tls,
            shutdown_rx,
        ));
        debug!(target: "flint::server", %local_addr, "dispatcher listening");
        Ok(Server {
            local_addr,
            shutdown_tx,
            accept_task: Some(accept_task),
        })
    }
}

/// 正在接受连接的服务端调度器。
pub struct Server {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    accept_task: Option<JoinHandle<()>>,
}

impl Server {
    /// 监听器实际绑定的地址。
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 停止接受新连接并促使所有在线通道尽快退出。幂等。
    pub async fn stop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.accept_task.take() {
            let _ = task.await;
        }
        debug!(target: "flint::server", local_addr = %self.local_addr, "dispatcher stopped");
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        // 未经 `stop` 即丢弃时不能把监听任务留在后台。
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = &self.accept_task {
            task.abort();
        }
    }
}

async fn accept_loop<F: PipelineFilter + Sync>(
    listener: TcpListener,
    filter_factory: Arc<dyn Fn() -> F + Send + Sync>,
    handler: BoxPackageHandler<F::Package>,
    options: ChannelOptions,
    tls: Option<TlsAcceptor>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut connections: JoinSet<()> = JoinSet::new();
    loop {
        let accepted = tokio::select! {
            biased;
            _ = shutdown_rx.wait_for(|stop| *stop) => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, peer_addr)) => {
                connections.spawn(serve_connection(
                    stream,
                    peer_addr,
                    Arc::clone(&filter_factory),
                    Arc::clone(&handler),
                    options.clone(),
                    tls.clone(),
                    shutdown_rx.clone(),
                ));
            }
            Err(err) => {
                warn!(target: "flint::server", error = %err, "accept failed");
            }
        }
    }
    drop(listener);
    // 在线连接各自持有关闭信号接收端，等待它们体面退出。
    while connections.join_next().await.is_some() {}
}

async fn serve_connection<F: PipelineFilter + Sync>(
    stream: TcpStream,
    peer_addr: SocketAddr,
    filter_factory: Arc<dyn Fn() -> F + Send + Sync>,
    handler: BoxPackageHandler<F::Package>,
    options: ChannelOptions,
    tls: Option<TlsAcceptor>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let local_addr = match stream.local_addr() {
        Ok(addr) => addr,
        Err(err) => {
            warn!(target: "flint::server", error = %err, "connection setup failed");
            return;
        }
    };
    if let Err(err) = stream.set_nodelay(true) {
        warn!(target: "flint::server", error = %err, "failed to disable nagle");
    }

    let transport: BoxTransport = match &tls {
        Some(acceptor) => {
            // 停止信号要能打断进行中的握手，避免慢客户端拖住停机。
            let secured = tokio::select! {
                biased;
                _ = shutdown_rx.wait_for(|stop| *stop) => return,
                secured = acceptor.accept(stream) => secured,
            };
            match secured {
                Ok(secured) => Box::new(secured),
                Err(err) => {
                    warn!(target: "flint::server", %peer_addr, error = %err, "tls accept failed");
                    return;
                }
            }
        }
        None => Box::new(stream),
    };

    let mut channel = Channel::new(
        transport,
        local_addr,
        peer_addr,
        (filter_factory)(),
        options,
    );
    let sender = match channel.sender() {
        Ok(sender) => sender,
        Err(err) => {
            warn!(target: "flint::server", %peer_addr, error = %err, "channel setup failed");
            return;
        }
    };
    let handle = ChannelHandle {
        sender,
        local_addr,
        peer_addr,
    };
    debug!(target: "flint::server", %peer_addr, "connection ready");

    tokio::select! {
        biased;
        _ = async { let _ = shutdown_rx.wait_for(|stop| *stop).await; } => {
            handle.close().await;
        }
        _ = drive_channel(&mut channel, &handler, &handle) => {}
    }
    channel.close().await;
    debug!(target: "flint::server", %peer_addr, "connection finished");
}

/// 逐包驱动一条连接：包到达即调用处理器，序列终结即返回。
async fn drive_channel<F: PipelineFilter + Sync>(
    channel: &mut Channel<BoxTransport, F>,
    handler: &BoxPackageHandler<F::Package>,
    handle: &ChannelHandle,
) {
    let mut packages = channel.packages();
    while let Some(item) = packages.next().await {
        match item {
            Ok(package) => {
                if let Err(err) = (handler)(handle.clone(), package).await {
                    warn!(
                        target: "flint::server",
                        peer_addr = %handle.peer_addr(),
                        error = %err,
                        "package handler failed",
                    );
                    break;
                }
            }
            Err(err) => {
                debug!(
                    target: "flint::server",
                    peer_addr = %handle.peer_addr(),
                    error = %err,
                    "channel terminated with error",
                );
                break;
            }
        }
    }
}
