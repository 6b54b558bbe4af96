//! # channel 模块说明
//!
//! ## 角色定位（Why）
//! - 通道是传输的运行期所有者：驱动接收循环、把字节交给管道过滤器、
//!   以惰性序列产出包，同时提供串行化的发送路径；
//! - 拆离（detach）是本模块最严苛的操作：把活着的传输完整交还调用方，
//!   既不丢字节也不重复字节，之后通道对传输的一切访问都被拒绝。
//!
//! ## 实现策略（How）
//! - 传输在构造时拆成读写两个半部：读半部由接收循环独占，写半部套在
//!   公平异步互斥锁内的缓冲写入器里，发送方按到达顺序串行写出；
//! - 接收循环由消费方驱动：每次拉取才向传输要字节，过滤器严格顺序
//!   消费，包按终结字节的到达顺序产出；
//! - 生命周期用一枚原子状态标志管理（`Created → Running → Detached |
//!   Closed`），拆离与关闭的竞争由 CAS 一锤定音，输家只会观察到终态；
//! - 关闭信号走 `watch` 通道：任何持有发送句柄的任务都能让接收循环的
//!   挂起点立刻退出。
//!
//! ## 契约要点（What）
//! - 驱动接收循环与调用 `detach` 都需要 `&mut Channel`，二者在编译期
//!   即互斥，"循环与拆离不得并发"的不变量不依赖运行期检查；
//! - 包序列对消费方是单消费者的：对端优雅关闭时序列自然结束，传输或
//!   分帧出错时序列以一条 `Err` 项收尾后结束；
//! - 拆离只在包边界完成交接，已读出未消费的字节随
//!   [`DetachedTransport::residue`] 一并交还。
//!
//! ## 风险与考量（Trade-offs）
//! - 读写半部合并（`unsplit`）要求写半部只有唯一持有者，因此存在
//!   发送句柄克隆时拆离会被拒绝；
//! - `close` 需要短暂持有写锁以冲刷并半关写方向，若传输已僵死，会
//!   等到在途发送出错返回后才能完成。

use std::mem;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter, ReadHalf, WriteHalf};
use tokio::sync::{Mutex as AsyncMutex, watch};
use tracing::{debug, trace};

use crate::error::{ChannelError, ChannelOperation};
use crate::filter::{FilterContext, PipelineFilter};
use crate::options::ChannelOptions;
use crate::transport::{DetachedTransport, Transport};

/// 通道生命周期状态。`Detached` 与 `Closed` 为终态，没有任何迁移
/// 能够离开它们。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelState {
    /// 已构造，接收循环尚未启动。
    Created = 0,
    /// 接收循环已启动。
    Running = 1,
    /// 传输所有权已交还调用方。
    Detached = 2,
    /// 通道已关闭（显式关闭、对端结束或出错）。
    Closed = 3,
}

impl core::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let text = match self {
            ChannelState::Created => "created",
            ChannelState::Running => "running",
            ChannelState::Detached => "detached",
            ChannelState::Closed => "closed",
        };
        f.write_str(text)
    }
}

fn state_from_u8(value: u8) -> ChannelState {
    match value {
        0 => ChannelState::Created,
        1 => ChannelState::Running,
        2 => ChannelState::Detached,
        _ => ChannelState::Closed,
    }
}

/// 原子状态标志：所有生命周期迁移的唯一仲裁者。
///
/// 拆离与关闭可能从不同任务同时发起，胜负由 CAS 决定；输家读到的
/// 一定是赢家写入的终态。
#[derive(Debug)]
struct StateFlag(AtomicU8);

impl StateFlag {
    fn new() -> Self {
        Self(AtomicU8::new(ChannelState::Created as u8))
    }

    fn load(&self) -> ChannelState {
        state_from_u8(self.0.load(Ordering::Acquire))
    }

    /// 首次拉取时把 `Created` 推进为 `Running`，返回推进后的状态。
    fn begin_running(&self) -> ChannelState {
        match self.0.compare_exchange(
            ChannelState::Created as u8,
            ChannelState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => ChannelState::Running,
            Err(actual) => state_from_u8(actual),
        }
    }

    /// 尝试迁移到 `Closed`；已处终态时返回 `false`。
    fn try_close(&self) -> bool {
        loop {
            let current = self.0.load(Ordering::Acquire);
            if current == ChannelState::Detached as u8 || current == ChannelState::Closed as u8 {
                return false;
            }
            if self
                .0
                .compare_exchange(
                    current,
                    ChannelState::Closed as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return true;
            }
        }
    }

    /// 尝试迁移到 `Detached`；失败时返回当时的状态。
    fn try_detach(&self) -> Result<(), ChannelState> {
        loop {
            let current = self.0.load(Ordering::Acquire);
            if current == ChannelState::Detached as u8 || current == ChannelState::Closed as u8 {
                return Err(state_from_u8(current));
            }
            if self
                .0
                .compare_exchange(
                    current,
                    ChannelState::Detached as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return Ok(());
            }
        }
    }
}

type SharedWriter<T> = Arc<AsyncMutex<BufWriter<WriteHalf<T>>>>;

/// 在写锁内完成一次完整发送；IO 失败时顺带关闭通道。
async fn send_over<T: Transport>(
    state: &StateFlag,
    closed_tx: &watch::Sender<bool>,
    writer: &AsyncMutex<BufWriter<WriteHalf<T>>>,
    data: &[u8],
) -> Result<(), ChannelError> {
    let current = state.load();
    if !matches!(current, ChannelState::Created | ChannelState::Running) {
        return Err(ChannelError::invalid_state(ChannelOperation::Send, current));
    }
    let mut guard = writer.lock().await;
    // 等锁期间通道可能已被关闭或拆离，写出前必须复核。
    let current = state.load();
    if !matches!(current, ChannelState::Created | ChannelState::Running) {
        return Err(ChannelError::invalid_state(ChannelOperation::Send, current));
    }
    let outcome = async {
        guard.write_all(data).await?;
        guard.flush().await
    }
    .await;
    match outcome {
        Ok(()) => Ok(()),
        Err(err) => {
            if state.try_close() {
                let _ = closed_tx.send(true);
            }
            Err(ChannelError::io(ChannelOperation::Send, err))
        }
    }
}

/// 可克隆的发送句柄，供其他任务在接收循环运行期间向同一通道写出。
///
/// # 教案式说明
/// - **意图 (Why)**：服务端处理器要在包到达的回调里向原通道回写，而
///   此时接收循环正独占通道本体；发送句柄把写路径单独摘出来共享；
/// - **契约 (What)**：
///   - `send` 与通道本体的发送共用同一把公平锁，跨任务的发送按获锁
///     顺序串行写出，不会出现穿插的半截写入；
///   - `close` 可以在任意任务调用，接收循环的挂起点会立刻解除；
///   - 句柄存活期间拆离会被拒绝：写半部的唯一性是 `unsplit` 的前提。
pub struct ChannelSender<T: Transport> {
    state: Arc<StateFlag>,
    closed_tx: Arc<watch::Sender<bool>>,
    writer: SharedWriter<T>,
    peer_addr: SocketAddr,
}

impl<T: Transport> Clone for ChannelSender<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            closed_tx: Arc::clone(&self.closed_tx),
            writer: Arc::clone(&self.writer),
            peer_addr: self.peer_addr,
        }
    }
}

impl<T: Transport> ChannelSender<T> {
    /// 向通道写出一段字节。
    pub async fn send(&self, data: &[u8]) -> Result<(), ChannelError> {
        send_over(&self.state, &self.closed_tx, &self.writer, data).await
    }

    /// 关闭通道：解除接收循环的挂起点并半关写方向。重复调用无副作用。
    pub async fn close(&self) {
        if !self.state.try_close() {
            return;
        }
        let _ = self.closed_tx.send(true);
        let mut guard = self.writer.lock().await;
        let _ = guard.shutdown().await;
        trace!(target: "flint::channel", peer = %self.peer_addr, "channel closed via sender");
    }

    /// 对端地址。
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// 当前通道状态快照。
    pub fn state(&self) -> ChannelState {
        self.state.load()
    }
}

/// 一条已建立传输的运行期所有者。
///
/// # 教案级注释
/// - **意图 (Why)**：把"字节流 → 包序列"的全部运行期职责集中于一个
///   对象：读循环、过滤器驱动、发送串行化、关闭与拆离；
/// - **契约 (What)**：
///   - [`packages`](Self::packages) 返回消费方驱动的包序列，逐次拉取
///     即推进接收循环；
///   - [`send`](Self::send) 可与接收循环并发（读写方向独立）；
///   - [`detach`](Self::detach) 恰好一次；之后 `send`/`receive` 一律
///     返回 `InvalidState`，传输本体对调用方完全可用；
///   - [`close`](Self::close) 幂等，可在两次拉取之间调用；跨任务关闭
///     请使用 [`sender`](Self::sender) 句柄；
/// - **前置条件**：传输与过滤器实例均归本通道独占；
/// - **风险 (Trade-offs)**：消费方驱动意味着无人拉取时通道不读传输，
///   对端积压由内核缓冲与 TCP 流控兜底。
pub struct Channel<T: Transport, F: PipelineFilter> {
    state: Arc<StateFlag>,
    reader: Option<ReadHalf<T>>,
    writer: Option<SharedWriter<T>>,
    closed_tx: Arc<watch::Sender<bool>>,
    closed_rx: watch::Receiver<bool>,
    filter: F,
    buffer: BytesMut,
    options: ChannelOptions,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    faulted: bool,
    read_eof: bool,
}

impl<T: Transport, F: PipelineFilter> Channel<T, F> {
    /// 以一条已建立的传输装配通道。
    pub fn new(
        stream: T,
        local_addr: SocketAddr,
        peer_addr: SocketAddr,
        filter: F,
        options: ChannelOptions,
    ) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        let writer = BufWriter::with_capacity(options.send_buffer_size(), write_half);
        let (closed_tx, closed_rx) = watch::channel(false);
        Self {
            state: Arc::new(StateFlag::new()),
            reader: Some(read_half),
            writer: Some(Arc::new(AsyncMutex::new(writer))),
            closed_tx: Arc::new(closed_tx),
            closed_rx,
            filter,
            buffer: BytesMut::with_capacity(options.receive_buffer_size()),
            options,
            local_addr,
            peer_addr,
            faulted: false,
            read_eof: false,
        }
    }

    /// 当前状态快照。
    pub fn state(&self) -> ChannelState {
        self.state.load()
    }

    /// 本端地址。
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 对端地址。
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// 克隆出一个发送句柄。通道已拆离时拒绝。
    pub fn sender(&self) -> Result<ChannelSender<T>, ChannelError> {
        let writer = self.writer.as_ref().ok_or_else(|| {
            ChannelError::invalid_state(ChannelOperation::Send, self.state.load())
        })?;
        Ok(ChannelSender {
            state: Arc::clone(&self.state),
            closed_tx: Arc::clone(&self.closed_tx),
            writer: Arc::clone(writer),
            peer_addr: self.peer_addr,
        })
    }

    /// 向通道写出一段字节。与接收循环并发安全；多方发送按获锁顺序
    /// 串行写出。
    pub async fn send(&self, data: &[u8]) -> Result<(), ChannelError> {
        let writer = self.writer.as_ref().ok_or_else(|| {
            ChannelError::invalid_state(ChannelOperation::Send, self.state.load())
        })?;
        send_over(&self.state, &self.closed_tx, writer, data).await
    }

    /// 关闭通道。幂等；已拆离的通道不再触碰传输。
    pub async fn close(&self) {
        if !self.state.try_close() {
            return;
        }
        let _ = self.closed_tx.send(true);
        if let Some(writer) = &self.writer {
            let mut guard = writer.lock().await;
            let _ = guard.shutdown().await;
        }
        self.options.span().in_scope(|| {
            debug!(target: "flint::channel", peer = %self.peer_addr, "channel closed");
        });
    }

    /// 返回消费方驱动的包序列。
    ///
    /// 序列是惰性的：每次 `next` 才推进接收循环。对端优雅关闭时序列
    /// 自然结束；传输或分帧出错时先产出一条 `Err`，随后结束。
    pub fn packages(&mut self) -> PackageStream<'_, T, F> {
        PackageStream { channel: self }
    }

    /// 把传输所有权交还调用方，通道进入 `Detached` 终态。
    ///
    /// # 教案级注释
    /// - **意图 (Why)**：调用方接管传输后可以绕过分帧直接读写，典型
    ///   场景是协议升级或移交给外部库；
    /// - **契约 (What)**：
    ///   - 恰好一次：再次调用返回 `InvalidState`；
    ///   - 在途缓冲的发送数据先行冲刷，已读出未消费的字节随
    ///     [`DetachedTransport::residue`] 交还，不丢失任何字节；
    ///   - 与 `close` 竞争时先完成者获胜，输家观察到终态；
    /// - **前置条件**：所有发送句柄均已释放；写半部存在其他持有者时
    ///   无法合并读写半部，本次调用被拒绝且通道保持原状态；
    /// - **后置条件**：成功后通道上的 `send`/`receive` 一律被状态机
    ///   拒绝。
    pub async fn detach(&mut self) -> Result<DetachedTransport<T>, ChannelError> {
        if let Some(writer) = self.writer.as_ref()
            && Arc::strong_count(writer) != 1
        {
            return Err(ChannelError::invalid_state(
                ChannelOperation::Detach,
                self.state.load(),
            ));
        }
        self.state
            .try_detach()
            .map_err(|state| ChannelError::invalid_state(ChannelOperation::Detach, state))?;

        let reader = self.reader.take().ok_or(ChannelError::InvalidState {
            operation: ChannelOperation::Detach,
            state: ChannelState::Detached,
        })?;
        let writer = self.writer.take().ok_or(ChannelError::InvalidState {
            operation: ChannelOperation::Detach,
            state: ChannelState::Detached,
        })?;
        let mutex = Arc::try_unwrap(writer).map_err(|_| ChannelError::InvalidState {
            operation: ChannelOperation::Detach,
            state: ChannelState::Detached,
        })?;
        let mut buffered = mutex.into_inner();
        buffered
            .flush()
            .await
            .map_err(|err| ChannelError::io(ChannelOperation::Detach, err))?;
        let write_half = buffered.into_inner();
        let stream = reader.unsplit(write_half);
        let residue = mem::take(&mut self.buffer).freeze();
        self.options.span().in_scope(|| {
            debug!(
                target: "flint::channel",
                peer = %self.peer_addr,
                residue = residue.len(),
                "transport detached",
            );
        });
        Ok(DetachedTransport {
            stream,
            residue,
            local_addr: self.local_addr,
            peer_addr: self.peer_addr,
        })
    }

    fn mark_closed(&mut self) {
        if self.state.try_close() {
            let _ = self.closed_tx.send(true);
            self.options.span().in_scope(|| {
                debug!(target: "flint::channel", peer = %self.peer_addr, "receive loop finished");
            });
        }
    }

    fn fault(&mut self) {
        self.faulted = true;
        self.mark_closed();
    }

    async fn next_package(&mut self) -> Option<Result<F::Package, ChannelError>> {
        if self.faulted {
            return None;
        }
        match self.state.begin_running() {
            ChannelState::Running | ChannelState::Created => {}
            ChannelState::Detached => {
                return Some(Err(ChannelError::invalid_state(
                    ChannelOperation::Receive,
                    ChannelState::Detached,
                )));
            }
            ChannelState::Closed => return None,
        }

        loop {
            if !self.buffer.is_empty() {
                let mut ctx = FilterContext::new(self.options.max_package_size());
                match self.filter.filter(&mut self.buffer, &mut ctx) {
                    Ok(Some(package)) => return Some(Ok(package)),
                    Ok(None) => {}
                    Err(err) => {
                        self.fault();
                        return Some(Err(ChannelError::Framing(err)));
                    }
                }
            }

            if self.read_eof {
                self.mark_closed();
                return None;
            }
            if *self.closed_rx.borrow() {
                self.mark_closed();
                return None;
            }

            self.buffer.reserve(self.options.receive_buffer_size());
            let pulled = {
                let reader = self.reader.as_mut()?;
                let buffer = &mut self.buffer;
                let closed_rx = &mut self.closed_rx;
                tokio::select! {
                    biased;
                    _ = closed_rx.wait_for(|closed| *closed) => None,
                    read = reader.read_buf(buffer) => Some(read),
                }
            };
            match pulled {
                None => {
                    self.mark_closed();
                    return None;
                }
                Some(Ok(0)) => {
                    trace!(target: "flint::channel", peer = %self.peer_addr, "transport reached end of stream");
                    self.read_eof = true;
                }
                Some(Ok(received)) => {
                    trace!(target: "flint::channel", peer = %self.peer_addr, received, "bytes pulled");
                }
                Some(Err(err)) => {
                    self.fault();
                    return Some(Err(ChannelError::io(ChannelOperation::Receive, err)));
                }
            }
        }
    }
}

/// 通道的包序列视图：单消费者、惰性、按线序产出。
///
/// 视图可变借用通道本体，因此序列消费与 `detach` 在编译期互斥；
/// 两次拉取之间随时可以释放视图去调用 `detach` 或 `close`。
pub struct PackageStream<'a, T: Transport, F: PipelineFilter> {
    channel: &'a mut Channel<T, F>,
}

impl<T: Transport, F: PipelineFilter> PackageStream<'_, T, F> {
    /// 拉取下一个包。
    ///
    /// - `Some(Ok(package))`：下一个包，严格按终结字节的线序；
    /// - `Some(Err(..))`：带错终止，再次拉取返回 `None`；
    /// - `None`：序列结束（对端优雅关闭或通道已关闭）。
    pub async fn next(&mut self) -> Option<Result<F::Package, ChannelError>> {
        self.channel.next_package().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FramingError;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf, duplex};

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().expect("parse loopback")
    }

    /// 以 `\n` 分帧的测试过滤器，帧内容为去掉终结符的字节向量。
    /// 遇到 `!` 开头的帧时报告分帧损坏，用于验证带错终止路径。
    struct TestLineFilter;

    impl PipelineFilter for TestLineFilter {
        type Package = Vec<u8>;

        fn filter(
            &mut self,
            src: &mut BytesMut,
            ctx: &mut FilterContext,
        ) -> Result<Option<Self::Package>, FramingError> {
            let Some(pos) = src.iter().position(|byte| *byte == b'\n') else {
                if let Some(limit) = ctx.max_package_size()
                    && src.len() > limit
                {
                    return Err(FramingError::PackageTooLarge {
                        length: src.len(),
                        limit,
                    });
                }
                return Ok(None);
            };
            if let Some(limit) = ctx.max_package_size()
                && pos > limit
            {
                return Err(FramingError::PackageTooLarge { length: pos, limit });
            }
            let frame = src.split_to(pos + 1);
            if frame.first() == Some(&b'!') {
                return Err(FramingError::corrupt("test frame marked corrupt"));
            }
            Ok(Some(frame[..frame.len() - 1].to_vec()))
        }
    }

    fn test_channel(
        stream: tokio::io::DuplexStream,
    ) -> Channel<tokio::io::DuplexStream, TestLineFilter> {
        Channel::new(
            stream,
            loopback(),
            loopback(),
            TestLineFilter,
            ChannelOptions::default(),
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn packages_arrive_in_wire_order() {
        let (near, mut far) = duplex(1024);
        let mut channel = test_channel(near);
        far.write_all(b"alpha\nbeta\ngamma\n")
            .await
            .expect("write frames");

        let mut stream = channel.packages();
        for expected in ["alpha", "beta", "gamma"] {
            let package = stream
                .next()
                .await
                .expect("stream alive")
                .expect("package ok");
            assert_eq!(package, expected.as_bytes());
        }
        assert_eq!(channel.state(), ChannelState::Running);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn frame_split_across_writes_yields_single_package() {
        let (near, mut far) = duplex(1024);
        let mut channel = test_channel(near);

        let writer = tokio::spawn(async move {
            for chunk in [&b"spl"[..], &b"it-fra"[..], &b"me\n"[..]] {
                far.write_all(chunk).await.expect("write chunk");
                far.flush().await.expect("flush chunk");
            }
            far
        });

        let package = channel
            .packages()
            .next()
            .await
            .expect("stream alive")
            .expect("package ok");
        assert_eq!(package, b"split-frame");
        drop(writer.await.expect("writer join"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn clean_eof_ends_stream_after_draining() {
        let (near, mut far) = duplex(1024);
        let mut channel = test_channel(near);
        far.write_all(b"tail\n").await.expect("write");
        drop(far);

        let mut stream = channel.packages();
        let package = stream.next().await.expect("one package").expect("ok");
        assert_eq!(package, b"tail");
        assert!(stream.next().await.is_none(), "clean end of stream");
        assert_eq!(channel.state(), ChannelState::Closed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn close_from_sender_unblocks_pending_pull() {
        let (near, _far) = duplex(1024);
        let mut channel = test_channel(near);
        let sender = channel.sender().expect("sender available");

        let closer = tokio::spawn(async move {
            sender.close().await;
        });

        assert!(channel.packages().next().await.is_none());
        assert_eq!(channel.state(), ChannelState::Closed);
        closer.await.expect("closer join");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn framing_error_terminates_stream_with_cause() {
        let (near, mut far) = duplex(1024);
        let mut channel = test_channel(near);
        far.write_all(b"ok\n!broken\nnever\n")
            .await
            .expect("write frames");

        let mut stream = channel.packages();
        assert_eq!(
            stream.next().await.expect("first").expect("ok package"),
            b"ok"
        );
        let err = stream.next().await.expect("second item").expect_err("err");
        assert!(matches!(err, ChannelError::Framing(_)));
        assert!(stream.next().await.is_none(), "stream ends after fault");
        assert_eq!(channel.state(), ChannelState::Closed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn oversized_frame_is_rejected_before_terminator() {
        let (near, mut far) = duplex(1024);
        let options = ChannelOptions::default().with_max_package_size(Some(8));
        let mut channel = Channel::new(near, loopback(), loopback(), TestLineFilter, options);
        far.write_all(b"way-too-long-frame-without-newline")
            .await
            .expect("write");

        let err = channel
            .packages()
            .next()
            .await
            .expect("item")
            .expect_err("oversize");
        assert!(matches!(
            err,
            ChannelError::Framing(FramingError::PackageTooLarge { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn send_reaches_peer_and_respects_order() {
        let (near, far) = duplex(1024);
        let channel = Channel::new(
            near,
            loopback(),
            loopback(),
            TestLineFilter,
            ChannelOptions::default(),
        );
        channel.send(b"first\n").await.expect("send first");
        channel.send(b"second\n").await.expect("send second");

        let mut far_channel = test_channel(far);
        let mut stream = far_channel.packages();
        assert_eq!(stream.next().await.expect("one").expect("ok"), b"first");
        assert_eq!(stream.next().await.expect("two").expect("ok"), b"second");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn detach_returns_residue_and_usable_stream() {
        let (near, mut far) = duplex(1024);
        let mut channel = test_channel(near);
        far.write_all(b"one\ntwo\npartial").await.expect("write");

        let package = channel
            .packages()
            .next()
            .await
            .expect("item")
            .expect("package");
        assert_eq!(package, b"one");

        let detached = channel.detach().await.expect("detach succeeds");
        assert_eq!(&detached.residue[..], b"two\npartial");
        assert_eq!(channel.state(), ChannelState::Detached);

        // 拆离后的传输必须完全可用：直写直读，不经过通道。
        let mut stream = detached.stream;
        stream.write_all(b"raw-bytes").await.expect("raw write");
        let mut received = vec![0u8; 9];
        far.read_exact(&mut received).await.expect("raw read");
        assert_eq!(received, b"raw-bytes");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn detach_is_exactly_once_and_poisons_io() {
        let (near, _far) = duplex(1024);
        let mut channel = test_channel(near);
        channel.detach().await.expect("first detach");

        let err = channel.detach().await.expect_err("second detach");
        assert!(err.is_invalid_state());

        let err = channel.send(b"x").await.expect_err("send after detach");
        assert!(err.is_invalid_state());

        let err = channel
            .packages()
            .next()
            .await
            .expect("item")
            .expect_err("receive after detach");
        assert!(err.is_invalid_state());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn detach_rejected_while_sender_alive() {
        let (near, _far) = duplex(1024);
        let mut channel = test_channel(near);
        let sender = channel.sender().expect("sender");

        let err = channel.detach().await.expect_err("detach must fail");
        assert!(err.is_invalid_state());
        // 句柄释放后拆离恢复可用。
        drop(sender);
        channel.detach().await.expect("detach after drop");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn close_then_detach_resolves_deterministically() {
        let (near, _far) = duplex(1024);
        let mut channel = test_channel(near);
        channel.close().await;

        let err = channel.detach().await.expect_err("loser observes close");
        assert!(matches!(
            err,
            ChannelError::InvalidState {
                state: ChannelState::Closed,
                ..
            }
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn close_after_detach_is_a_noop() {
        let (near, mut far) = duplex(1024);
        let mut channel = test_channel(near);
        let detached = channel.detach().await.expect("detach");
        channel.close().await;
        assert_eq!(channel.state(), ChannelState::Detached);

        // 关闭不得触碰已交还的传输。
        let mut stream = detached.stream;
        stream.write_all(b"still-alive").await.expect("write");
        let mut received = vec![0u8; 11];
        far.read_exact(&mut received).await.expect("read");
        assert_eq!(received, b"still-alive");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn send_after_close_fails_immediately() {
        let (near, _far) = duplex(1024);
        let channel = test_channel(near);
        channel.close().await;
        let err = channel.send(b"late\n").await.expect_err("send after close");
        assert!(err.is_invalid_state());
    }

    /// 读路径恒定报错的传输桩，用于覆盖带错终止。
    struct FaultyTransport;

    impl AsyncRead for FaultyTransport {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "peer reset",
            )))
        }
    }

    impl AsyncWrite for FaultyTransport {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn transport_error_terminates_stream_with_io_cause() {
        let mut channel = Channel::new(
            FaultyTransport,
            loopback(),
            loopback(),
            TestLineFilter,
            ChannelOptions::default(),
        );
        let mut stream = channel.packages();
        let err = stream.next().await.expect("item").expect_err("io error");
        assert!(matches!(err, ChannelError::Io { .. }));
        assert!(stream.next().await.is_none());
        assert_eq!(channel.state(), ChannelState::Closed);
    }

    #[test]
    fn state_flag_transitions_are_single_shot() {
        let flag = StateFlag::new();
        assert_eq!(flag.begin_running(), ChannelState::Running);
        assert!(flag.try_close());
        assert!(!flag.try_close(), "second close is a no-op");
        assert_eq!(flag.try_detach(), Err(ChannelState::Closed));
    }

    #[test]
    fn state_flag_detach_wins_over_later_close() {
        let flag = StateFlag::new();
        assert_eq!(flag.begin_running(), ChannelState::Running);
        assert!(flag.try_detach().is_ok());
        assert!(!flag.try_close(), "close observes detached terminal state");
        assert_eq!(flag.load(), ChannelState::Detached);
    }
}
