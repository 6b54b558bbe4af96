//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为通道引擎提供集中定义的错误域：建连、分帧、传输 IO 与状态机拒绝
//!   分别对应独立类型，方便调用方精确匹配并决定重试或放弃；
//! - 引擎内部不做任何重试，所有错误一次性向上传播，退避策略完全交给
//!   调用方。
//!
//! ## 设计要求（What）
//! - 所有错误类型实现 `thiserror::Error`，保留 `source()` 根因链路；
//! - 分帧错误（[`FramingError`]）与 IO 错误对通道都是致命的：通道在上报
//!   后即进入 `Closed`，包序列随之终结；
//! - 状态机拒绝（`InvalidState`）必须携带被拒绝的操作与当时的状态，
//!   便于排障时还原时序。

use std::borrow::Cow;
use std::io;

use thiserror::Error;

use crate::channel::ChannelState;

/// 连接器链中发生失败的阶段。
///
/// # 教案式说明
/// - **意图 (Why)**：连接器链由多级装饰组成，失败时必须指明是哪一级
///   出错，否则"连不上"无法区分 DNS、TCP 或安全握手问题；
/// - **契约 (What)**：每个连接器在构造 [`ConnectError`] 时填入自己的
///   阶段标识；装饰器对内层错误原样透传，不得改写阶段。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectStage {
    /// 端点名称解析（DNS 查询或地址格式解析）。
    Resolve,
    /// 操作系统层的 TCP 建连。
    Tcp,
    /// 安全层握手（协议协商与证书校验）。
    TlsHandshake,
}

impl core::fmt::Display for ConnectStage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let text = match self {
            ConnectStage::Resolve => "resolve",
            ConnectStage::Tcp => "tcp connect",
            ConnectStage::TlsHandshake => "tls handshake",
        };
        f.write_str(text)
    }
}

/// 连接器链失败时携带阶段信息的错误。
///
/// # 教案式说明
/// - **意图 (Why)**：把"链中任一级失败即整链失败"的契约落到类型上，
///   调用方拿到错误即可知道失败层级与根因；
/// - **契约 (What)**：`stage` 标识失败层级；`message` 面向排障人员；
///   `source` 保留底层错误（`io::Error`、TLS 库错误等）；
/// - **风险 (Trade-offs)**：`message` 使用 `Cow` 以允许静态文案零分配，
///   动态上下文则付出一次堆分配。
#[derive(Debug, Error)]
#[error("connector chain failed at {stage}: {message}")]
pub struct ConnectError {
    stage: ConnectStage,
    message: Cow<'static, str>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl ConnectError {
    /// 构造不带根因的连接错误。
    pub fn new(stage: ConnectStage, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            stage,
            message: message.into(),
            source: None,
        }
    }

    /// 附带底层根因并返回新的错误。
    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// 由 IO 错误构造指定阶段的连接错误。
    pub fn io(stage: ConnectStage, error: io::Error) -> Self {
        Self {
            stage,
            message: Cow::Owned(error.to_string()),
            source: Some(Box::new(error)),
        }
    }

    /// 构造指定阶段的超时错误。
    pub fn timeout(stage: ConnectStage) -> Self {
        Self::new(stage, "operation timed out")
    }

    /// 返回失败阶段。
    pub fn stage(&self) -> ConnectStage {
        self.stage
    }
}

/// 分帧失败的具体形态。对通道而言两种都是致命错误。
#[derive(Debug, Error)]
pub enum FramingError {
    /// 帧长超出配置上限。
    ///
    /// `length` 为触发拒绝时已确认的帧长下界：终结符尚未到达时即可
    /// 判定超限，不必等整帧缓冲完成。
    #[error("package length {length} exceeds configured limit {limit}")]
    PackageTooLarge {
        /// 已确认的帧长（或其下界）。
        length: usize,
        /// 配置的最大包长。
        limit: usize,
    },
    /// 帧内容不符合协议约定（如非法 UTF-8、缺失终结符结构）。
    #[error("malformed frame: {reason}")]
    Corrupt {
        /// 人类可读的失败原因。
        reason: Cow<'static, str>,
    },
}

impl FramingError {
    /// 构造内容损坏错误的便捷入口。
    pub fn corrupt(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::Corrupt {
            reason: reason.into(),
        }
    }
}

/// 通道上一次具体操作的标识，用于错误上下文。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelOperation {
    /// 向传输写出字节。
    Send,
    /// 从包序列拉取下一个包。
    Receive,
    /// 将传输所有权移交调用方。
    Detach,
    /// 关闭通道。
    Close,
}

impl core::fmt::Display for ChannelOperation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let text = match self {
            ChannelOperation::Send => "send",
            ChannelOperation::Receive => "receive",
            ChannelOperation::Detach => "detach",
            ChannelOperation::Close => "close",
        };
        f.write_str(text)
    }
}

/// 通道运行期错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：聚合通道生命周期内所有可观察的失败：传输 IO、
///   分帧违规与状态机拒绝。包序列以一条 `Err` 项终结即表示"带错终止"，
///   与对端优雅关闭（序列自然结束）可被调用方明确区分；
/// - **契约 (What)**：
///   - `Io`/`Framing` 出现后通道进入 `Closed`，不再产出任何包；
///   - `InvalidState` 不改变通道状态，仅拒绝当前操作；
/// - **风险 (Trade-offs)**：`Io` 按操作维度携带上下文而非统一文案，
///   告警聚合时需按 `operation` 分桶。
#[derive(Debug, Error)]
pub enum ChannelError {
    /// 传输层读写失败，通道随即关闭。
    #[error("transport i/o failed during {operation}")]
    Io {
        /// 失败的操作。
        operation: ChannelOperation,
        /// 底层 IO 错误。
        #[source]
        source: io::Error,
    },
    /// 分帧失败，通道随即关闭，不产出部分包。
    #[error(transparent)]
    Framing(#[from] FramingError),
    /// 操作被状态机拒绝：通道已处于 `Detached` 或 `Closed` 等终态。
    #[error("{operation} rejected: channel is {state}")]
    InvalidState {
        /// 被拒绝的操作。
        operation: ChannelOperation,
        /// 拒绝时通道所处状态。
        state: ChannelState,
    },
}

impl ChannelError {
    /// 由 IO 错误构造携带操作上下文的通道错误。
    pub fn io(operation: ChannelOperation, source: io::Error) -> Self {
        Self::Io { operation, source }
    }

    /// 构造状态机拒绝错误。
    pub fn invalid_state(operation: ChannelOperation, state: ChannelState) -> Self {
        Self::InvalidState { operation, state }
    }

    /// 判断错误是否为状态机拒绝。
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }
}
