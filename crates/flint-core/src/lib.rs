#![doc = r#"
# flint-core

## 设计动机（Why）
- **定位**：把一条原始字节传输（TCP 或 TLS 包装流）双向变换为离散的
  强类型协议包序列。服务端对每条连接、客户端对单条连接使用同一套
  引擎，两侧完全对称。
- **架构角色**：本 crate 承载引擎核心——连接器链、管道过滤器契约与
  通道（接收循环、发送、关闭与拆离）；具体协议（行文本等）与安全层
  （TLS）由外围 crate 以相同契约接入。
- **设计理念**：传输的所有权在任一时刻**恰好一个**持有者；分帧状态
  绝不跨通道共享；错误不在引擎内重试，一次性携带根因向上传播。

## 核心契约（What）
- [`Connector`](connector::Connector)：装饰式建连链，
  `connect(endpoint) -> Connected | ConnectError`，失败携带层级；
- [`PipelineFilter`](filter::PipelineFilter)：增量分帧，
  任意切分下产出与整帧缓冲一致；
- [`Channel`](channel::Channel)：`packages()` 惰性包序列（对端关闭则
  自然终结，出错则带因终结）、`send` 串行写出、`close` 幂等、
  `detach` 恰好一次并交还传输与剩余字节。

## 实现策略（How）
- 完全构建在 Tokio 之上：传输拆半、公平互斥的写路径、`watch` 关闭
  信号与 `select!` 组合挂起点；
- 接收循环由消费方驱动，不常驻后台任务；拆离因此天然落在包边界；
- 生命周期迁移集中在一枚原子标志上，拆离/关闭竞争由 CAS 裁决。

## 风险与考量（Trade-offs）
- 写半部以互斥锁串行化，同通道并发发送按获锁顺序排队；
- 消费方停止拉取时引擎不读传输，流量积压交由 TCP 流控处理；
- 发送句柄存活期间拆离被拒绝，这是读写半部合并的硬性前提。
"#]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod channel;
pub mod connector;
pub mod error;
pub mod filter;
pub mod options;
pub mod transport;

pub use channel::{Channel, ChannelSender, ChannelState, PackageStream};
pub use connector::{Connector, DynConnector, TcpConnector, boxed};
pub use error::{ChannelError, ChannelOperation, ConnectError, ConnectStage, FramingError};
pub use filter::{FilterContext, PipelineFilter};
pub use options::ChannelOptions;
pub use transport::{BoxTransport, Connected, DetachedTransport, Transport};
