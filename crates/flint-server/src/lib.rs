#![doc = r#"
# flint-server

## 设计动机（Why）
- **定位**：服务端调度器——接受传输，按连接装配"通道 + 全新过滤器
  实例"，对每个产出的包调用注册的处理器，并把可回写的通道句柄交给
  处理器；
- **架构角色**：通道引擎的服务侧宿主。引擎两侧对称，调度器只负责
  接受与装配，分帧与收发语义完全复用 `flint-core`。

## 核心契约（What）
- [`ServerBuilder::on_package`]：注册包处理器
  `(ChannelHandle, Package) -> Future`；
- [`ServerBuilder::bind`]：绑定监听地址并立即开始接受连接；
- [`Server::stop`]：停止接受新连接，并促使所有在线通道的挂起点尽快
  退出；
- 每条连接独享一个过滤器实例，连接之间互不共享任何分帧状态。

## 实现策略（How）
- 接受循环与每连接任务均以 `watch` 关闭信号组合挂起点，停止路径
  不依赖任务强杀；
- TLS 接入是装配期的可选项：配置了握手入口则先握手再装通道，调度
  逻辑对明文/加密完全一致。

## 风险与考量（Trade-offs）
- 处理器按包串行调用（同一连接内），慢处理器会自然背压该连接；
- 本 crate 不提供命名实例、配置装载等宿主化能力，只覆盖"接受 →
  装配 → 分发"的最小闭环。
"#]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod dispatcher;

pub use dispatcher::{ChannelHandle, Server, ServerBuilder, ServerError};
