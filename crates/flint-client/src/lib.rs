#![doc = r#"
# flint-client

## 设计动机（Why）
- **定位**：把连接器链、管道过滤器与通道组合在一个简洁门面后面，
  覆盖"单条逻辑连接"的典型客户端用法：连接、发送、逐包接收、关闭；
- **装饰点**：安全变体不是并行实现——只是把 TLS 装饰级插到 TCP
  基础级之前，其余路径与明文客户端逐字相同。

## 核心契约（What）
- [`EasyClient::connect`]：运行连接器链并装配通道，失败携带链中
  出错层级；
- [`EasyClient::receive`]：挂起直到下一个包到达；对端优雅关闭返回
  `Ok(None)`，带错终止返回 `Err` 且携带根因；
- [`EasyClient::detach`]：交还活的传输（含未消费字节），此后客户端
  上的收发一律被拒绝。

## 风险与考量（Trade-offs）
- 门面覆盖一条逻辑连接的生命周期，关闭后不支持原地重连；重建门面
  即可，连接器链本身无状态可复用。
"#]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;

pub use client::{ClientError, EasyClient};
