#![doc = r#"
# flint-transport-tls

## 设计动机（Why）
- **安全入口**：在连接器链的装饰点插入 TLS，客户端建连与服务端接入
  都在 TCP 传输之上叠加加密层，通道引擎对此完全无感；
- **策略外置**：证书校验是调用方提供的策略而非机制，可注入自定义
  校验器，测试/信任链外场景可显式选择全信任校验器；
- **热更新**：服务端配置依托 `ArcSwap` 原子替换，证书轮换不中断已
  建立的连接。

## 核心契约（What）
- [`TlsConnector`]：装饰任意内层连接器，内层产出传输后执行客户端
  握手，失败归入 `TlsHandshake` 阶段；
- [`TlsAcceptor`]：对已接受的传输执行服务端握手；
- [`TlsClientOptions`]：目标主机名（SNI）、启用的协议版本与信任
  策略的构造期配置面；
- [`AcceptAnyServerCert`]：全信任校验器，仅用于测试与显式信任场景。

## 实现策略（How）
- `rustls` + `tokio-rustls` 完成异步握手与加解密；
- 客户端配置在连接器构造期一次性装配完成，建连路径零配置开销；
- 端点文本中的主机部分作为 SNI 回退，显式 `target_host` 优先。

## 风险与考量（Trade-offs）
- 全信任校验器绕过全部证书验证，除测试外启用等同放弃中间人防护；
- 版本列表为空或信任策略缺失在构造期即失败，不会拖到握手时才暴露。
"#]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod acceptor;
mod connector;
mod error;
mod verifier;

pub use acceptor::TlsAcceptor;
pub use connector::{TlsClientOptions, TlsConnector};
pub use error::TlsError;
pub use verifier::AcceptAnyServerCert;
