use std::sync::Arc;

use arc_swap::ArcSwap;
use rustls::ServerConfig;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::TlsAcceptor as TokioTlsAcceptor;
use tokio_rustls::server::TlsStream;
use tracing::debug;

use flint_core::error::{ConnectError, ConnectStage};
use flint_core::transport::Transport;

use crate::error::TlsError;

/// 服务端 TLS 握手入口。
///
/// # 教案级注释
/// - **意图 (Why)**：接入层接受 TCP 连接后，在其上完成服务端握手并
///   产出加密流；配置以 [`ArcSwap`] 持有，证书轮换原子生效且不打扰
///   已建立的连接；
/// - **逻辑 (How)**：每次 `accept` 读取当前配置快照构造一次性
///   `tokio_rustls` 握手器，已在握手中的连接继续使用其快照；
/// - **契约 (What)**：
///   - `accept`：成功返回加密流；失败映射为 `TlsHandshake` 阶段的
///     [`ConnectError`]，由调用方决定记录或断开；
///   - `replace_config`：原子替换配置；
///   - `config_snapshot`：取当前配置的 `Arc` 副本；
/// - **风险 (Trade-offs)**：新配置的证书链/私钥是否有效由调用方
///   保证，非法配置会让后续握手持续失败。
#[derive(Clone, Debug)]
pub struct TlsAcceptor {
    config: Arc<ArcSwap<ServerConfig>>,
}

impl TlsAcceptor {
    /// 以初始配置创建握手入口。
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self {
            config: Arc::new(ArcSwap::new(config)),
        }
    }

    /// 以单证书链与私钥装配默认配置的便捷入口。
    pub fn from_single_cert(
        cert_chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
    ) -> Result<Self, TlsError> {
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let config = ServerConfig::builder_with_provider(provider)
            .with_protocol_versions(rustls::ALL_VERSIONS)?
            .with_no_client_auth()
            .with_single_cert(cert_chain, key)?;
        Ok(Self::new(Arc::new(config)))
    }

    /// 原子替换当前配置，通常用于证书热更新。
    pub fn replace_config(&self, config: Arc<ServerConfig>) {
        self.config.store(config);
    }

    /// 当前配置的快照。
    pub fn config_snapshot(&self) -> Arc<ServerConfig> {
        self.config.load_full()
    }

    /// 对一条已接受的传输执行服务端握手。
    pub async fn accept<IO>(&self, stream: IO) -> Result<TlsStream<IO>, ConnectError>
    where
        IO: Transport,
    {
        let acceptor = TokioTlsAcceptor::from(self.config.load_full());
        let stream = acceptor
            .accept(stream)
            .await
            .map_err(|err| ConnectError::io(ConnectStage::TlsHandshake, err))?;
        debug!(target: "flint::tls", "server-side tls handshake complete");
        Ok(stream)
    }
}
