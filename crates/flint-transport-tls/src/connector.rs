use std::sync::Arc;

use async_trait::async_trait;
use rustls::client::danger::ServerCertVerifier;
use rustls::{ClientConfig, RootCertStore, SupportedProtocolVersion};
use rustls_pki_types::ServerName;
use tokio_rustls::TlsConnector as TokioTlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::debug;

use flint_core::connector::Connector;
use flint_core::error::{ConnectError, ConnectStage};
use flint_core::transport::{Connected, Transport};

use crate::error::TlsError;
use crate::verifier::AcceptAnyServerCert;

/// 客户端 TLS 的构造期配置面。
///
/// # 教案式说明
/// - **意图 (Why)**：把"握手怎么做"的全部策略集中到一个值对象：
///   SNI 主机名、启用的协议版本与证书信任策略，连接器构造时一次性
///   固化为 `ClientConfig`；
/// - **契约 (What)**：
///   - `target_host` 缺省时回退为端点文本的主机部分；
///   - 版本列表缺省为 TLS1.3 + TLS1.2；显式传空列表构造期报错；
///   - 信任策略三选一：信任锚、自定义校验器或显式全信任，一个都不
///     给则构造期报 [`TlsError::MissingTrustPolicy`]；
/// - **风险 (Trade-offs)**：策略固化在构造期意味着运行期不可变，
///   需要轮换信任配置的客户端应重建连接器。
pub struct TlsClientOptions {
    target_host: Option<String>,
    enabled_versions: Vec<&'static SupportedProtocolVersion>,
    trust: TrustPolicy,
}

enum TrustPolicy {
    Unset,
    Anchors(RootCertStore),
    Verifier(Arc<dyn ServerCertVerifier>),
    TrustAll,
}

impl TlsClientOptions {
    /// 创建空白配置：版本取默认组合，信任策略待定。
    pub fn new() -> Self {
        Self {
            target_host: None,
            enabled_versions: vec![&rustls::version::TLS13, &rustls::version::TLS12],
            trust: TrustPolicy::Unset,
        }
    }

    /// 指定证书校验所用的目标主机名（SNI）。
    pub fn with_target_host(mut self, host: impl Into<String>) -> Self {
        self.target_host = Some(host.into());
        self
    }

    /// 覆盖启用的协议版本集合。
    pub fn with_enabled_versions(
        mut self,
        versions: Vec<&'static SupportedProtocolVersion>,
    ) -> Self {
        self.enabled_versions = versions;
        self
    }

    /// 以信任锚集合做标准证书链校验。
    pub fn with_trust_anchors(mut self, roots: RootCertStore) -> Self {
        self.trust = TrustPolicy::Anchors(roots);
        self
    }

    /// 注入调用方自备的证书校验器，整体替换校验策略。
    pub fn with_certificate_verifier(mut self, verifier: Arc<dyn ServerCertVerifier>) -> Self {
        self.trust = TrustPolicy::Verifier(verifier);
        self
    }

    /// 显式选择全信任校验（测试/信任链外场景）。
    pub fn trust_all(mut self) -> Self {
        self.trust = TrustPolicy::TrustAll;
        self
    }

    fn into_config(self) -> Result<(Arc<ClientConfig>, Option<String>), TlsError> {
        if self.enabled_versions.is_empty() {
            return Err(TlsError::NoProtocolVersions);
        }
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let builder = ClientConfig::builder_with_provider(provider)
            .with_protocol_versions(&self.enabled_versions)?;
        let config = match self.trust {
            TrustPolicy::Unset => return Err(TlsError::MissingTrustPolicy),
            TrustPolicy::Anchors(roots) => builder
                .with_root_certificates(roots)
                .with_no_client_auth(),
            TrustPolicy::Verifier(verifier) => builder
                .dangerous()
                .with_custom_certificate_verifier(verifier)
                .with_no_client_auth(),
            TrustPolicy::TrustAll => builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert::new()))
                .with_no_client_auth(),
        };
        Ok((Arc::new(config), self.target_host))
    }
}

impl Default for TlsClientOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// 连接器链的 TLS 装饰级：内层建连，本级握手。
///
/// # 教案式说明
/// - **意图 (Why)**：以装饰（而非并行实现）接入安全层——内层连接器
///   产出什么传输，本级就在其上握手并产出加密流，链上其余层级与
///   通道引擎不感知差异；
/// - **逻辑 (How)**：
///   1. 原样转发端点给内层，拿到已建连的传输与端点元数据；
///   2. 取显式 `target_host` 或端点主机部分作为 SNI 执行握手；
///   3. 地址元数据透传，失败归入 `TlsHandshake` 阶段；
/// - **契约 (What)**：`Output` 为内层传输的 TLS 包装流；本级自身
///   无状态，可跨连接尝试复用；
/// - **前置条件**：配置在 [`new`](Self::new) 中构造成功。
pub struct TlsConnector<C> {
    inner: C,
    config: Arc<ClientConfig>,
    target_host: Option<String>,
}

impl<C> TlsConnector<C> {
    /// 以内层连接器与客户端配置装配装饰级。
    pub fn new(inner: C, options: TlsClientOptions) -> Result<Self, TlsError> {
        let (config, target_host) = options.into_config()?;
        Ok(Self {
            inner,
            config,
            target_host,
        })
    }

    /// 直接复用已构造好的 `ClientConfig`。
    pub fn with_config(inner: C, config: Arc<ClientConfig>, target_host: Option<String>) -> Self {
        Self {
            inner,
            config,
            target_host,
        }
    }
}

/// 从 `host:port` 端点文本中剥出主机部分，容忍 IPv6 方括号。
fn host_portion(endpoint: &str) -> &str {
    let host = match endpoint.rsplit_once(':') {
        Some((host, _port)) => host,
        None => endpoint,
    };
    host.trim_start_matches('[').trim_end_matches(']')
}

#[async_trait]
impl<C> Connector for TlsConnector<C>
where
    C: Connector,
{
    type Output = TlsStream<C::Output>;

    async fn connect(&self, endpoint: &str) -> Result<Connected<Self::Output>, ConnectError> {
        let connected = self.inner.connect(endpoint).await?;
        let host = match &self.target_host {
            Some(host) => host.clone(),
            None => host_portion(endpoint).to_owned(),
        };
        let server_name = ServerName::try_from(host.clone()).map_err(|err| {
            ConnectError::new(
                ConnectStage::TlsHandshake,
                format!("invalid tls server name `{host}`"),
            )
            .with_source(err)
        })?;
        let handshake = TokioTlsConnector::from(Arc::clone(&self.config));
        let stream = handshake
            .connect(server_name, connected.stream)
            .await
            .map_err(|err| ConnectError::io(ConnectStage::TlsHandshake, err))?;
        debug!(
            target: "flint::tls",
            peer = %connected.peer_addr,
            sni = %host,
            "tls handshake complete",
        );
        Ok(Connected {
            stream,
            local_addr: connected.local_addr,
            peer_addr: connected.peer_addr,
        })
    }
}

#[allow(dead_code)]
fn _assert_decoration_composes<C>()
where
    C: Connector,
    TlsConnector<C>: Connector,
    C::Output: Transport,
{
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_portion_strips_port_and_brackets() {
        assert_eq!(host_portion("example.test:4040"), "example.test");
        assert_eq!(host_portion("127.0.0.1:9000"), "127.0.0.1");
        assert_eq!(host_portion("[::1]:9000"), "::1");
        assert_eq!(host_portion("bare-host"), "bare-host");
    }

    #[test]
    fn missing_trust_policy_fails_at_construction() {
        let err = TlsClientOptions::new()
            .into_config()
            .expect_err("trust policy is mandatory");
        assert!(matches!(err, TlsError::MissingTrustPolicy));
    }

    #[test]
    fn empty_version_list_fails_at_construction() {
        let err = TlsClientOptions::new()
            .trust_all()
            .with_enabled_versions(Vec::new())
            .into_config()
            .expect_err("versions must not be empty");
        assert!(matches!(err, TlsError::NoProtocolVersions));
    }

    #[test]
    fn trust_all_options_build_a_client_config() {
        let (config, target_host) = TlsClientOptions::new()
            .trust_all()
            .with_target_host("localhost")
            .into_config()
            .expect("config builds");
        assert_eq!(target_host.as_deref(), Some("localhost"));
        drop(config);
    }
}
