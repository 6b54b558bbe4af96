use thiserror::Error;

/// TLS 层构造期的错误域。
///
/// 握手期失败不在此列：握手错误统一映射为
/// [`ConnectError`](flint_core::error::ConnectError) 的 `TlsHandshake`
/// 阶段，随连接器链向上传播。
#[derive(Debug, Error)]
pub enum TlsError {
    /// `rustls` 拒绝了给定的配置（版本组合、证书链或私钥非法）。
    #[error("tls configuration rejected: {0}")]
    Config(#[from] rustls::Error),
    /// 未提供任何信任策略：信任锚、自定义校验器或显式全信任三选一。
    #[error("no trust policy configured: provide trust anchors, a verifier, or opt into trust-all")]
    MissingTrustPolicy,
    /// 启用的协议版本列表为空。
    #[error("enabled protocol version list is empty")]
    NoProtocolVersions,
}
