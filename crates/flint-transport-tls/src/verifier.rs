use rustls::DigitallySignedStruct;
use rustls::SignatureScheme;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::WebPkiSupportedAlgorithms;
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};

/// 接受任意服务端证书的校验器。
///
/// # 教案式说明
/// - **意图 (Why)**：测试环境与显式信任场景需要"校验策略可被调用方
///   整体替换"的逃生门；本类型即该策略面的极端取值：证书一律放行；
/// - **契约 (What)**：证书链、主机名与有效期全部不检查；签名校验仍
///   按真实算法执行，保证握手密码学上成立；
/// - **风险 (Trade-offs)**：放行一切证书即放弃中间人防护，生产路径
///   应注入真实校验器或信任锚。
#[derive(Debug)]
pub struct AcceptAnyServerCert {
    supported: WebPkiSupportedAlgorithms,
}

impl AcceptAnyServerCert {
    /// 以默认密码学提供者的签名算法集构造校验器。
    pub fn new() -> Self {
        Self {
            supported: rustls::crypto::aws_lc_rs::default_provider()
                .signature_verification_algorithms,
        }
    }
}

impl Default for AcceptAnyServerCert {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.supported)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.supported)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.supported.supported_schemes()
    }
}
