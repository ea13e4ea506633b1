//! クライアント識別ユーティリティ
//!
//! IPv4-mapped IPv6アドレスの正規化と、監査イベント用のクライアント情報抽出

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

/// IPアドレスを正規化する
///
/// IPv4-mapped IPv6（::ffff:x.x.x.x）をIPv4に変換。
/// それ以外はそのまま返す。
pub fn normalize_ip(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                IpAddr::V4(v4)
            } else {
                IpAddr::V6(v6)
            }
        }
        v4 => v4,
    }
}

/// SocketAddrからIPアドレスを抽出し正規化する
pub fn normalize_socket_ip(addr: &SocketAddr) -> IpAddr {
    normalize_ip(addr.ip())
}

/// プロキシヘッダーから元のクライアントIPを取り出す
///
/// `X-Forwarded-For` の先頭要素、次に `X-Real-IP` を参照する。
pub fn forwarded_client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
        .filter(|s| !s.is_empty())
}

/// リクエスト元の情報（監査イベント用、ベストエフォート）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    /// 元のクライアントIP（プロキシヘッダー優先）
    pub ip: Option<String>,
    /// TCP接続元アドレス（X-Forwarded-For 追記用）
    pub peer: Option<IpAddr>,
    /// User-Agent
    pub user_agent: Option<String>,
}

impl ClientInfo {
    /// ヘッダーと接続元アドレスから組み立てる
    pub fn from_parts(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let peer = peer.as_ref().map(normalize_socket_ip);
        let ip = forwarded_client_ip(headers).or_else(|| peer.map(|p| p.to_string()));
        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Self {
            ip,
            peer,
            user_agent,
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self::from_parts(&parts.headers, peer))
    }
}
