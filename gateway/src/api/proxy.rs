//! ArgoCD APIへの転送
//!
//! 透過モードはレスポンスをストリーミングで返す。キャプチャモードは上流レスポンスを
//! `CapturedResponse` としてメモリに取り込み、監査判定の後に同じステータス・ヘッダー・
//! ボディで返す。どちらのモードも同じ送信処理とヘッダーコピーを通る。

use super::error::AppError;
use crate::common::error::{CommonError, GatewayError};
use crate::common::ip::ClientInfo;
use crate::AppState;
use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use futures::TryStreamExt;
use std::{io, time::Duration};
use tracing::{debug, warn};

/// 転送時に落とすホップバイホップヘッダー
const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// 転送するリクエストボディの上限
const MAX_REQUEST_BODY_BYTES: usize = 32 * 1024 * 1024;

fn is_hop_by_hop(name: &HeaderName, connection_tokens: &[String]) -> bool {
    let name = name.as_str();
    HOP_BY_HOP_HEADERS.contains(&name) || connection_tokens.iter().any(|t| t == name)
}

fn connection_tokens(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// 上流レスポンスのヘッダーをコピーする（同名ヘッダーは全て保持）
pub fn copy_response_headers(source: &HeaderMap, target: &mut HeaderMap) {
    let tokens = connection_tokens(source);
    for (name, value) in source.iter() {
        if !is_hop_by_hop(name, &tokens) {
            target.append(name.clone(), value.clone());
        }
    }
}

fn upstream_request_headers(source: &HeaderMap, client: &ClientInfo) -> HeaderMap {
    let tokens = connection_tokens(source);
    let mut headers = HeaderMap::with_capacity(source.len() + 1);
    for (name, value) in source.iter() {
        if is_hop_by_hop(name, &tokens)
            || *name == header::HOST
            || *name == header::CONTENT_LENGTH
            || name.as_str() == "x-forwarded-for"
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    let prior = source
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect::<Vec<_>>()
        .join(", ");
    let forwarded = match (prior.is_empty(), client.peer) {
        (true, Some(peer)) => Some(peer.to_string()),
        (false, Some(peer)) => Some(format!("{prior}, {peer}")),
        (false, None) => Some(prior),
        (true, None) => None,
    };
    if let Some(value) = forwarded.and_then(|v| HeaderValue::from_str(&v).ok()) {
        headers.insert("x-forwarded-for", value);
    }
    headers
}

/// リクエストボディを全て読み込む
pub async fn read_body(body: Body) -> Result<Bytes, GatewayError> {
    axum::body::to_bytes(body, MAX_REQUEST_BODY_BYTES)
        .await
        .map_err(|e| {
            GatewayError::Common(CommonError::Validation(format!(
                "failed to read request body: {e}"
            )))
        })
}

/// キャプチャモードで取り込んだ上流レスポンス
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    /// 上流のステータス
    pub status: StatusCode,
    /// 上流のヘッダー（ホップバイホップ除外済み）
    pub headers: HeaderMap,
    /// 上流のボディ
    pub body: Bytes,
}

impl CapturedResponse {
    /// 監査上の成功判定（200のみ成功）
    pub fn is_success(&self) -> bool {
        self.status == StatusCode::OK
    }
}

impl IntoResponse for CapturedResponse {
    /// 上流が長さを示さなかった（チャンク転送の）場合は、透過モードと同じく
    /// 長さ不明のボディとして返し `content-length` を付けない。
    fn into_response(self) -> Response {
        let body = if self.headers.contains_key(header::CONTENT_LENGTH) {
            Body::from(self.body)
        } else {
            let chunk = self.body;
            Body::from_stream(futures::stream::once(async move {
                Ok::<_, io::Error>(chunk)
            }))
        };
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// 上流ArgoCDへの転送クライアント
#[derive(Clone)]
pub struct UpstreamProxy {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl UpstreamProxy {
    /// 転送先と期限を指定して作る
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| GatewayError::Internal(format!("failed to build HTTP client: {e}")))?;
        Self::with_client(client, base_url, timeout)
    }

    /// 既存のHTTPクライアントを使う
    pub fn with_client(
        client: reqwest::Client,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let parsed = reqwest::Url::parse(base_url).map_err(|e| {
            GatewayError::Common(CommonError::Config(format!(
                "invalid upstream URL '{base_url}': {e}"
            )))
        })?;
        if parsed.host_str().is_none() {
            return Err(GatewayError::Common(CommonError::Config(format!(
                "upstream URL '{base_url}' has no host"
            ))));
        }
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// 転送先のベースURL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// 上流へ送信する。`whole_exchange` ならボディ受信まで期限をかける
    async fn send(
        &self,
        parts: &Parts,
        body: Bytes,
        client: &ClientInfo,
        whole_exchange: bool,
    ) -> Result<reqwest::Response, GatewayError> {
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = format!("{}{}", self.base_url, path_and_query);

        let mut request = self
            .client
            .request(parts.method.clone(), &url)
            .headers(upstream_request_headers(&parts.headers, client));
        if whole_exchange {
            request = request.timeout(self.timeout);
        }
        if !body.is_empty() {
            request = request.body(body);
        }

        debug!(method = %parts.method, path = %parts.uri.path(), "forwarding to upstream");
        match tokio::time::timeout(self.timeout, request.send()).await {
            Ok(result) => result.map_err(|e| map_send_error(&url, e)),
            Err(_) => {
                warn!(url = %url, "upstream did not answer before the deadline");
                Err(GatewayError::Timeout(format!(
                    "upstream {url} did not answer within {:?}",
                    self.timeout
                )))
            }
        }
    }

    /// 透過モード: 上流レスポンスをそのままストリーミングで返す
    ///
    /// 期限はレスポンスヘッダー受信までで、SSEやログ追従などの長時間ボディは打ち切らない。
    pub async fn forward(
        &self,
        parts: &Parts,
        body: Bytes,
        client: &ClientInfo,
    ) -> Result<Response, GatewayError> {
        let upstream = self.send(parts, body, client, false).await?;
        let status = upstream.status();
        let mut response = Response::new(Body::empty());
        *response.status_mut() = status;
        copy_response_headers(upstream.headers(), response.headers_mut());

        let stream = upstream.bytes_stream().map_err(io::Error::other);
        *response.body_mut() = Body::from_stream(stream);
        Ok(response)
    }

    /// キャプチャモード: 上流レスポンスを全て読み込んで値として返す
    pub async fn capture(
        &self,
        parts: &Parts,
        body: Bytes,
        client: &ClientInfo,
    ) -> Result<CapturedResponse, GatewayError> {
        let upstream = self.send(parts, body, client, true).await?;
        let status = upstream.status();
        let mut headers = HeaderMap::new();
        copy_response_headers(upstream.headers(), &mut headers);
        let body = upstream.bytes().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout(format!("reading upstream response: {e}"))
            } else {
                GatewayError::Upstream(format!("reading upstream response: {e}"))
            }
        })?;

        Ok(CapturedResponse {
            status,
            headers,
            body,
        })
    }
}

fn map_send_error(url: &str, err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        warn!(url, "upstream request timed out");
        GatewayError::Timeout(format!("upstream {url} timed out: {err}"))
    } else {
        warn!(url, error = %err, "upstream request failed");
        GatewayError::Upstream(format!("upstream {url} failed: {err}"))
    }
}

/// 透過転送ハンドラー
pub async fn forward(
    State(state): State<AppState>,
    client: ClientInfo,
    request: Request,
) -> Result<Response, AppError> {
    let (parts, body) = request.into_parts();
    let body = read_body(body).await?;
    Ok(state.proxy.forward(&parts, body, &client).await?)
}
