//! 서비스 토큰 발급.
//!
//! 앱의 장기 자격증명을 단기 서비스 토큰으로 교환한다. 재시도는 하지 않는다.

use pulse_core::error::PulseError;
use pulse_core::models::credentials::CredentialPair;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::debug;

/// 서버 응답: 토큰 발급
#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
    refresh_token: String,
}

/// 토큰 발급기: GET <token_url>, Bearer <app credential>
#[derive(Clone)]
pub struct TokenFetcher {
    client: reqwest::Client,
    token_url: String,
    app_credential: String,
}

impl TokenFetcher {
    /// 새 토큰 발급기 생성
    pub fn new(client: reqwest::Client, token_url: &str, app_credential: &str) -> Self {
        Self {
            client,
            token_url: token_url.to_string(),
            app_credential: app_credential.to_string(),
        }
    }

    /// 토큰 발급 요청 1회
    ///
    /// - 전송 실패 → `Transport`
    /// - 2xx 이외 → `Server { status }` (401은 `Unauthorized`)
    /// - 본문 파싱 실패 → `Decoding`
    pub async fn fetch(&self) -> Result<CredentialPair, PulseError> {
        let resp = self
            .client
            .get(&self.token_url)
            .bearer_auth(&self.app_credential)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| PulseError::Transport(format!("토큰 발급 요청 실패: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(PulseError::from_status(status.as_u16(), text));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| PulseError::Transport(format!("토큰 응답 수신 실패: {e}")))?;

        let token_resp: TokenResponse = serde_json::from_slice(&body)
            .map_err(|e| PulseError::Decoding(format!("토큰 파싱 실패: {e}")))?;

        debug!("서비스 토큰 발급 성공");
        Ok(CredentialPair::new(
            token_resp.token,
            token_resp.refresh_token,
        ))
    }

    /// 토큰 발급 URL
    pub fn token_url(&self) -> &str {
        &self.token_url
    }
}
