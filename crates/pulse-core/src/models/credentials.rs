//! 자격증명 쌍.
//!
//! 서비스 토큰 + 리프레시 토큰. 동시에 하나만 살아 있으며
//! 401 응답 시 서비스 토큰만 지워 다음 전송에서 재발급을 유도한다.

use serde::{Deserialize, Serialize};

/// 서비스 토큰 쌍 (`tokens.json` 형식과 동일)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    /// 수집 엔드포인트용 단기 토큰
    #[serde(default)]
    pub service_token: Option<String>,
    /// 리프레시 토큰
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl CredentialPair {
    pub fn new(service_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            service_token: Some(service_token.into()),
            refresh_token: Some(refresh_token.into()),
        }
    }

    /// 살아 있는 서비스 토큰
    pub fn service_token(&self) -> Option<&str> {
        self.service_token.as_deref().filter(|t| !t.is_empty())
    }

    /// 서비스 토큰 무효화 (리프레시 토큰은 유지)
    pub fn invalidate(&mut self) {
        self.service_token = None;
    }

    pub fn is_live(&self) -> bool {
        self.service_token().is_some()
    }
}
