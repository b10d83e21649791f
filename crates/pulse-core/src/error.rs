//! Pulse 핵심 에러 타입.
//!
//! 토큰 획득, 배치 전송, 로컬 저장소의 실패를 하나의 분류로 표현한다.
//! 전송 계열 에러는 재시도 상태 머신이 흡수하고, 호출자에게는 로그로만 드러난다.

use thiserror::Error;

/// 파이프라인 공통 에러.
#[derive(Debug, Error)]
pub enum PulseError {
    /// configure 이전에 호출됨
    #[error("설정 없음: configure()가 먼저 호출되어야 합니다")]
    ConfigurationMissing,

    /// 설정값 오류
    #[error("설정 에러: {0}")]
    Config(String),

    /// 네트워크 계층 실패 (연결 실패, 타임아웃)
    #[error("전송 에러: {0}")]
    Transport(String),

    /// 2xx 이외의 서버 응답
    #[error("서버 에러 ({status}): {body}")]
    Server {
        /// HTTP 상태 코드
        status: u16,
        /// 응답 본문 (진단용)
        body: String,
    },

    /// 401: 서비스 토큰 무효
    #[error("인증 에러: 서비스 토큰이 거부되었습니다")]
    Unauthorized,

    /// 응답/저장 파일 파싱 실패
    #[error("디코딩 에러: {0}")]
    Decoding(String),

    /// 배치 직렬화 실패
    #[error("인코딩 에러: {0}")]
    Encoding(String),

    /// 저장/축출 중 파일 시스템 실패
    #[error("저장소 에러: {0}")]
    Storage(String),

    /// JSON 직렬화/역직렬화 실패
    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O 에러
    #[error("I/O 에러: {0}")]
    Io(#[from] std::io::Error),

    /// 매니저 액터가 종료됨
    #[error("매니저 채널 닫힘")]
    ChannelClosed,
}

impl PulseError {
    /// 상태 코드로부터 에러 분류 (401은 별도 variant)
    pub fn from_status(status: u16, body: String) -> Self {
        if status == 401 {
            Self::Unauthorized
        } else {
            Self::Server { status, body }
        }
    }

    /// 서비스 토큰 무효화가 필요한 에러인지
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}
