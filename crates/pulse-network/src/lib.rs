//! # pulse-network
//!
//! 수집 서버와의 HTTP 통신 어댑터.
//! 앱 자격증명으로 서비스 토큰을 발급받고, 메트릭 배치를 Bearer 인증으로 전송한다.
//! 재시도 정책은 두지 않는다. 재시도는 `pulse-client`의 전송 엔진 몫이다.
//!
//! ## 사용 예시
//!
//! ```rust,ignore
//! use pulse_network::transport::HttpTransportFactory;
//! use pulse_core::ports::transport::TransportFactory;
//!
//! let transport = HttpTransportFactory.build(&config)?;
//! let credentials = transport.fetch_token().await?;
//! ```

pub mod auth;
pub mod http_client;
pub mod transport;
