//! Pulse 도메인 모델.
//!
//! 애플리케이션 → 버퍼 → 전송 엔진 → 서버/오버플로 저장소로 흐르는 데이터 구조체.
//! 와이어 포맷에 쓰이는 모델은 모두 `serde` Serialize/Deserialize를 구현한다.

pub mod batch;
pub mod credentials;
pub mod metadata;
pub mod metric;
