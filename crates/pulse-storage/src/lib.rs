//! # pulse-storage
//!
//! 로컬 저장소 어댑터.
//! 재시도를 소진한 배치를 용량 제한이 있는 디렉토리에 보관하고,
//! 서비스 토큰 쌍을 파일로 영속화한다.
//!
//! ## 모듈
//! - `overflow_store`: 오버플로 배치 저장소 (`OverflowStore` 구현)
//! - `token_store`: 자격증명 파일 저장소 (`TokenStore` 구현)

pub mod overflow_store;
pub mod token_store;
