//! # pulse-core
//!
//! Pulse 도메인 모델, 포트(trait) 정의, 설정, 에러 타입.
//! 파이프라인의 모든 crate가 공유하는 핵심 타입과 인터페이스를 제공한다.
//!
//! ## 구조
//!
//! - [`models`]: 메트릭 레코드, 메타데이터 값, 배치, 자격증명 (serde)
//! - [`ports`]: 전송/저장소 포트 인터페이스 (async_trait)
//! - [`error`]: 핵심 에러 타입 (thiserror)
//! - [`config`]: 파이프라인 설정 구조체
//! - [`config_manager`]: 설정 파일 관리 (로드/저장)
//! - [`log_level`]: 로그 레벨 스위치

pub mod config;
pub mod config_manager;
pub mod error;
pub mod log_level;
pub mod models;
pub mod ports;
