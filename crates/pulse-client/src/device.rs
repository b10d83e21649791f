//! 디바이스 메타데이터.
//!
//! `include_device_info`가 켜져 있으면 모든 레코드의 `device` 키에 병합된다.

use pulse_core::models::metadata::MetadataValue;
use std::collections::BTreeMap;
use sysinfo::System;
use uuid::Uuid;

/// 디바이스 정보 (매니저당 한 번 수집)
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    /// 매니저 인스턴스별 식별자
    pub device_id: String,
    pub system_name: Option<String>,
    pub system_version: Option<String>,
    pub host_name: Option<String>,
    pub arch: String,
}

impl DeviceInfo {
    /// 현재 시스템에서 수집
    pub fn collect() -> Self {
        Self {
            device_id: Uuid::new_v4().to_string(),
            system_name: System::name(),
            system_version: System::os_version(),
            host_name: System::host_name(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }

    /// 메타데이터 객체로 변환 (값이 없는 항목은 생략)
    pub fn to_metadata(&self) -> MetadataValue {
        let mut map = BTreeMap::new();
        map.insert("device_id".to_string(), self.device_id.clone().into());
        map.insert("arch".to_string(), self.arch.clone().into());
        if let Some(name) = &self.system_name {
            map.insert("system_name".to_string(), name.clone().into());
        }
        if let Some(version) = &self.system_version {
            map.insert("system_version".to_string(), version.clone().into());
        }
        if let Some(host) = &self.host_name {
            map.insert("host_name".to_string(), host.clone().into());
        }
        MetadataValue::Object(map)
    }
}
