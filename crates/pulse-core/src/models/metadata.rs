//! 메타데이터 값.
//!
//! 레코드에 붙는 자유 형식 key/value. 닫힌 tagged union으로 표현하고
//! JSON과의 변환은 재귀적으로 직접 구현한다.

use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// 레코드 메타데이터 (키 정렬 유지)
pub type Metadata = BTreeMap<String, MetadataValue>;

/// 메타데이터 값
#[derive(Debug, Clone, Default, PartialEq)]
pub enum MetadataValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<MetadataValue>),
    Object(BTreeMap<String, MetadataValue>),
}

impl MetadataValue {
    /// 문자열 값이면 참조 반환
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// 숫자 값이면 f64로 반환
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Object이면 맵 참조 반환
    pub fn as_object(&self) -> Option<&BTreeMap<String, MetadataValue>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl Serialize for MetadataValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::String(s) => serializer.serialize_str(s),
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Object(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
        }
    }
}

struct MetadataValueVisitor;

impl<'de> Visitor<'de> for MetadataValueVisitor {
    type Value = MetadataValue;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("null, bool, 숫자, 문자열, 배열 또는 객체")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(MetadataValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(MetadataValue::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        MetadataValue::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(MetadataValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(MetadataValue::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        // i64 범위를 넘는 값은 정밀도를 잃더라도 Float로 보존
        Ok(i64::try_from(v)
            .map(MetadataValue::Int)
            .unwrap_or(MetadataValue::Float(v as f64)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(MetadataValue::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(MetadataValue::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(MetadataValue::String(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element::<MetadataValue>()? {
            items.push(item);
        }
        Ok(MetadataValue::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = BTreeMap::new();
        while let Some((key, value)) = access.next_entry::<String, MetadataValue>()? {
            map.insert(key, value);
        }
        Ok(MetadataValue::Object(map))
    }
}

impl<'de> Deserialize<'de> for MetadataValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MetadataValueVisitor)
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for MetadataValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for MetadataValue {
    fn from(v: u32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl<T: Into<MetadataValue>> From<Option<T>> for MetadataValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

impl<T: Into<MetadataValue>> From<Vec<T>> for MetadataValue {
    fn from(v: Vec<T>) -> Self {
        Self::Array(v.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, MetadataValue>> for MetadataValue {
    fn from(v: BTreeMap<String, MetadataValue>) -> Self {
        Self::Object(v)
    }
}

impl From<HashMap<String, MetadataValue>> for MetadataValue {
    fn from(v: HashMap<String, MetadataValue>) -> Self {
        Self::Object(v.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_object() -> MetadataValue {
        let mut inner = BTreeMap::new();
        inner.insert("depth".to_string(), MetadataValue::Int(2));
        inner.insert("tags".to_string(), MetadataValue::from(vec!["a", "b"]));

        let mut map = BTreeMap::new();
        map.insert("null".to_string(), MetadataValue::Null);
        map.insert("flag".to_string(), MetadataValue::Bool(true));
        map.insert("count".to_string(), MetadataValue::Int(-42));
        map.insert("ratio".to_string(), MetadataValue::Float(0.25));
        map.insert("name".to_string(), MetadataValue::from("pulse"));
        map.insert(
            "mixed".to_string(),
            MetadataValue::Array(vec![MetadataValue::Int(1), MetadataValue::Float(1.5)]),
        );
        map.insert("nested".to_string(), MetadataValue::Object(inner));
        MetadataValue::Object(map)
    }

    #[test]
    fn every_shape_survives_json() {
        let value = sample_object();
        let json = serde_json::to_string(&value).unwrap();
        let back: MetadataValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn whole_float_stays_float() {
        let json = serde_json::to_string(&MetadataValue::Float(3.0)).unwrap();
        assert_eq!(json, "3.0");
        let back: MetadataValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, MetadataValue::Float(3.0));
    }

    #[test]
    fn huge_unsigned_decodes_as_float() {
        let back: MetadataValue = serde_json::from_str("18446744073709551615").unwrap();
        assert!(matches!(back, MetadataValue::Float(_)));
        let small: MetadataValue = serde_json::from_str("7").unwrap();
        assert_eq!(small, MetadataValue::Int(7));
    }

    #[test]
    fn option_conversion() {
        assert!(MetadataValue::from(None::<&str>).is_null());
        assert_eq!(MetadataValue::from(Some("x")).as_str(), Some("x"));
        assert_eq!(MetadataValue::from(3_i32).as_f64(), Some(3.0));
    }
}
