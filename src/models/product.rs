//! 商品提取请求与结果

use std::collections::BTreeMap;
use std::fmt::Display;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// 请求键
///
/// 由标识符确定性地派生：对规范化后的标识符做 SHA-256，输出 64 位十六进制。
/// 定长、只含 `[0-9a-f]`，可以直接用作文件名或存储键，并且跨进程重启稳定。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn derive(identifier: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(canonical_identifier(identifier).as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 标识符规范化：去掉首尾空白
fn canonical_identifier(identifier: &str) -> &str {
    identifier.trim()
}

/// 提取请求（创建后不可变）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    key: RequestKey,
    identifier: String,
}

impl ExtractionRequest {
    pub fn new(identifier: impl Into<String>) -> Self {
        let identifier = identifier.into();
        let identifier = canonical_identifier(&identifier).to_string();
        Self {
            key: RequestKey::derive(&identifier),
            identifier,
        }
    }

    pub fn key(&self) -> &RequestKey {
        &self.key
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl Display for ExtractionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.identifier)
    }
}

/// 商品详情（Renderer 的输出）
///
/// 别名兼容旧系统导出的西班牙语字段名
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    #[serde(alias = "titulo")]
    pub title: Option<String>,
    #[serde(default, alias = "categorias")]
    pub categories: Vec<String>,
    #[serde(alias = "descripcion")]
    pub description: Option<String>,
    #[serde(default, alias = "imagenes")]
    pub images: Vec<String>,
    #[serde(default, alias = "etiquetas")]
    pub tag: String,
    /// 规格分组 → (规格名 → 值)
    #[serde(default, alias = "especificaciones_tecnicas")]
    pub technical_specs: BTreeMap<String, BTreeMap<String, String>>,
    /// 保修及附加信息
    #[serde(default, alias = "garantia_e_informacion_adicional")]
    pub warranty_info: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_key_is_fixed_width_and_stable() {
        let a = RequestKey::derive("https://example.com/p?id=1");
        let b = RequestKey::derive("  https://example.com/p?id=1 \n");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, RequestKey::derive("https://example.com/p?id=2"));
    }

    #[test]
    fn request_trims_identifier() {
        let request = ExtractionRequest::new(" SKU-42 ");
        assert_eq!(request.identifier(), "SKU-42");
        assert_eq!(request.key(), &RequestKey::derive("SKU-42"));
    }

    #[test]
    fn legacy_field_names_are_accepted() {
        let json = r#"{
            "titulo": "Monitor",
            "categorias": ["Pantallas"],
            "descripcion": null,
            "imagenes": [],
            "etiquetas": "ingram",
            "especificaciones_tecnicas": {"General": {"Peso": "3 kg"}},
            "garantia_e_informacion_adicional": {"Garantía": "1"}
        }"#;
        let result: ExtractionResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.title.as_deref(), Some("Monitor"));
        assert_eq!(result.technical_specs["General"]["Peso"], "3 kg");
        assert_eq!(result.tag, "ingram");
    }
}
