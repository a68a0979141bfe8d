//! 静态模型目录
//!
//! `/v1/models` 返回的模型列表，可由配置覆盖。

use super::openai::{ModelList, ModelObject};

/// 默认对外暴露的模型
const DEFAULT_MODELS: &[&str] = &[
    "gpt-4o",
    "gpt-4o-mini",
    "gpt-4-turbo",
    "gpt-4-turbo-preview",
    "gpt-4-0125-preview",
    "gpt-4-vision-preview",
    "gpt-4",
    "gpt-3.5-turbo-0125",
    "gpt-3.5-turbo",
    "text-embedding-3-large",
    "text-embedding-3-small",
    "text-embedding-ada-002",
];

const OWNER: &str = "bridgecast";

#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: Vec<ModelObject>,
}

impl ModelCatalog {
    /// 以给定 id 列表构建目录，空列表时使用默认目录
    pub fn new(ids: &[String]) -> Self {
        let created = chrono::Utc::now().timestamp();
        let models = if ids.is_empty() {
            DEFAULT_MODELS
                .iter()
                .map(|id| Self::entry(id, created))
                .collect()
        } else {
            ids.iter().map(|id| Self::entry(id, created)).collect()
        };
        Self { models }
    }

    fn entry(id: &str, created: i64) -> ModelObject {
        ModelObject {
            id: id.to_string(),
            object: "model".to_string(),
            created,
            owned_by: OWNER.to_string(),
        }
    }

    pub fn list(&self) -> ModelList {
        ModelList {
            object: "list".to_string(),
            data: self.models.clone(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&ModelObject> {
        self.models.iter().find(|m| m.id == id)
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::new(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog() {
        let catalog = ModelCatalog::default();
        let list = catalog.list();
        assert_eq!(list.object, "list");
        assert_eq!(list.data.len(), DEFAULT_MODELS.len());
        assert!(catalog.get("gpt-4o").is_some());
        assert!(catalog.get("unknown").is_none());
    }

    #[test]
    fn test_configured_catalog_replaces_defaults() {
        let catalog = ModelCatalog::new(&["backend-large".to_string()]);
        assert_eq!(catalog.list().data.len(), 1);
        assert!(catalog.get("gpt-4o").is_none());
        assert_eq!(catalog.get("backend-large").unwrap().owned_by, "bridgecast");
    }
}
