use std::collections::BTreeMap;

use serde::Serialize;

use crate::api::capacity_dto::QueueDto;
use crate::domain::utils::id::QueueName;

/// A resource manager queue. Its attributes are passed through untouched.
#[derive(Debug, Clone, Serialize)]
pub struct Queue {
    pub name: QueueName,
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl Queue {
    pub fn from_dto(name: &str, dto: QueueDto) -> Self {
        Queue { name: QueueName::new(name), attributes: dto.attributes }
    }

    pub fn attribute(&self, key: &str) -> Option<&serde_json::Value> {
        self.attributes.get(key)
    }
}
