use serde::{Deserialize, Serialize};
use super::BrokerId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Broker {
    pub id: BrokerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rack: Option<String>,
}

impl Broker {
    pub fn new(id: BrokerId) -> Self {
        Self { id, rack: None }
    }

    pub fn with_rack(id: BrokerId, rack: impl Into<String>) -> Self {
        Self {
            id,
            rack: Some(rack.into()),
        }
    }
}
