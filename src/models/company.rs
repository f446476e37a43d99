use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub company_id: String,
    pub name: String,
    pub duration_minutes: i64,
}

impl Service {
    pub fn duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.duration_minutes)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub company_id: String,
    pub name: String,
    pub kind: ResourceKind,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Staff,
    Equipment,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Staff => "staff",
            ResourceKind::Equipment => "equipment",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "equipment" => ResourceKind::Equipment,
            _ => ResourceKind::Staff,
        }
    }
}
