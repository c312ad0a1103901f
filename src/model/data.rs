use serde::Deserialize;
use std::fmt::{Display, Formatter};

// amoCRM v4 responses: `_links` / `_embedded` envelopes.

#[derive(Deserialize, Debug, Clone)]
pub struct Page<E> {
    #[serde(default)]
    pub _links: Links,
    pub _embedded: E,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Links {
    pub next: Option<Link>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Link {
    pub href: String,
}

// -- Leads

#[derive(Deserialize, Debug, Clone)]
pub struct LeadsEmbedded {
    pub leads: Vec<AmoLead>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AmoLead {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub price: Option<Scalar>,
    pub status_id: u64,
    pub pipeline_id: u64,
    pub responsible_user_id: u64,
    pub created_at: i64,
    #[serde(default)]
    pub _embedded: LeadEmbedded,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct LeadEmbedded {
    #[serde(default)]
    pub contacts: Vec<ContactRef>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ContactRef {
    pub id: u64,
    #[serde(default)]
    pub is_main: bool,
}

// -- Pipelines and statuses

#[derive(Deserialize, Debug, Clone)]
pub struct PipelinesEmbedded {
    pub pipelines: Vec<AmoPipeline>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AmoPipeline {
    pub id: u64,
    pub _embedded: StatusesEmbedded,
}

#[derive(Deserialize, Debug, Clone)]
pub struct StatusesEmbedded {
    pub statuses: Vec<AmoStatus>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AmoStatus {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub color: String,
}

// -- Users

#[derive(Deserialize, Debug, Clone)]
pub struct UsersEmbedded {
    pub users: Vec<AmoUser>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AmoUser {
    pub id: u64,
    pub name: String,
}

// -- Contacts

#[derive(Deserialize, Debug, Clone)]
pub struct ContactsEmbedded {
    pub contacts: Vec<AmoContact>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AmoContact {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub custom_fields_values: Option<Vec<CustomField>>,
}

impl AmoContact {
    /// First non-empty value of the field with the given `field_code`.
    pub fn field(&self, code: &str) -> Option<String> {
        self.custom_fields_values
            .iter()
            .flatten()
            .filter(|f| f.field_code.as_deref() == Some(code))
            .flat_map(|f| f.values.iter())
            .map(|v| v.value.to_string())
            .find(|v| !v.trim().is_empty())
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct CustomField {
    #[serde(default)]
    pub field_code: Option<String>,
    pub values: Vec<FieldValue>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct FieldValue {
    pub value: Scalar,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum Scalar {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Display for Scalar {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Str(s) => write!(f, "{}", s),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Bool(b) => write!(f, "{}", b),
        }
    }
}
