use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// A deal as published to the chat and exported as JSON.
///
/// Field names are the wire names. `price` and `created_at` stay text.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Lead {
    pub key: String,
    pub name: String,
    pub price: String,
    pub status: Status,
    pub responsible: String,
    pub created_at: String,
    pub contacts: Vec<Contact>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub id: String,
    pub name: String,
    pub color: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Lead {
    pub fn from_json(raw: &str) -> Result<Lead> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// One line for digests.
    pub fn summary(&self) -> String {
        format!(
            "№{} {}, {} ({})",
            self.key, self.name, self.price, self.status.name
        )
    }

    /// Multi-line card for the chat.
    pub fn card(&self) -> String {
        let mut out = format!(
            "Сделка №{}: {}\nБюджет: {}\nСтатус: {}\nОтветственный: {}\nСоздана: {}\n",
            self.key, self.name, self.price, self.status.name, self.responsible, self.created_at
        );
        if self.contacts.is_empty() {
            out.push_str("Контакты: нет\n");
            return out;
        }
        out.push_str("Контакты:\n");
        for c in &self.contacts {
            let _ = write!(out, "- {}", c.name);
            if let Some(phone) = &c.phone {
                let _ = write!(out, ", тел. {}", phone);
            }
            if let Some(email) = &c.email {
                let _ = write!(out, ", {}", email);
            }
            out.push('\n');
        }
        out
    }
}
