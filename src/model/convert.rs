use crate::model::data::{AmoContact, AmoLead, AmoPipeline, AmoStatus, AmoUser, ContactRef};
use crate::model::lead::{Contact, Lead, Status};
use log::debug;
use chrono::SecondsFormat;
use sqlx::types::chrono::DateTime;
use std::collections::HashMap;

/// Lookup tables needed to turn amoCRM leads into [`Lead`]s.
pub struct Directory {
    // status ids 142/143 repeat in every pipeline
    statuses: HashMap<(u64, u64), AmoStatus>,
    users: HashMap<u64, String>,
    contacts: HashMap<u64, AmoContact>,
}

impl Directory {
    pub fn new(
        pipelines: Vec<AmoPipeline>,
        users: Vec<AmoUser>,
        contacts: Vec<AmoContact>,
    ) -> Directory {
        let statuses = pipelines
            .into_iter()
            .flat_map(|p| {
                let pipeline_id = p.id;
                p._embedded
                    .statuses
                    .into_iter()
                    .map(move |s| ((pipeline_id, s.id), s))
            })
            .collect();
        let users = users.into_iter().map(|u| (u.id, u.name)).collect();
        let contacts = contacts.into_iter().map(|c| (c.id, c)).collect();

        Directory {
            statuses,
            users,
            contacts,
        }
    }

    pub fn lead(&self, l: &AmoLead) -> Lead {
        Lead {
            key: l.id.to_string(),
            name: l.name.clone(),
            price: l
                .price
                .as_ref()
                .map(|p| p.to_string())
                .unwrap_or_else(|| "0".to_string()),
            status: self.status(l.pipeline_id, l.status_id),
            responsible: self
                .users
                .get(&l.responsible_user_id)
                .cloned()
                .unwrap_or_else(|| l.responsible_user_id.to_string()),
            created_at: format_timestamp(l.created_at),
            contacts: self.contacts(&l._embedded.contacts),
        }
    }

    fn status(&self, pipeline_id: u64, status_id: u64) -> Status {
        match self.statuses.get(&(pipeline_id, status_id)) {
            Some(s) => Status {
                id: s.id.to_string(),
                name: s.name.clone(),
                color: s.color.clone(),
            },
            None => Status {
                id: status_id.to_string(),
                name: status_id.to_string(),
                color: String::new(),
            },
        }
    }

    fn contacts(&self, refs: &[ContactRef]) -> Vec<Contact> {
        let mut refs: Vec<&ContactRef> = refs.iter().collect();
        refs.sort_by_key(|r| !r.is_main);

        refs.into_iter()
            .filter_map(|r| {
                let found = self.contacts.get(&r.id);
                if found.is_none() {
                    debug!("contact {} is not in the directory, skipped", r.id);
                }
                found
            })
            .map(|c| Contact {
                id: c.id.to_string(),
                name: c.name.clone(),
                phone: c.field("PHONE"),
                email: c.field("EMAIL"),
            })
            .collect()
    }
}

/// Unix seconds as RFC 3339 UTC, e.g. `2024-01-01T00:00:00Z`.
pub fn format_timestamp(secs: i64) -> String {
    match DateTime::from_timestamp(secs, 0) {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Secs, true),
        None => secs.to_string(),
    }
}
