use crate::Result;
use crate::config::config;
use crate::model::data::{
    AmoContact, AmoLead, AmoPipeline, AmoUser, ContactsEmbedded, LeadsEmbedded, Page,
    PipelinesEmbedded, UsersEmbedded,
};
use log::debug;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

// amoCRM rejects larger pages
const PAGE_LIMIT: usize = 250;

pub struct AmoClient {
    http: Client,
    base_url: String,
    token: String,
}

impl AmoClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> AmoClient {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        AmoClient {
            http: Client::new(),
            base_url,
            token: token.into(),
        }
    }

    pub fn from_config() -> AmoClient {
        AmoClient::new(&config().AMO_URL, &config().AMO_TOKEN)
    }

    pub async fn leads_created_since(&self, from: i64) -> Result<Vec<AmoLead>> {
        let request = self.get("/api/v4/leads").query(&[
            ("with", "contacts".to_string()),
            ("limit", PAGE_LIMIT.to_string()),
            ("filter[created_at][from]", from.to_string()),
        ]);
        let leads = self
            .fetch_all(request, |e: LeadsEmbedded| e.leads)
            .await?;
        debug!("fetched {} leads created since {}", leads.len(), from);
        Ok(leads)
    }

    pub async fn pipelines(&self) -> Result<Vec<AmoPipeline>> {
        let request = self.get("/api/v4/leads/pipelines");
        self.fetch_all(request, |e: PipelinesEmbedded| e.pipelines)
            .await
    }

    pub async fn users(&self) -> Result<Vec<AmoUser>> {
        let request = self
            .get("/api/v4/users")
            .query(&[("limit", PAGE_LIMIT.to_string())]);
        self.fetch_all(request, |e: UsersEmbedded| e.users).await
    }

    pub async fn contacts(&self, ids: &[u64]) -> Result<Vec<AmoContact>> {
        let mut contacts = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(PAGE_LIMIT) {
            let mut query: Vec<(&str, String)> =
                chunk.iter().map(|id| ("filter[id][]", id.to_string())).collect();
            query.push(("limit", PAGE_LIMIT.to_string()));
            let request = self.get("/api/v4/contacts").query(&query);
            contacts.extend(
                self.fetch_all(request, |e: ContactsEmbedded| e.contacts)
                    .await?,
            );
        }
        debug!("fetched {} of {} contacts", contacts.len(), ids.len());
        Ok(contacts)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.get_url(&format!("{}{}", self.base_url, path))
    }

    fn get_url(&self, url: &str) -> RequestBuilder {
        self.http
            .get(url)
            .header("Authorization", format!("Bearer {}", self.token))
    }

    /// Walks `_links.next` until the last page. 204 means an empty result.
    async fn fetch_all<E, T>(
        &self,
        first: RequestBuilder,
        pick: impl Fn(E) -> Vec<T>,
    ) -> Result<Vec<T>>
    where
        E: DeserializeOwned,
    {
        let mut items = Vec::new();
        let mut request = Some(first);

        while let Some(req) = request.take() {
            let response = req.send().await?.error_for_status()?;
            if response.status() == StatusCode::NO_CONTENT {
                break;
            }
            let page = response.json::<Page<E>>().await?;
            debug!("next: {:?}", page._links.next);

            request = page._links.next.map(|next| self.get_url(&next.href));
            items.extend(pick(page._embedded));
        }

        Ok(items)
    }
}
