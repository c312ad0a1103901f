use crate::Result;
use crate::amo::AmoClient;
use crate::config::config;
use crate::model::Db;
use crate::model::convert::Directory;
use crate::model::lead::Lead;
use crate::model::store::digest;
use log::{debug, error, info};
use sqlx::types::chrono::Utc;
use std::collections::HashSet;
use tokio::sync::Mutex;

// the cron worker and /sync share one account and one database
static SYNC_LOCK: Mutex<()> = Mutex::const_new(());

#[derive(Debug, Default)]
pub struct SyncReport {
    /// Saved leads not yet delivered to the chat, this run's or an earlier one's.
    pub new_leads: Vec<Lead>,
    pub updated: usize,
}

impl SyncReport {
    pub fn has_new(&self) -> bool {
        !self.new_leads.is_empty()
    }

    pub fn message(&self) -> String {
        if self.has_new() {
            return digest("Новые сделки:", &self.new_leads);
        }
        if self.updated > 0 {
            format!("Новых сделок не найдено, обновлено: {}", self.updated)
        } else {
            "Новых сделок не найдено".to_string()
        }
    }

    fn new_keys(&self) -> Vec<String> {
        self.new_leads.iter().map(|l| l.key.clone()).collect()
    }
}

/// Full sync against the configured amoCRM account and database.
///
/// `deliver` gets the digest when there are new leads. Returns the text the
/// caller still has to show, or `None` once the digest went out.
pub async fn sync<F, Fut>(deliver: F) -> Option<String>
where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    match run(deliver).await {
        Ok(left) => left,
        Err(e) => {
            error!("sync failed: {:?}", e);
            Some("Не удалось получить данные из AmoCRM".to_string())
        }
    }
}

async fn run<F, Fut>(deliver: F) -> Result<Option<String>>
where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let db = Db::new().await?;
    let client = AmoClient::from_config();

    let res = sync_and_announce(&db, &client, config().SYNC_FROM, deliver).await;
    db.db.close().await;
    res
}

pub async fn sync_and_announce<F, Fut>(
    db: &Db,
    client: &AmoClient,
    default_from: i64,
    deliver: F,
) -> Result<Option<String>>
where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let _guard = SYNC_LOCK.lock().await;

    let from = db.get_last_sync_date(default_from).await?;
    debug!("From Date: {:?}", from);

    let report = sync_leads(db, client, from).await?;
    if !report.has_new() {
        return Ok(Some(report.message()));
    }

    deliver(report.message()).await?;
    db.mark_announced(&report.new_keys()).await?;
    Ok(None)
}

pub async fn sync_leads(db: &Db, client: &AmoClient, from: i64) -> Result<SyncReport> {
    // taken before fetching so the next run overlaps instead of leaving a gap
    let started = Utc::now().timestamp();

    let amo_leads = client.leads_created_since(from).await?;
    if amo_leads.is_empty() {
        db.update_log(started, 0).await?;
        return Ok(SyncReport {
            new_leads: db.unannounced_leads().await?,
            updated: 0,
        });
    }

    let mut contact_ids: Vec<u64> = amo_leads
        .iter()
        .flat_map(|l| l._embedded.contacts.iter().map(|c| c.id))
        .collect();
    contact_ids.sort_unstable();
    contact_ids.dedup();

    let directory = Directory::new(
        client.pipelines().await?,
        client.users().await?,
        client.contacts(&contact_ids).await?,
    );

    let mut saved = Vec::with_capacity(amo_leads.len());
    for amo_lead in &amo_leads {
        let lead = directory.lead(amo_lead);
        db.save_lead(&lead).await?;
        saved.push(lead.key);
    }

    let new_leads = db.unannounced_leads().await?;
    let pending: HashSet<&str> = new_leads.iter().map(|l| l.key.as_str()).collect();
    let updated = saved.iter().filter(|k| !pending.contains(k.as_str())).count();

    for lead in &new_leads {
        debug!("new lead: {}", lead.to_json()?);
    }

    db.update_log(started, amo_leads.len()).await?;
    info!("sync done: {} new, {} updated", new_leads.len(), updated);
    Ok(SyncReport { new_leads, updated })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_directory(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/api/v4/leads/pipelines"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_embedded": {"pipelines": [{"id": 1, "_embedded": {"statuses": [
                    {"id": 10, "name": "Первичный контакт", "color": "#99ccff"}
                ]}}]}
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v4/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_embedded": {"users": [{"id": 11, "name": "Анна"}]}
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v4/contacts"))
            .and(query_param("filter[id][]", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_embedded": {"contacts": [{"id": 5, "name": "Иван", "custom_fields_values": [
                    {"field_code": "EMAIL", "values": [{"value": "ivan@example.com"}]}
                ]}]}
            })))
            .mount(server)
            .await;
    }

    async fn mount_leads(server: &MockServer) {
        let lead = |id: u64, contacts: serde_json::Value| {
            json!({
                "id": id,
                "name": format!("Квартира {id}"),
                "price": 5000000,
                "status_id": 10,
                "pipeline_id": 1,
                "responsible_user_id": 11,
                "created_at": 1704067200,
                "_embedded": {"contacts": contacts}
            })
        };
        Mock::given(method("GET"))
            .and(path("/api/v4/leads"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_embedded": {"leads": [
                    lead(1, json!([{"id": 5, "is_main": true}])),
                    lead(2, json!([{"id": 5, "is_main": false}]))
                ]}
            })))
            .mount(server)
            .await;
    }

    async fn account() -> MockServer {
        let server = MockServer::start().await;
        mount_directory(&server).await;
        mount_leads(&server).await;
        server
    }

    fn keys(leads: &[Lead]) -> Vec<&str> {
        leads.iter().map(|l| l.key.as_str()).collect()
    }

    #[tokio::test]
    async fn announced_leads_are_only_updated_later() {
        let server = account().await;
        let db = Db::in_memory().await;
        let client = AmoClient::new(server.uri(), "t0k");

        let first = sync_leads(&db, &client, 0).await.unwrap();
        assert_eq!(keys(&first.new_leads), ["1", "2"]);
        assert_eq!(first.updated, 0);
        assert!(first.message().starts_with("Новые сделки:\n№1 Квартира 1, 5000000"));

        let stored = db.read_lead("1").await.unwrap().unwrap();
        assert_eq!(stored, first.new_leads[0]);
        assert_eq!(stored.responsible, "Анна");
        assert_eq!(stored.contacts[0].email.as_deref(), Some("ivan@example.com"));
        assert!(db.get_last_sync_date(0).await.unwrap() > 0);

        db.mark_announced(&first.new_keys()).await.unwrap();

        let second = sync_leads(&db, &client, 0).await.unwrap();
        assert!(!second.has_new());
        assert_eq!(second.updated, 2);
        assert_eq!(second.message(), "Новых сделок не найдено, обновлено: 2");
    }

    #[tokio::test]
    async fn empty_account_logs_the_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/leads"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let db = Db::in_memory().await;
        let client = AmoClient::new(server.uri(), "t0k");

        let report = sync_leads(&db, &client, 0).await.unwrap();
        assert!(!report.has_new());
        assert_eq!(report.message(), "Новых сделок не найдено");
        assert!(db.get_last_sync_date(0).await.unwrap() > 0);
    }

    #[tokio::test]
    async fn failing_directory_leaves_nothing_stored() {
        let server = MockServer::start().await;
        mount_leads(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/v4/leads/pipelines"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let db = Db::in_memory().await;
        let client = AmoClient::new(server.uri(), "t0k");

        assert!(sync_leads(&db, &client, 0).await.is_err());
        assert_eq!(db.read_lead("1").await.unwrap(), None);
        assert_eq!(db.get_last_sync_date(7).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn run_failing_mid_batch_still_reports_saved_leads_as_new() {
        let server = account().await;
        let db = Db::in_memory().await;
        let client = AmoClient::new(server.uri(), "t0k");

        sqlx::query(
            r#"
            CREATE TRIGGER reject_second BEFORE INSERT ON lead
            WHEN NEW.lead_key = '2'
            BEGIN SELECT RAISE(ABORT, 'rejected'); END"#,
        )
        .execute(&db.db)
        .await
        .unwrap();

        assert!(sync_leads(&db, &client, 0).await.is_err());
        assert!(db.read_lead("1").await.unwrap().is_some());

        sqlx::query("DROP TRIGGER reject_second")
            .execute(&db.db)
            .await
            .unwrap();

        let retry = sync_leads(&db, &client, 0).await.unwrap();
        assert_eq!(keys(&retry.new_leads), ["1", "2"]);
        assert_eq!(retry.updated, 0);
    }

    #[tokio::test]
    async fn failed_delivery_keeps_leads_for_the_next_run() {
        let server = account().await;
        let db = Db::in_memory().await;
        let client = AmoClient::new(server.uri(), "t0k");

        let res = sync_and_announce(&db, &client, 0, |_| async {
            Err::<(), Error>(Error::ConfigMissingEnv("TG_GROUP_ID"))
        })
        .await;
        assert!(res.is_err());

        let delivered = StdMutex::new(Vec::new());
        let sink = &delivered;
        let left = sync_and_announce(&db, &client, 0, move |digest| async move {
            sink.lock().unwrap().push(digest);
            Ok::<(), Error>(())
        })
        .await
        .unwrap();

        assert_eq!(left, None);
        let delivered = delivered.into_inner().unwrap();
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].contains("№1 Квартира 1"));
        assert!(delivered[0].contains("№2 Квартира 2"));
        assert!(db.unannounced_leads().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_runs_announce_each_lead_once() {
        let server = account().await;
        let db = Db::in_memory().await;
        let client = AmoClient::new(server.uri(), "t0k");
        let delivered = StdMutex::new(Vec::new());
        let sink = &delivered;

        let deliver = move |digest: String| async move {
            sink.lock().unwrap().push(digest);
            Ok::<(), Error>(())
        };
        let (a, b) = tokio::join!(
            sync_and_announce(&db, &client, 0, deliver),
            sync_and_announce(&db, &client, 0, deliver),
        );

        let mut left = [a.unwrap(), b.unwrap()];
        left.sort();
        assert_eq!(
            left,
            [None, Some("Новых сделок не найдено, обновлено: 2".to_string())]
        );
        assert_eq!(delivered.into_inner().unwrap().len(), 1);
    }
}
