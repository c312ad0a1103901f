use crate::Result;
use crate::model::Db;
use crate::model::lead::{Contact, Lead, Status};
use log::{debug, error};
use sqlx::FromRow;

#[derive(FromRow, Debug)]
struct LeadRow {
    lead_key: String,
    name: String,
    price: String,
    status_id: String,
    status_name: String,
    status_color: String,
    responsible: String,
    created_at: String,
}

#[derive(FromRow, Debug)]
struct ContactRow {
    id: String,
    name: String,
    phone: Option<String>,
    email: Option<String>,
}

impl From<ContactRow> for Contact {
    fn from(r: ContactRow) -> Self {
        Contact {
            id: r.id,
            name: r.name,
            phone: r.phone,
            email: r.email,
        }
    }
}

impl Db {
    /// Inserts or refreshes a lead. Its contacts are replaced as a whole.
    pub async fn save_lead(&self, l: &Lead) -> Result<()> {
        debug!("save lead with data: {:?}", l);
        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
                INSERT INTO lead (lead_key, name, price, status_id, status_name, status_color, responsible, created_at)
                VALUES($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT(lead_key) DO UPDATE SET
                    name = excluded.name,
                    price = excluded.price,
                    status_id = excluded.status_id,
                    status_name = excluded.status_name,
                    status_color = excluded.status_color,
                    responsible = excluded.responsible,
                    created_at = excluded.created_at,
                    updated_on = datetime('now', 'localtime')"#,
        )
        .bind(&l.key)
        .bind(&l.name)
        .bind(&l.price)
        .bind(&l.status.id)
        .bind(&l.status.name)
        .bind(&l.status.color)
        .bind(&l.responsible)
        .bind(&l.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM contact WHERE lead_key = $1")
            .bind(&l.key)
            .execute(&mut *tx)
            .await?;

        for (position, c) in l.contacts.iter().enumerate() {
            sqlx::query(
                r#"
                    INSERT INTO contact (lead_key, position, id, name, phone, email)
                    VALUES($1, $2, $3, $4, $5, $6)"#,
            )
            .bind(&l.key)
            .bind(position as i64)
            .bind(&c.id)
            .bind(&c.name)
            .bind(&c.phone)
            .bind(&c.email)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn read_lead(&self, key: &str) -> Result<Option<Lead>> {
        let row: Option<LeadRow> = sqlx::query_as(
            r#"
            SELECT lead_key, name, price, status_id, status_name, status_color, responsible, created_at
            FROM lead WHERE lead_key = $1"#,
        )
        .bind(key)
        .fetch_optional(&self.db)
        .await?;

        match row {
            None => Ok(None),
            Some(r) => Ok(Some(self.assemble(r).await?)),
        }
    }

    /// Newest first.
    pub async fn list_leads(&self, limit: u32) -> Result<Vec<Lead>> {
        let rows: Vec<LeadRow> = sqlx::query_as(
            r#"
            SELECT lead_key, name, price, status_id, status_name, status_color, responsible, created_at
            FROM lead ORDER BY created_at DESC, lead_key DESC LIMIT $1"#,
        )
        .bind(limit as i64)
        .fetch_all(&self.db)
        .await?;
        debug!("[list_leads] {} rows", rows.len());

        let mut leads = Vec::with_capacity(rows.len());
        for r in rows {
            leads.push(self.assemble(r).await?);
        }
        Ok(leads)
    }

    /// Saved leads whose digest line has not been delivered yet, oldest first.
    pub async fn unannounced_leads(&self) -> Result<Vec<Lead>> {
        let rows: Vec<LeadRow> = sqlx::query_as(
            r#"
            SELECT lead_key, name, price, status_id, status_name, status_color, responsible, created_at
            FROM lead WHERE announced = 0 ORDER BY created_at, lead_key"#,
        )
        .fetch_all(&self.db)
        .await?;

        let mut leads = Vec::with_capacity(rows.len());
        for r in rows {
            leads.push(self.assemble(r).await?);
        }
        Ok(leads)
    }

    pub async fn mark_announced(&self, keys: &[String]) -> Result<()> {
        let mut tx = self.db.begin().await?;
        for key in keys {
            sqlx::query("UPDATE lead SET announced = 1 WHERE lead_key = $1")
                .bind(key)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        debug!("[mark_announced] {:?}", keys);
        Ok(())
    }

    async fn assemble(&self, r: LeadRow) -> Result<Lead> {
        let contacts: Vec<ContactRow> = sqlx::query_as(
            "SELECT id, name, phone, email FROM contact WHERE lead_key = $1 ORDER BY position",
        )
        .bind(&r.lead_key)
        .fetch_all(&self.db)
        .await?;

        Ok(Lead {
            key: r.lead_key,
            name: r.name,
            price: r.price,
            status: Status {
                id: r.status_id,
                name: r.status_name,
                color: r.status_color,
            },
            responsible: r.responsible,
            created_at: r.created_at,
            contacts: contacts.into_iter().map(Contact::from).collect(),
        })
    }

    /// Unix seconds of the last logged sync, `default` before the first one.
    pub async fn get_last_sync_date(&self, default: i64) -> Result<i64> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT last_checked_date FROM log ORDER BY id DESC LIMIT 1")
                .fetch_optional(&self.db)
                .await?;
        debug!("log_record: {:?}", row);
        Ok(row.map(|(date,)| date).unwrap_or(default))
    }

    pub async fn update_log(&self, checked_at: i64, row_count: usize) -> Result<()> {
        sqlx::query("INSERT INTO log (last_checked_date, row_count) VALUES($1, $2)")
            .bind(checked_at)
            .bind(row_count as i64)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

pub fn digest(title: &str, leads: &[Lead]) -> String {
    leads.iter().fold(format!("{title}\n"), |mut output, l| {
        output.push_str(&l.summary());
        output.push('\n');
        output
    })
}

pub async fn prepare_lead_response(db: &Db, key: &str) -> String {
    match db.read_lead(key.trim()).await {
        Ok(Some(lead)) => lead.card(),
        Ok(None) => "Сделка не найдена".to_string(),
        Err(e) => {
            error!("Prepare lead response error: {}", e);
            "Ошибка чтения данных".to_string()
        }
    }
}

pub async fn prepare_leads_response(db: &Db, limit: u32) -> String {
    match db.list_leads(limit).await {
        Ok(leads) if leads.is_empty() => "Сделок пока нет".to_string(),
        Ok(leads) => digest("Последние сделки:", &leads),
        Err(e) => {
            error!("[prepare_leads_response] {:?}", e);
            "Ошибка при получении сделок".to_string()
        }
    }
}

pub async fn prepare_export_response(db: &Db, key: &str) -> String {
    let result = match db.read_lead(key.trim()).await {
        Ok(Some(lead)) => lead.to_json_pretty(),
        Ok(None) => return "Сделка не найдена".to_string(),
        Err(e) => Err(e),
    };
    result.unwrap_or_else(|e| {
        error!("[prepare_export_response] {:?}", e);
        "Ошибка чтения данных".to_string()
    })
}

pub async fn prepare_import_response(db: &Db, raw: &str) -> String {
    let lead = match Lead::from_json(raw.trim()) {
        Ok(lead) => lead,
        Err(e) => {
            debug!("[prepare_import_response] rejected payload: {:?}", e);
            return "Некорректный JSON сделки".to_string();
        }
    };
    match db.save_lead(&lead).await {
        Ok(()) => format!("Сделка №{} сохранена", lead.key),
        Err(e) => {
            error!("[prepare_import_response] {:?}", e);
            "Ошибка записи данных".to_string()
        }
    }
}
