use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{migrate::MigrateDatabase, QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::info;

use super::{RecordStore, RequestQuery, RunningStage, StoreError, INTAKE_MESSAGE, INTAKE_SYSTEM};
use crate::domain::{
    Applicant, Event, NewEvent, NewRequest, OverallStatus, RequestId, RequestSnapshot, Stage,
    StageFields, StageRecord, StageStatus, StageStatuses, Vehicle,
};

/// Labels a "Em processo" stage may be stored under, canonical and legacy.
const RUNNING_LABELS: [&str; 4] = ["em processo", "em_processo", "running", "processing"];

/// SQLite-backed record store.
pub struct SqliteStore {
    pool: SqlitePool,
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp '{raw}': {e}")))
}

fn parse_label<T: serde::de::DeserializeOwned>(raw: String) -> Result<T, StoreError> {
    Ok(serde_json::from_value(serde_json::Value::String(raw))?)
}

fn push_assignments(builder: &mut QueryBuilder<'_, Sqlite>, fields: &StageFields) {
    let now = timestamp(Utc::now());
    let mut assignments = builder.separated(", ");
    for (stage, status) in &fields.stages {
        assignments.push(format!("status_{} = ", stage.slug()));
        assignments.push_bind_unseparated(status.as_str());
        assignments.push(format!("{}_updated_at = ", stage.slug()));
        assignments.push_bind_unseparated(now.clone());
    }
    if let Some(overall) = fields.overall {
        assignments.push("status_overall = ");
        assignments.push_bind_unseparated(overall.as_str());
    }
    if let Some(received) = fields.document_received {
        assignments.push("cnh_received = ");
        assignments.push_bind_unseparated(received as i64);
    }
}

impl SqliteStore {
    /// Open (creating if needed) the database and optionally run migrations.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        auto_migrate: bool,
    ) -> Result<Self, StoreError> {
        if !Sqlite::database_exists(database_url).await? {
            info!(database_url, "Creating onboarding database");
            Sqlite::create_database(database_url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await?;

        if auto_migrate {
            info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            info!("Database migrations completed");
        }

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        info!("Shutting down database connections...");
        self.pool.close().await;
    }

    fn snapshot_from_row(row: &SqliteRow) -> Result<RequestSnapshot, StoreError> {
        let mut stages = StageStatuses::default();
        for stage in Stage::ALL {
            let status: String = row.try_get(format!("status_{}", stage.slug()).as_str())?;
            let updated_at: Option<String> =
                row.try_get(format!("{}_updated_at", stage.slug()).as_str())?;
            *stages.record_mut(stage) = StageRecord {
                status: status.parse()?,
                updated_at: updated_at.as_deref().map(parse_timestamp).transpose()?,
            };
        }

        let overall: String = row.try_get("status_overall")?;
        let created_at: String = row.try_get("created_at")?;
        let payload: String = row.try_get("payload_json")?;
        let document_received: i64 = row.try_get("cnh_received")?;

        Ok(RequestSnapshot {
            id: RequestId::from(row.try_get::<String, _>("id")?),
            created_at: parse_timestamp(&created_at)?,
            kind: parse_label(row.try_get("kind")?)?,
            role: parse_label(row.try_get("role")?)?,
            applicant: Applicant {
                document_number: row.try_get("cpf")?,
                display_name: row.try_get("display_name")?,
                canonical_name: row.try_get("canonical_name")?,
            },
            requester_name: row.try_get("requester_name")?,
            requester_org: row.try_get("requester_org")?,
            document_received: document_received != 0,
            stages,
            overall: overall.parse::<OverallStatus>()?,
            payload: serde_json::from_str(&payload)?,
        })
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn create_request(&self, request: NewRequest) -> Result<RequestId, StoreError> {
        let id = RequestId::generate();
        let now = Utc::now();
        let (snapshot, vehicle) = request.into_snapshot(id.clone(), now);

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO requests (
                id, created_at, kind, role, cpf, display_name, canonical_name,
                requester_name, requester_org, cnh_received,
                status_brasil_risk, status_rlog_cielo, status_rlog_geral, status_bringg,
                status_overall, payload_json
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11, ?11, ?11, ?12, ?13)
            "#,
        )
        .bind(id.as_str())
        .bind(timestamp(now))
        .bind(snapshot.kind.as_str())
        .bind(snapshot.role.as_str())
        .bind(&snapshot.applicant.document_number)
        .bind(&snapshot.applicant.display_name)
        .bind(&snapshot.applicant.canonical_name)
        .bind(&snapshot.requester_name)
        .bind(&snapshot.requester_org)
        .bind(snapshot.document_received as i64)
        .bind(StageStatus::Awaiting.as_str())
        .bind(snapshot.overall.as_str())
        .bind(snapshot.payload.to_string())
        .execute(&mut *tx)
        .await?;

        if let Some(vehicle) = vehicle {
            sqlx::query(
                "INSERT INTO vehicles (request_id, plate, payload_json, created_at) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(id.as_str())
            .bind(&vehicle.plate)
            .bind(vehicle.payload.to_string())
            .bind(timestamp(now))
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "INSERT INTO events (request_id, ts, level, system, message) VALUES (?1, ?2, 'INFO', ?3, ?4)",
        )
        .bind(id.as_str())
        .bind(timestamp(now))
        .bind(INTAKE_SYSTEM)
        .bind(INTAKE_MESSAGE)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(id)
    }

    async fn get_request(&self, id: &RequestId) -> Result<RequestSnapshot, StoreError> {
        let row = sqlx::query("SELECT * FROM requests WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Self::snapshot_from_row(&row),
            None => Err(StoreError::NotFound(id.clone())),
        }
    }

    async fn get_vehicle(&self, id: &RequestId) -> Result<Option<Vehicle>, StoreError> {
        // Distinguish "no vehicle" from "no request".
        self.get_request(id).await?;
        let row = sqlx::query("SELECT plate, payload_json FROM vehicles WHERE request_id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| -> Result<Vehicle, StoreError> {
            let payload: String = row.try_get("payload_json")?;
            Ok(Vehicle {
                plate: row.try_get("plate")?,
                payload: serde_json::from_str(&payload)?,
            })
        })
        .transpose()
    }

    async fn update_stage_fields(&self, id: &RequestId, fields: StageFields) -> Result<(), StoreError> {
        if fields.is_empty() {
            return self.get_request(id).await.map(|_| ());
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE requests SET ");
        push_assignments(&mut builder, &fields);
        builder.push(" WHERE id = ");
        builder.push_bind(id.as_str());

        let result = builder.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(())
    }

    async fn claim_stage(
        &self,
        id: &RequestId,
        stage: Stage,
        expected: StageStatus,
        fields: StageFields,
    ) -> Result<bool, StoreError> {
        let column = format!("status_{}", stage.slug());
        let select = format!("SELECT {column} FROM requests WHERE id = ?1");
        let label: Option<String> = sqlx::query_scalar(&select)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        let Some(label) = label else {
            return Err(StoreError::NotFound(id.clone()));
        };
        if label.parse::<StageStatus>()? != expected {
            return Ok(false);
        }

        // Compare against the stored label as read, legacy spellings included.
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE requests SET ");
        push_assignments(&mut builder, &fields);
        builder.push(" WHERE id = ");
        builder.push_bind(id.as_str());
        builder.push(format!(" AND {column} = "));
        builder.push_bind(label);

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn append_event(&self, id: &RequestId, event: NewEvent) -> Result<(), StoreError> {
        self.get_request(id).await?;
        let metadata = event.metadata.as_ref().map(|m| m.to_string());
        sqlx::query(
            r#"
            INSERT INTO events (request_id, ts, level, system, message, metadata_json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(id.as_str())
        .bind(timestamp(Utc::now()))
        .bind(event.level.as_str())
        .bind(&event.system)
        .bind(&event.message)
        .bind(metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_events(&self, id: &RequestId, limit: usize) -> Result<Vec<Event>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, request_id, ts, level, system, message, metadata_json
            FROM events
            WHERE request_id = ?1
            ORDER BY id DESC
            LIMIT ?2
            "#,
        )
        .bind(id.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<Event, StoreError> {
                let ts: String = row.try_get("ts")?;
                let level: String = row.try_get("level")?;
                let metadata: Option<String> = row.try_get("metadata_json")?;
                Ok(Event {
                    id: row.try_get("id")?,
                    request_id: RequestId::from(row.try_get::<String, _>("request_id")?),
                    timestamp: parse_timestamp(&ts)?,
                    level: level.parse().map_err(StoreError::Corrupt)?,
                    system: row.try_get("system")?,
                    message: row.try_get("message")?,
                    metadata: metadata.as_deref().map(serde_json::from_str).transpose()?,
                })
            })
            .collect()
    }

    async fn list_requests(&self, query: RequestQuery) -> Result<Vec<RequestSnapshot>, StoreError> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM requests");
        if let Some(text) = query.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let digits = crate::validators::only_digits(text);
            let pattern = format!("%{}%", text.to_lowercase());
            builder.push(" WHERE lower(display_name) LIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR id LIKE ");
            builder.push_bind(pattern);
            if !digits.is_empty() {
                builder.push(" OR cpf LIKE ");
                builder.push_bind(format!("%{digits}%"));
            }
        }
        builder.push(" ORDER BY created_at DESC LIMIT ");
        builder.push_bind(query.limit.map(|l| l as i64).unwrap_or(-1));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::snapshot_from_row).collect()
    }

    async fn find_running_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<RunningStage>, StoreError> {
        let labels = RUNNING_LABELS
            .iter()
            .map(|l| format!("'{l}'"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM requests WHERE ");
        let mut any_running = builder.separated(" OR ");
        for stage in Stage::ALL {
            any_running.push(format!("lower(status_{}) IN ({labels})", stage.slug()));
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        let mut running = Vec::new();
        for row in &rows {
            let snapshot = Self::snapshot_from_row(row)?;
            for stage in Stage::ALL {
                let record = snapshot.stages.record(stage);
                if record.status != StageStatus::Running {
                    continue;
                }
                let since = record.updated_at.unwrap_or(snapshot.created_at);
                if since < cutoff {
                    running.push(RunningStage {
                        request_id: snapshot.id.clone(),
                        stage,
                        since,
                    });
                }
            }
        }
        Ok(running)
    }
}
