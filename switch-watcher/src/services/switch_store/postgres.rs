//! Durable [`SwitchStore`] backed by a Postgres table holding one JSONB
//! row per switch, following the same connect-then-migrate shape as
//! `oprf-key-gen`'s `PostgresSecretManager`.
//!
//! The row's key is the switch id; the value is the whole [`Switch`]
//! aggregate, serialized with `serde_json`. A single JSONB column is
//! enough here because every query this store serves is a point lookup
//! or a full-row replace - there is no need to index into individual
//! switch fields from SQL.

use async_trait::async_trait;
use eyre::Context as _;
use secrecy::{ExposeSecret, SecretString};
use sqlx::{Executor as _, PgPool, postgres::PgPoolOptions, types::Json};
use std::num::NonZeroU32;
use switch_types::error::SwitchError;
use switch_types::ids::SwitchId;
use switch_types::store::SwitchStore;
use switch_types::switch::Switch;
use tracing::instrument;

/// The Postgres-backed switch table.
pub struct PostgresSwitchStore {
    pool: PgPool,
}

fn sanitize_identifier(input: &str) -> eyre::Result<()> {
    eyre::ensure!(!input.is_empty(), "empty schema is not allowed");
    if input.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
        Ok(())
    } else {
        Err(eyre::eyre!("invalid SQL identifier"))
    }
}

fn schema_connect(schema: &str) -> eyre::Result<String> {
    sanitize_identifier(schema)?;
    Ok(format!(
        r#"
            CREATE SCHEMA IF NOT EXISTS "{schema}";
            SET search_path TO "{schema}";
        "#
    ))
}

impl PostgresSwitchStore {
    /// Connects, sets the search path to `schema`, and runs migrations.
    #[instrument(level = "info", skip_all)]
    pub async fn init(
        connection_string: &SecretString,
        schema: &str,
        max_connections: NonZeroU32,
    ) -> eyre::Result<Self> {
        let schema_connect = schema_connect(schema).context("while building schema string")?;
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.get())
            .after_connect(move |conn, _| {
                let schema_connect = schema_connect.clone();
                Box::pin(async move {
                    conn.execute(schema_connect.as_ref()).await?;
                    Ok(())
                })
            })
            .connect(connection_string.expose_secret())
            .await
            .context("while connecting to postgres")?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("while running migrations")?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl SwitchStore for PostgresSwitchStore {
    async fn insert(&self, switch: Switch) -> Result<(), SwitchError> {
        let id = switch.id().into_uuid();
        let result = sqlx::query("INSERT INTO switches (id, data) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(id)
            .bind(Json(&switch))
            .execute(&self.pool)
            .await
            .map_err(|err| SwitchError::SubstrateUnavailable {
                watcher: None,
                reason: format!("postgres insert failed: {err}"),
            })?;
        if result.rows_affected() == 0 {
            return Err(SwitchError::StateConflict(format!(
                "switch {id} already enrolled"
            )));
        }
        Ok(())
    }

    async fn get(&self, id: SwitchId) -> Result<Option<Switch>, SwitchError> {
        let row: Option<(Json<Switch>,)> = sqlx::query_as("SELECT data FROM switches WHERE id = $1")
            .bind(id.into_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| SwitchError::SubstrateUnavailable {
                watcher: None,
                reason: format!("postgres select failed: {err}"),
            })?;
        Ok(row.map(|(Json(switch),)| switch))
    }

    async fn update(
        &self,
        id: SwitchId,
        f: Box<dyn FnOnce(&mut Switch) -> Result<(), SwitchError> + Send + '_>,
    ) -> Result<(), SwitchError> {
        let mut tx = self.pool.begin().await.map_err(|err| SwitchError::SubstrateUnavailable {
            watcher: None,
            reason: format!("postgres begin failed: {err}"),
        })?;
        let row: Option<(Json<Switch>,)> =
            sqlx::query_as("SELECT data FROM switches WHERE id = $1 FOR UPDATE")
                .bind(id.into_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|err| SwitchError::SubstrateUnavailable {
                    watcher: None,
                    reason: format!("postgres select-for-update failed: {err}"),
                })?;
        let Some((Json(mut switch),)) = row else {
            return Err(SwitchError::StateConflict(format!("no such switch {id}")));
        };
        f(&mut switch)?;
        sqlx::query("UPDATE switches SET data = $1 WHERE id = $2")
            .bind(Json(&switch))
            .bind(id.into_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|err| SwitchError::SubstrateUnavailable {
                watcher: None,
                reason: format!("postgres update failed: {err}"),
            })?;
        tx.commit().await.map_err(|err| SwitchError::SubstrateUnavailable {
            watcher: None,
            reason: format!("postgres commit failed: {err}"),
        })?;
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<SwitchId>, SwitchError> {
        let rows: Vec<(uuid::Uuid,)> = sqlx::query_as("SELECT id FROM switches")
            .fetch_all(&self.pool)
            .await
            .map_err(|err| SwitchError::SubstrateUnavailable {
                watcher: None,
                reason: format!("postgres list failed: {err}"),
            })?;
        Ok(rows.into_iter().map(|(id,)| SwitchId::from_uuid(id)).collect())
    }
}
