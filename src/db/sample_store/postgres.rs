use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryOrder, QuerySelect, Schema, Set,
};
use tracing::info;

use super::{SampleStore, StoreError};
use crate::db::entities::usage_sample;
use crate::db::models::Sample;

/// PostgreSQL-backed store. Each insert is a single-row `INSERT ... RETURNING`.
pub struct PgSampleStore {
    db: DatabaseConnection,
}

impl PgSampleStore {
    /// Connects to `database_url` and creates the samples table if it is missing.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let mut opt = ConnectOptions::new(database_url.to_owned());
        opt.max_connections(10).sqlx_logging(false);

        let db = Database::connect(opt).await?;
        let store = Self::from_connection(db);
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn from_connection(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        let backend = self.db.get_database_backend();
        let schema = Schema::new(backend);

        let mut table = schema.create_table_from_entity(usage_sample::Entity);
        table.if_not_exists();
        self.db.execute(backend.build(&table)).await?;

        for mut index in schema.create_index_from_entity(usage_sample::Entity) {
            index.if_not_exists();
            self.db.execute(backend.build(&index)).await?;
        }

        info!("Sample table is ready.");
        Ok(())
    }
}

#[async_trait]
impl SampleStore for PgSampleStore {
    async fn insert(&self, cpu_percent: f64, ram_percent: f64) -> Result<Sample, StoreError> {
        let active = usage_sample::ActiveModel {
            created_at: Set(Utc::now()),
            cpu_percent: Set(cpu_percent),
            ram_percent: Set(ram_percent),
            ..Default::default()
        };
        let model = active.insert(&self.db).await?;
        Ok(Sample::from(model))
    }

    async fn latest(&self) -> Result<Option<Sample>, StoreError> {
        let model = usage_sample::Entity::find()
            .order_by_desc(usage_sample::Column::CreatedAt)
            .order_by_desc(usage_sample::Column::Id)
            .one(&self.db)
            .await?;
        Ok(model.map(Sample::from))
    }

    async fn page(&self, offset: u64, limit: u64) -> Result<(Vec<Sample>, u64), StoreError> {
        let total = usage_sample::Entity::find().count(&self.db).await?;

        let models = usage_sample::Entity::find()
            .order_by_asc(usage_sample::Column::CreatedAt)
            .order_by_asc(usage_sample::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(&self.db)
            .await?;

        Ok((models.into_iter().map(Sample::from).collect(), total))
    }
}
