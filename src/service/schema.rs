//! Schema operations over an [`EngineState`]: introspection reads and DDL.

use crate::config::{ChildRelation, TableDescriptor, TableSchema};
use crate::error::AppError;
use crate::migration;
use crate::response::RecordOutcome;
use crate::state::EngineState;
use std::sync::Arc;

pub struct SchemaService;

impl SchemaService {
    pub async fn list_tables(
        state: &EngineState,
        include: Option<&[String]>,
        exclude: Option<&[String]>,
    ) -> Result<Vec<String>, AppError> {
        let mut conn = state.pool.acquire().await?;
        state.introspector.list_tables(&mut conn, include, exclude).await
    }

    pub async fn describe_table(state: &EngineState, name: &str) -> Result<Arc<TableDescriptor>, AppError> {
        let mut conn = state.pool.acquire().await?;
        state.introspector.describe_table(&mut conn, name).await
    }

    pub async fn describe_tables(state: &EngineState, names: &[String]) -> Result<Vec<Arc<TableDescriptor>>, AppError> {
        let mut conn = state.pool.acquire().await?;
        state.introspector.describe_tables(&mut conn, names).await
    }

    pub async fn describe_table_children(state: &EngineState, table: &str) -> Result<Vec<ChildRelation>, AppError> {
        let mut conn = state.pool.acquire().await?;
        let real = state
            .introspector
            .table_exists(&mut conn, table)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("table '{}' does not exist", table)))?;
        state.introspector.describe_table_children(&mut conn, &real).await
    }

    /// Create one table, then its foreign keys and labels. Conflict when the table exists.
    pub async fn create_table(state: &EngineState, def: &TableSchema) -> Result<Arc<TableDescriptor>, AppError> {
        Self::create_tables(state, std::slice::from_ref(def), false, true).await?;
        Self::describe_table(state, &def.name).await
    }

    /// See [`migration::create_tables`].
    pub async fn create_tables(
        state: &EngineState,
        defs: &[TableSchema],
        allow_merge: bool,
        rollback: bool,
    ) -> Result<Vec<RecordOutcome>, AppError> {
        migration::create_tables(&state.pool, &state.introspector, defs, allow_merge, rollback).await
    }

    /// Add missing columns and apply label edits; existing column types are left alone.
    pub async fn update_table(state: &EngineState, def: &TableSchema) -> Result<Arc<TableDescriptor>, AppError> {
        let mut tx = state.pool.begin().await?;
        let intro = &state.introspector;
        let result = async {
            let plan = migration::update_table(&mut *tx, intro, def).await?;
            for fk in &plan.foreign_keys {
                migration::apply_foreign_key(&mut *tx, intro, fk).await?;
            }
            migration::apply_labels(&mut *tx, intro, &plan.labels).await
        }
        .await;
        match result {
            Ok(()) => tx.commit().await?,
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    tracing::warn!(table = %def.name, error = %rb, "rollback failed");
                }
                intro.invalidate(&def.name);
                return Err(e);
            }
        }
        Self::describe_table(state, &def.name).await
    }

    pub async fn drop_table(state: &EngineState, name: &str) -> Result<(), AppError> {
        let mut tx = state.pool.begin().await?;
        match migration::drop_table(&mut *tx, &state.introspector, name).await {
            Ok(()) => Ok(tx.commit().await?),
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    tracing::warn!(table = %name, error = %rb, "rollback failed");
                }
                Err(e)
            }
        }
    }
}
