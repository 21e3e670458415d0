//! Schema introspection: live catalog → [`TableDescriptor`], cached per table until DDL invalidates it.

pub mod catalog;

use crate::case::{pluralize, to_label};
use crate::config::{is_reserved_table, AbstractType, ChildRelation, FieldDescriptor, TableDescriptor};
use crate::dialect::{parse_type_params, Dialect, SqlDialect};
use crate::error::AppError;
use crate::migration::LabelEntry;
use crate::store;
use catalog::{CatalogColumn, CatalogForeignKey};
use sqlx::AnyConnection;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub struct Introspector {
    dialect: Dialect,
    cache: RwLock<HashMap<String, Arc<TableDescriptor>>>,
}

impl Introspector {
    pub fn new(dialect: Dialect) -> Self {
        Introspector {
            dialect,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn rules(&self) -> &'static dyn SqlDialect {
        self.dialect.rules()
    }

    fn cached(&self, name: &str) -> Option<Arc<TableDescriptor>> {
        let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
        cache.get(&name.to_lowercase()).cloned()
    }

    pub fn invalidate(&self, name: &str) {
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        if cache.remove(&name.to_lowercase()).is_some() {
            tracing::debug!(table = %name, "schema cache invalidated");
        }
    }

    pub fn invalidate_all(&self) {
        self.cache.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Catalog spelling of a table name, if the table exists.
    pub async fn table_exists(&self, conn: &mut AnyConnection, name: &str) -> Result<Option<String>, AppError> {
        catalog::find_table(conn, self.rules(), name).await
    }

    /// User tables sorted case-insensitively. A non-empty `include` wins over `exclude`.
    pub async fn list_tables(
        &self,
        conn: &mut AnyConnection,
        include: Option<&[String]>,
        exclude: Option<&[String]>,
    ) -> Result<Vec<String>, AppError> {
        let matches = |list: &[String], name: &str| list.iter().any(|n| n.eq_ignore_ascii_case(name));
        let mut names: Vec<String> = catalog::table_names(conn, self.rules())
            .await?
            .into_iter()
            .filter(|n| !is_reserved_table(n))
            .filter(|n| match (include, exclude) {
                (Some(inc), _) if !inc.is_empty() => matches(inc, n),
                (_, Some(exc)) => !matches(exc, n),
                _ => true,
            })
            .collect();
        names.sort_by_key(|n| n.to_lowercase());
        Ok(names)
    }

    /// Whether a descriptor for `name` is currently cached.
    pub fn is_cached(&self, name: &str) -> bool {
        self.cached(name).is_some()
    }

    pub async fn describe_table(&self, conn: &mut AnyConnection, name: &str) -> Result<Arc<TableDescriptor>, AppError> {
        if let Some(hit) = self.cached(name) {
            return Ok(hit);
        }
        let desc = self.describe_uncached(conn, name).await?;
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        cache.insert(desc.name.to_lowercase(), desc.clone());
        if desc.name.to_lowercase() != name.to_lowercase() {
            cache.insert(name.to_lowercase(), desc.clone());
        }
        Ok(desc)
    }

    /// Read a descriptor from the catalog without touching the cache.
    ///
    /// DDL running inside an open transaction uses this so uncommitted state never becomes visible
    /// to other connections.
    pub async fn describe_uncached(&self, conn: &mut AnyConnection, name: &str) -> Result<Arc<TableDescriptor>, AppError> {
        let real = self
            .table_exists(conn, name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("table '{}' does not exist", name)))?;
        let d = self.rules();
        let columns = catalog::columns(conn, d, &real).await?;
        if columns.is_empty() {
            return Err(AppError::NotFound(format!("table '{}' has no columns", real)));
        }
        let mut fks = catalog::foreign_keys(conn, d, &real).await?;
        for rel in store::relations_from(conn, d, &real).await? {
            if !fks.iter().any(|f| f.column.eq_ignore_ascii_case(&rel.owner_column)) {
                fks.push(CatalogForeignKey {
                    column: rel.owner_column,
                    ref_table: rel.ref_table,
                    ref_column: rel.ref_fields,
                });
            }
        }
        let labels = store::read_labels(conn, d, &real).await?;
        let children = self.describe_table_children(conn, &real).await?;

        let field: Vec<FieldDescriptor> = columns.iter().map(|c| self.field_descriptor(c, &fks, &labels)).collect();
        let table_label = labels.iter().find(|l| l.field.is_none());
        let label = table_label
            .and_then(|l| l.label.clone())
            .unwrap_or_else(|| to_label(&real));
        let plural = table_label
            .and_then(|l| l.plural.clone())
            .unwrap_or_else(|| pluralize(&label));
        let primary_key = field.iter().find(|f| f.is_primary_key).map(|f| f.name.clone());
        Ok(Arc::new(TableDescriptor {
            name: real,
            label,
            plural,
            primary_key,
            field,
            children,
        }))
    }

    /// Descriptors in caller order.
    pub async fn describe_tables(
        &self,
        conn: &mut AnyConnection,
        names: &[String],
    ) -> Result<Vec<Arc<TableDescriptor>>, AppError> {
        let mut out = Vec::with_capacity(names.len());
        for n in names {
            out.push(self.describe_table(conn, n).await?);
        }
        Ok(out)
    }

    /// Tables whose foreign keys point at `table`, from the catalog and the relation bookkeeping.
    pub async fn describe_table_children(
        &self,
        conn: &mut AnyConnection,
        table: &str,
    ) -> Result<Vec<ChildRelation>, AppError> {
        let d = self.rules();
        let mut children: Vec<ChildRelation> = Vec::new();
        for other in catalog::table_names(conn, d).await? {
            if is_reserved_table(&other) {
                continue;
            }
            for fk in catalog::foreign_keys(conn, d, &other).await? {
                if fk.ref_table.eq_ignore_ascii_case(table) {
                    children.push(ChildRelation { table: other.clone(), field: fk.column });
                }
            }
        }
        for rel in store::relations_to(conn, d, table).await? {
            let seen = children
                .iter()
                .any(|c| c.table.eq_ignore_ascii_case(&rel.owner_table) && c.field.eq_ignore_ascii_case(&rel.owner_column));
            if !seen {
                children.push(ChildRelation { table: rel.owner_table, field: rel.owner_column });
            }
        }
        children.sort_by_key(|c| (c.table.to_lowercase(), c.field.to_lowercase()));
        Ok(children)
    }

    fn field_descriptor(&self, c: &CatalogColumn, fks: &[CatalogForeignKey], labels: &[LabelEntry]) -> FieldDescriptor {
        let d = self.rules();
        let (p1, p2) = parse_type_params(&c.data_type);
        let to_u32 = |v: Option<i64>| v.and_then(|n| u32::try_from(n).ok());
        let precision = to_u32(c.precision).or(p1);
        let scale = to_u32(c.scale).or(p2);
        let base = d.classify(&c.data_type, precision, scale);
        let fk = fks.iter().find(|f| f.column.eq_ignore_ascii_case(&c.name));
        let meta = labels
            .iter()
            .find(|l| l.field.as_deref().is_some_and(|f| f.eq_ignore_ascii_case(&c.name)));
        let picklist = meta.map(|m| m.picklist.clone()).unwrap_or_default();

        let abstract_type = if c.auto_increment && c.primary_key && base.is_integer() {
            AbstractType::Id
        } else if fk.is_some() && base.is_integer() {
            AbstractType::Reference
        } else if base.is_string() && !picklist.is_empty() {
            if meta.is_some_and(|m| m.multi) {
                AbstractType::MultiPicklist
            } else {
                AbstractType::Picklist
            }
        } else {
            base
        };

        let size = if abstract_type.is_string() {
            to_u32(c.max_length).or(p1)
        } else {
            None
        };
        let (precision, scale) = if matches!(abstract_type, AbstractType::Decimal | AbstractType::Money) {
            (precision, scale)
        } else {
            (None, None)
        };
        let lower = c.data_type.to_lowercase();
        let supports_multibyte = abstract_type.is_string()
            && (lower.starts_with('n')
                || matches!(self.dialect, Dialect::Postgres | Dialect::Sqlite | Dialect::MySql));
        let default = if c.auto_increment {
            None
        } else {
            c.default.clone().filter(|v| !v.eq_ignore_ascii_case("NULL"))
        };

        let mut f = FieldDescriptor {
            name: c.name.clone(),
            label: meta.and_then(|m| m.label.clone()).unwrap_or_else(|| to_label(&c.name)),
            size,
            precision,
            scale,
            default,
            required: false,
            allow_null: c.nullable,
            abstract_type,
            db_type: c.data_type.clone(),
            auto_increment: c.auto_increment,
            is_primary_key: c.primary_key,
            is_foreign_key: fk.is_some(),
            ref_table: fk.map(|f| f.ref_table.clone()),
            ref_fields: fk.map(|f| f.ref_column.clone()),
            supports_multibyte,
            picklist,
        };
        f.derive_required();
        f
    }
}
