//! In-process connection backed by the git storage engine.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tempfile::TempDir;
use tracing::{debug, trace};

use super::{Connection, DriverError, DriverResult, ExecOptions, RenderedQuery, RenderedStatement};
use crate::catalog::{Ident, QualifiedName};
use crate::sql::eval::{self, RowView};
use crate::sql::{EvalError, Parser, Query, QuerySource, Statement};
use crate::storage::{GitRepository, StorageSession};
use crate::table::RowSet;

/// Executes typed statements directly; the rendered SQL text is only logged.
///
/// Clones share the same repository. A transactional batch either applies
/// completely or leaves every schema ref as it was.
#[derive(Debug, Clone)]
pub struct LocalConnection {
    repo: GitRepository,
    // keeps a temporary repository alive for the lifetime of the clones
    _dir: Option<Arc<TempDir>>,
}

impl LocalConnection {
    /// Open the repository at `path`, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> DriverResult<Self> {
        Ok(Self {
            repo: GitRepository::open_or_init(path)?,
            _dir: None,
        })
    }

    /// A connection to a fresh repository deleted when the last clone drops.
    pub fn temporary() -> DriverResult<Self> {
        let dir = TempDir::new()?;
        let repo = GitRepository::init(dir.path())?;
        Ok(Self {
            repo,
            _dir: Some(Arc::new(dir)),
        })
    }

    pub fn repository(&self) -> &GitRepository {
        &self.repo
    }
}

impl Connection for LocalConnection {
    fn execute(&self, statement: &RenderedStatement, options: &ExecOptions) -> DriverResult<()> {
        trace!(kind = statement.statement.kind(), sql = %statement.sql, "local execute");
        match &statement.statement {
            Statement::Batch {
                statements,
                transactional: true,
            } => self
                .repo
                .transaction(options.timeout, |s| statements.iter().try_for_each(|st| apply(s, st))),
            other => self.repo.session(options.timeout, |s| apply(s, other)),
        }
    }

    fn query(&self, query: &RenderedQuery, options: &ExecOptions) -> DriverResult<RowSet> {
        trace!(sql = %query.sql, "local query");
        self.repo.session(options.timeout, |s| run_query(s, &query.query))
    }

    fn bulk_insert(&self, table: &QualifiedName, rows: &RowSet, options: &ExecOptions) -> DriverResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let written = self
            .repo
            .session(options.timeout, |s| s.insert_rows(table, rows.rows()))?;
        debug!(%table, rows = written, "bulk insert");
        Ok(written as u64)
    }

    fn introspect_schema(&self, schema: &Ident, options: &ExecOptions) -> DriverResult<BTreeSet<String>> {
        self.repo.session(options.timeout, |s| {
            if !s.schema_exists(schema)? {
                return Ok(BTreeSet::new());
            }
            Ok(s.list_tables(schema)?.into_iter().map(Ident::into_string).collect())
        })
    }

    fn schema_exists(&self, schema: &Ident, options: &ExecOptions) -> DriverResult<bool> {
        Ok(self.repo.session(options.timeout, |s| s.schema_exists(schema))?)
    }

    fn list_schemas(&self, options: &ExecOptions) -> DriverResult<BTreeSet<String>> {
        let schemas = self.repo.session(options.timeout, |s| s.list_schemas())?;
        Ok(schemas.into_iter().map(Ident::into_string).collect())
    }
}

fn apply(s: &StorageSession<'_>, statement: &Statement) -> DriverResult<()> {
    match statement {
        Statement::CreateSchema { name, if_not_exists } => {
            s.create_schema(name, *if_not_exists)?;
        }
        Statement::DropSchema {
            name,
            if_exists,
            cascade,
        } => s.drop_schema(name, *if_exists, *cascade)?,
        Statement::RenameSchema { from, to } => s.rename_schema(from, to)?,
        Statement::CreateTable { name, columns } => s.create_table(name, columns)?,
        Statement::DropTable { name, if_exists } => {
            s.drop_table(name, *if_exists)?;
        }
        Statement::CreateTableAs { name, query } => {
            let rows = run_query(s, query)?;
            s.create_table_with_rows(name, rows.columns(), rows.rows())?;
        }
        Statement::CopyTable { source, target } => s.copy_table(source, target)?,
        Statement::TransferTable { source, target_schema } => s.transfer_table(source, target_schema)?,
        Statement::Batch {
            statements,
            transactional,
        } => {
            if !transactional {
                return statements.iter().try_for_each(|st| apply(s, st));
            }
            let snapshot = s.snapshot()?;
            let result = statements.iter().try_for_each(|st| apply(s, st));
            if result.is_err() {
                s.restore(&snapshot)?;
            }
            return result;
        }
        Statement::Raw(sql) => {
            return Parser::parse_script(sql)?
                .iter()
                .try_for_each(|st| apply(s, st));
        }
    }
    Ok(())
}

/// Scan, filter, order, limit, project.
fn run_query(s: &StorageSession<'_>, query: &Query) -> DriverResult<RowSet> {
    let (columns, rows) = match &query.source {
        QuerySource::Table(table) => {
            let stored = s.read_table(table)?;
            (stored.columns, stored.rows)
        }
        QuerySource::Sql(sql) => {
            let inner = run_query(s, &Parser::parse_query(sql)?)?;
            (inner.columns().to_vec(), inner.into_rows())
        }
    };
    let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

    let mut rows = match &query.filter {
        Some(predicate) => {
            let mut kept = Vec::with_capacity(rows.len());
            for row in rows {
                if eval::matches_filter(predicate, &RowView::new(&names, &row))? {
                    kept.push(row);
                }
            }
            kept
        }
        None => rows,
    };

    if !query.order_by.is_empty() {
        let keys = query
            .order_by
            .iter()
            .map(|o| Ok((column_index(&names, &o.column)?, o.ascending)))
            .collect::<DriverResult<Vec<_>>>()?;
        rows.sort_by(|a, b| {
            keys.iter()
                .map(|&(idx, ascending)| {
                    let ord = compare_nulls_last(&a[idx], &b[idx]);
                    if ascending {
                        ord
                    } else {
                        ord.reverse()
                    }
                })
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
    }

    if let Some(limit) = query.limit {
        rows.truncate(limit);
    }

    if query.projection.is_empty() {
        return Ok(RowSet::from_parts(columns, rows));
    }
    let indices = query
        .projection
        .iter()
        .map(|name| column_index(&names, name))
        .collect::<DriverResult<Vec<_>>>()?;
    let projected_columns = indices.iter().map(|&i| columns[i].clone()).collect();
    let projected_rows = rows
        .into_iter()
        .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
        .collect();
    Ok(RowSet::from_parts(projected_columns, projected_rows))
}

fn column_index(names: &[String], column: &str) -> DriverResult<usize> {
    names
        .iter()
        .position(|n| n == column)
        .ok_or_else(|| DriverError::Eval(EvalError::ColumnNotFound(column.to_string())))
}

/// Ascending order with nulls sorted after every value.
fn compare_nulls_last(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => eval::compare_values(a, b).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnDef, DataType};
    use crate::sql::Expr;
    use serde_json::json;
    use std::time::Duration;

    fn typed(statement: Statement) -> RenderedStatement {
        RenderedStatement {
            sql: String::new(),
            statement,
        }
    }

    fn rendered(query: Query) -> RenderedQuery {
        RenderedQuery {
            sql: String::new(),
            query,
        }
    }

    fn ident(s: &str) -> Ident {
        Ident::new(s).unwrap()
    }

    fn qualified(s: &str) -> QualifiedName {
        QualifiedName::parse(s).unwrap()
    }

    fn seeded() -> LocalConnection {
        let conn = LocalConnection::temporary().unwrap();
        let opts = ExecOptions::default();
        let table = qualified("load.customers");
        conn.execute(&typed(Statement::create_schema(&ident("load"))), &opts)
            .unwrap();
        conn.execute(
            &typed(Statement::CreateTable {
                name: table.clone(),
                columns: vec![
                    ColumnDef::new("id", DataType::Integer).not_null(),
                    ColumnDef::new("name", DataType::Text),
                    ColumnDef::new("score", DataType::Float),
                ],
            }),
            &opts,
        )
        .unwrap();
        let rows = RowSet::with_rows(
            vec![
                ColumnDef::new("id", DataType::Integer).not_null(),
                ColumnDef::new("name", DataType::Text),
                ColumnDef::new("score", DataType::Float),
            ],
            vec![
                vec![json!(1), json!("alice"), json!(3.5)],
                vec![json!(2), json!("bob"), Value::Null],
                vec![json!(3), json!("carol"), json!(9.0)],
            ],
        )
        .unwrap();
        assert_eq!(conn.bulk_insert(&table, &rows, &opts).unwrap(), 3);
        conn
    }

    #[test]
    fn test_query_filter_order_limit_project() {
        let conn = seeded();
        let query = Query::scan(qualified("load.customers"))
            .filter(Expr::col("id").gt(Expr::lit(1)))
            .order_by("score", true)
            .select(["name"]);
        let rows = conn.query(&rendered(query), &ExecOptions::default()).unwrap();

        assert_eq!(rows.column_names(), vec!["name"]);
        assert_eq!(rows.rows(), &[vec![json!("carol")], vec![json!("bob")]]);

        let limited = Query::scan(qualified("load.customers"))
            .order_by("id", false)
            .limit(1);
        let rows = conn.query(&rendered(limited), &ExecOptions::default()).unwrap();
        assert_eq!(rows.get(0, "id"), Some(&json!(3)));
    }

    #[test]
    fn test_query_unknown_column() {
        let conn = seeded();
        let query = Query::scan(qualified("load.customers")).select(["missing"]);
        let result = conn.query(&rendered(query), &ExecOptions::default());
        assert!(matches!(result, Err(DriverError::Eval(EvalError::ColumnNotFound(_)))));
    }

    #[test]
    fn test_create_table_as_and_raw_sql() {
        let conn = seeded();
        let opts = ExecOptions::default();
        conn.execute(
            &typed(Statement::Raw(
                "CREATE SCHEMA report; CREATE TABLE report.top AS SELECT id, name FROM load.customers WHERE id >= 2"
                    .into(),
            )),
            &opts,
        )
        .unwrap();

        let rows = conn
            .query(&rendered(Query::scan(qualified("report.top"))), &opts)
            .unwrap();
        assert_eq!(rows.column_names(), vec!["id", "name"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(
            conn.introspect_schema(&ident("report"), &opts).unwrap(),
            BTreeSet::from(["top".to_string()])
        );
        assert!(conn.introspect_schema(&ident("nowhere"), &opts).unwrap().is_empty());
    }

    #[test]
    fn test_transactional_batch_is_all_or_nothing() {
        let conn = seeded();
        let opts = ExecOptions::default();
        let batch = Statement::Batch {
            statements: vec![
                Statement::RenameSchema {
                    from: ident("load"),
                    to: ident("load__prev"),
                },
                Statement::drop_table(&qualified("load__prev.missing"), false),
            ],
            transactional: true,
        };

        assert!(conn.execute(&typed(batch), &opts).is_err());
        assert!(conn.schema_exists(&ident("load"), &opts).unwrap());
        assert!(!conn.schema_exists(&ident("load__prev"), &opts).unwrap());
    }

    #[test]
    fn test_lock_timeout_surfaces_as_driver_timeout() {
        let conn = seeded();
        let other = conn.clone();
        let result: DriverResult<()> = conn.repository().session(None, |_| {
            other
                .schema_exists(&ident("load"), &ExecOptions::with_timeout(Duration::from_millis(20)))
                .map(|_| ())
        });
        assert!(matches!(result, Err(DriverError::Timeout(_))));
    }
}
