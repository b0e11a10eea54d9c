//! Memory-bounded iteration over large result sets.
//!
//! All three forms page through the statement with `LIMIT`/`OFFSET`. A limit
//! or offset already set on the builder bounds the walk: paging starts at the
//! offset and stops once `limit` rows have been produced. Add an `order_by`
//! for a stable page order.

use std::collections::VecDeque;

use super::QueryBuilder;
use crate::{Database, MapperError, Row};

impl QueryBuilder {
    /// Feed pages of `size` rows to `handle` until the rows run out or the
    /// callback returns `false`.
    pub async fn chunk<F>(&mut self, db: &Database, size: u64, mut handle: F) -> Result<(), MapperError>
    where
        F: FnMut(Vec<Row>) -> Result<bool, MapperError>,
    {
        let mut pages = self.pages(db, size).await?;
        while let Some(rows) = pages.next_page().await? {
            if !handle(rows)? {
                break;
            }
        }
        Ok(())
    }

    /// Lazily fetched pages.
    pub async fn pages<'db>(
        &mut self,
        db: &'db Database,
        size: u64,
    ) -> Result<PageStream<'db>, MapperError> {
        if size == 0 {
            return Err(MapperError::invalid("page size must be positive"));
        }
        self.preflight(db).await?;
        let statement = self.statement();
        Ok(PageStream {
            db,
            start: statement.offset.unwrap_or(0),
            cap: statement.limit,
            query: self.clone(),
            size,
            fetched: 0,
            done: false,
        })
    }

    /// Row-at-a-time cursor backed by pages of `size` rows.
    pub async fn cursor<'db>(
        &mut self,
        db: &'db Database,
        size: u64,
    ) -> Result<RowCursor<'db>, MapperError> {
        Ok(RowCursor {
            pages: self.pages(db, size).await?,
            buffer: VecDeque::new(),
        })
    }
}

pub struct PageStream<'db> {
    db: &'db Database,
    query: QueryBuilder,
    size: u64,
    /// Offset of the first row.
    start: u64,
    /// Most rows to produce overall.
    cap: Option<u64>,
    fetched: u64,
    done: bool,
}

impl PageStream<'_> {
    /// The next non-empty page, or `None` once the result set is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Row>>, MapperError> {
        let take = match self.cap {
            Some(cap) => self.size.min(cap.saturating_sub(self.fetched)),
            None => self.size,
        };
        if self.done || take == 0 {
            self.done = true;
            return Ok(None);
        }
        let mut query = self
            .query
            .clone()
            .limit(take)
            .offset(self.start.saturating_add(self.fetched));
        let rows = query.fetch_all(self.db).await?;
        let count = rows.len() as u64;
        self.fetched = self.fetched.saturating_add(count);
        if count < take {
            self.done = true;
        }
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(rows))
    }
}

pub struct RowCursor<'db> {
    pages: PageStream<'db>,
    buffer: VecDeque<Row>,
}

impl RowCursor<'_> {
    pub async fn next(&mut self) -> Result<Option<Row>, MapperError> {
        if self.buffer.is_empty() {
            if let Some(rows) = self.pages.next_page().await? {
                self.buffer.extend(rows);
            }
        }
        Ok(self.buffer.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockConnection, row};
    use crate::Value;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    /// Five rows served through LIMIT/OFFSET.
    fn database() -> (Database, Arc<MockConnection>) {
        let conn = Arc::new(MockConnection::new(|sql, _| {
            if sql.contains("information_schema.tables") {
                return Ok(vec![row(&[("aggregate", json!(1))])]);
            }
            let number = |keyword: &str| {
                sql.split(keyword)
                    .nth(1)
                    .and_then(|rest| rest.split_whitespace().next())
                    .and_then(|n| n.parse::<usize>().ok())
            };
            let limit = number("LIMIT ").unwrap_or(usize::MAX);
            let offset = number("OFFSET ").unwrap_or(0);
            Ok((1..=5)
                .skip(offset)
                .take(limit)
                .map(|id| row(&[("id", json!(id))]))
                .collect())
        }));
        (Database::from_shared(conn.clone()), conn)
    }

    #[tokio::test]
    async fn chunk_visits_every_row_once() {
        let (db, _) = database();
        let mut seen = Vec::new();
        QueryBuilder::table("items")
            .chunk(&db, 2, |rows| {
                seen.push(rows.len());
                Ok(true)
            })
            .await
            .unwrap();
        assert_eq!(seen, vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn chunk_stops_when_the_callback_declines() {
        let (db, conn) = database();
        let mut calls = 0;
        QueryBuilder::table("items")
            .chunk(&db, 2, |_| {
                calls += 1;
                Ok(false)
            })
            .await
            .unwrap();
        assert_eq!(calls, 1);
        let selects = conn
            .statements()
            .into_iter()
            .filter(|s| s.starts_with("SELECT *"))
            .count();
        assert_eq!(selects, 1);
    }

    #[tokio::test]
    async fn cursor_yields_rows_in_order() {
        let (db, _) = database();
        let mut cursor = QueryBuilder::table("items").cursor(&db, 2).await.unwrap();
        let mut ids = Vec::new();
        while let Some(row) = cursor.next().await.unwrap() {
            ids.push(Value::from(&row["id"]));
        }
        assert_eq!(ids, (1..=5).map(Value::Int).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn builder_limit_and_offset_bound_the_walk() {
        let (db, conn) = database();
        let mut seen = Vec::new();
        QueryBuilder::table("items")
            .offset(1)
            .limit(3)
            .chunk(&db, 2, |rows| {
                seen.extend(rows.iter().map(|r| Value::from(&r["id"])));
                Ok(true)
            })
            .await
            .unwrap();
        assert_eq!(seen, vec![Value::Int(2), Value::Int(3), Value::Int(4)]);

        let selects: Vec<String> = conn
            .statements()
            .into_iter()
            .filter(|s| s.starts_with("SELECT *"))
            .collect();
        assert_eq!(
            selects,
            vec![
                "SELECT * FROM items LIMIT 2 OFFSET 1",
                "SELECT * FROM items LIMIT 1 OFFSET 3",
            ]
        );
    }

    #[tokio::test]
    async fn exact_multiple_ends_with_an_empty_probe() {
        let (db, _) = database();
        let mut pages = QueryBuilder::table("items").pages(&db, 5).await.unwrap();
        assert_eq!(pages.next_page().await.unwrap().map(|p| p.len()), Some(5));
        assert_eq!(pages.next_page().await.unwrap(), None);
    }
}
