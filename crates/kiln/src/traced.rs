//! Statement tracing.
//!
//! Every statement kiln sends, introspection queries and DDL alike, goes
//! through [`TracedConn`]. Each one runs inside a debug span (`db.execute`
//! or `db.query`) carrying the SQL text, and the span records the row count
//! and duration once the database answers.
//!
//! ```ignore
//! use kiln::ConnectionExt;
//!
//! let conn = pool.get().await?;
//! let rows = conn.traced().query("SELECT relname FROM pg_class", &[]).await?;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Instant;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Error, Row};
use tracing::{Instrument, Span};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, Error>> + Send + 'a>>;
type Params<'a> = &'a [&'a (dyn ToSql + Sync)];

/// Anything that can run statements: a client, a transaction, or a pooled
/// connection.
pub trait Connection: Send + Sync {
    fn execute<'a>(&'a self, sql: &'a str, params: Params<'a>) -> BoxFuture<'a, u64>;

    fn query<'a>(&'a self, sql: &'a str, params: Params<'a>) -> BoxFuture<'a, Vec<Row>>;
}

macro_rules! forward_connection {
    ($ty:ty, |$this:ident| $client:expr) => {
        impl Connection for $ty {
            fn execute<'a>(&'a self, sql: &'a str, params: Params<'a>) -> BoxFuture<'a, u64> {
                let $this = self;
                Box::pin($client.execute(sql, params))
            }

            fn query<'a>(&'a self, sql: &'a str, params: Params<'a>) -> BoxFuture<'a, Vec<Row>> {
                let $this = self;
                Box::pin($client.query(sql, params))
            }
        }
    };
}

forward_connection!(tokio_postgres::Client, |c| c);
forward_connection!(tokio_postgres::Transaction<'_>, |t| t);
// through the deref, or this would recurse into itself
forward_connection!(deadpool_postgres::Object, |o| {
    let client: &tokio_postgres::Client = o;
    client
});

/// Borrowed connection whose statements are traced.
pub struct TracedConn<'a, C: Connection> {
    conn: &'a C,
}

impl<'a, C: Connection> TracedConn<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Run a statement, returning the number of rows affected.
    pub async fn execute(&self, sql: &str, params: Params<'_>) -> Result<u64, Error> {
        let span = tracing::debug_span!(
            "db.execute",
            sql = %sql,
            params = params.len(),
            affected = tracing::field::Empty,
            elapsed_ms = tracing::field::Empty,
        );
        let started = Instant::now();
        let affected = self
            .conn
            .execute(sql, params)
            .instrument(span.clone())
            .await?;
        finish(&span, "affected", affected, started);
        Ok(affected)
    }

    /// Run a query, returning all rows.
    pub async fn query(&self, sql: &str, params: Params<'_>) -> Result<Vec<Row>, Error> {
        let span = tracing::debug_span!(
            "db.query",
            sql = %sql,
            params = params.len(),
            rows = tracing::field::Empty,
            elapsed_ms = tracing::field::Empty,
        );
        let started = Instant::now();
        let rows = self
            .conn
            .query(sql, params)
            .instrument(span.clone())
            .await?;
        finish(&span, "rows", rows.len() as u64, started);
        Ok(rows)
    }
}

fn finish(span: &Span, field: &str, count: u64, started: Instant) {
    span.record(field, count);
    span.record("elapsed_ms", started.elapsed().as_millis() as u64);
}

/// `conn.traced()` for every [`Connection`].
pub trait ConnectionExt: Connection + Sized {
    fn traced(&self) -> TracedConn<'_, Self> {
        TracedConn::new(self)
    }
}

impl<C: Connection> ConnectionExt for C {}
