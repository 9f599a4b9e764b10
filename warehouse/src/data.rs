use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::client::Context;
use crate::error::Error;
use crate::http::job::get_query_results::GetQueryResultsRequest;
use crate::http::job::query::QueryRequest;
use crate::http::tabledata::insert_all::{InsertAllRequest, Row};
use crate::job;
use crate::location::Location;
use crate::query::QueryIterator;
use crate::schema::Schema;

/// Why one row of [`DataOperations::insert_rows`] was not stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowError {
    /// Position of the row in the input slice.
    pub index: usize,
    pub errors: Vec<RowErrorDetail>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowErrorDetail {
    pub reason: String,
    pub location: String,
    pub message: String,
}

#[derive(Clone, Debug)]
pub struct DataOperations {
    ctx: Arc<Context>,
}

impl DataOperations {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Streams `rows` into a table.
    ///
    /// Every row is checked against the table schema first. Rows that do not match are reported
    /// with reason `invalid` and never sent; the others are inserted. An empty result means every
    /// row was stored.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn insert_rows<T: Serialize>(
        &self,
        dataset_id: &str,
        table_id: &str,
        rows: &[T],
    ) -> Result<Vec<RowError>, Error> {
        if rows.is_empty() {
            return Err(Error::validation("no rows to insert"));
        }
        let table = self
            .ctx
            .service
            .get_table(&self.ctx.project_id, dataset_id, table_id)
            .await?;
        let schema = Schema::from_wire(table.schema.as_ref());

        let mut row_errors = vec![];
        let mut sent = vec![];
        let mut request = InsertAllRequest::<serde_json::Value> {
            skip_invalid_rows: Some(true),
            ..Default::default()
        };
        for (index, row) in rows.iter().enumerate() {
            let json = serde_json::to_value(row)
                .map_err(|e| Error::validation(format!("row {index} cannot be serialized: {e}")))?;
            let violations = schema.check_row(&json);
            if !violations.is_empty() {
                row_errors.push(RowError {
                    index,
                    errors: violations
                        .into_iter()
                        .map(|v| RowErrorDetail {
                            reason: "invalid".to_string(),
                            location: v.location,
                            message: v.message,
                        })
                        .collect(),
                });
                continue;
            }
            sent.push(index);
            request.rows.push(Row {
                insert_id: Some(uuid::Uuid::new_v4().to_string()),
                json,
            });
        }

        if !request.rows.is_empty() {
            let response = self
                .ctx
                .service
                .insert_all(&self.ctx.project_id, dataset_id, table_id, &request)
                .await?;
            for error in response.insert_errors.unwrap_or_default() {
                let Some(&index) = sent.get(error.index) else {
                    tracing::warn!(index = error.index, "insert error for a row that was not sent");
                    continue;
                };
                row_errors.push(RowError {
                    index,
                    errors: error
                        .errors
                        .into_iter()
                        .map(|e| RowErrorDetail {
                            reason: e.reason,
                            location: e.location,
                            message: e.message,
                        })
                        .collect(),
                });
            }
        }
        row_errors.sort_by_key(|e| e.index);
        tracing::debug!(
            dataset_id,
            table_id,
            inserted = rows.len() - row_errors.len(),
            rejected = row_errors.len(),
            "rows inserted"
        );
        Ok(row_errors)
    }

    /// Runs a standard SQL query in `location` and returns an iterator over its rows.
    ///
    /// Waits until the job is DONE or `timeout` passes, in which case [`Error::Timeout`] is
    /// returned.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn run_query(
        &self,
        query: &str,
        location: Location,
        timeout: Option<Duration>,
    ) -> Result<QueryIterator, Error> {
        if query.trim().is_empty() {
            return Err(Error::validation("query must not be empty"));
        }
        let request = QueryRequest {
            query: query.to_string(),
            use_legacy_sql: false,
            location: location.to_string(),
            timeout_ms: timeout.map(|t| t.as_millis() as i64),
            request_id: Some(uuid::Uuid::new_v4().to_string()),
            ..Default::default()
        };
        let response = self.ctx.service.query(&self.ctx.project_id, &request).await?;
        let job_id = response.job_reference.job_id.clone();
        let mut request = GetQueryResultsRequest {
            location: Some(location.to_string()),
            ..Default::default()
        };

        let (schema, total_rows, rows, page_token) = if response.job_complete {
            (response.schema, response.total_rows, response.rows, response.page_token)
        } else {
            tracing::debug!(job_id = %job_id, "query still running");
            let job = self
                .ctx
                .service
                .get_job(&self.ctx.project_id, &job_id, Some(location.as_str()))
                .await?;
            job::wait(self.ctx.service.as_ref(), job, self.ctx.job_poll_interval, timeout).await?;
            let first = self
                .ctx
                .service
                .get_query_results(&self.ctx.project_id, &job_id, &request)
                .await?;
            (first.schema, first.total_rows, first.rows, first.page_token)
        };
        request.page_token = page_token;

        Ok(QueryIterator {
            service: self.ctx.service.clone(),
            project_id: self.ctx.project_id.clone(),
            job_id,
            request,
            chunk: VecDeque::from(rows.unwrap_or_default()),
            columns: QueryIterator::columns_of(schema.as_ref()),
            total_size: total_rows.unwrap_or_default(),
        })
    }
}
