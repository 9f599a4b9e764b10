use std::collections::VecDeque;
use std::sync::Arc;

use futures_util::Stream;

use crate::error::Error;
use crate::http::job::get_query_results::GetQueryResultsRequest;
use crate::http::table::TableSchema;
use crate::http::tabledata::Tuple;
use crate::query::row::Row;
use crate::service::WarehouseService;

/// Rows of a finished query, read page by page.
///
/// Buffered rows are returned without any request; the next page is fetched with
/// `jobs.getQueryResults` only once the buffer is drained. The iterator is forward only and
/// cannot be restarted, run the query again to read the rows again.
pub struct QueryIterator {
    pub(crate) service: Arc<dyn WarehouseService>,
    pub(crate) project_id: String,
    pub(crate) job_id: String,
    pub(crate) request: GetQueryResultsRequest,
    pub(crate) chunk: VecDeque<Tuple>,
    pub(crate) columns: Arc<[String]>,
    pub total_size: u64,
}

impl std::fmt::Debug for QueryIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryIterator")
            .field("project_id", &self.project_id)
            .field("job_id", &self.job_id)
            .field("buffered", &self.chunk.len())
            .field("columns", &self.columns)
            .field("total_size", &self.total_size)
            .finish_non_exhaustive()
    }
}

impl QueryIterator {
    pub(crate) fn columns_of(schema: Option<&TableSchema>) -> Arc<[String]> {
        schema
            .map(|s| s.fields.iter().map(|f| f.name.clone()).collect::<Vec<_>>())
            .unwrap_or_default()
            .into()
    }

    /// Column names in result order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn next(&mut self) -> Result<Option<Row>, Error> {
        loop {
            if let Some(v) = self.chunk.pop_front() {
                return Ok(Some(Row::new(v, self.columns.clone())));
            }
            if self.request.page_token.is_none() {
                return Ok(None);
            }
            tracing::trace!(job_id = %self.job_id, page_token = ?self.request.page_token, "fetching next page");
            let response = self
                .service
                .get_query_results(self.project_id.as_str(), self.job_id.as_str(), &self.request)
                .await?;
            self.request.page_token = response.page_token;
            match response.rows {
                Some(rows) => self.chunk = VecDeque::from(rows),
                None => return Ok(None),
            }
        }
    }

    pub fn into_stream(mut self) -> impl Stream<Item = Result<Row, Error>> + Send {
        async_stream::try_stream! {
            while let Some(row) = self.next().await? {
                yield row;
            }
        }
    }
}

pub mod row {
    use std::sync::Arc;

    use crate::http::tabledata::{Cell, Tuple};
    use crate::query::value::{Decodable, StructDecodable};

    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        #[error("no data found: {0}")]
        UnexpectedColumnIndex(usize),
        #[error("no such column: {0}")]
        UnexpectedColumnName(String),
        #[error(transparent)]
        Value(#[from] super::value::Error),
    }

    /// One result row. Cells are addressable by position and by column name, both read the same cell.
    #[derive(Clone, Debug)]
    pub struct Row {
        inner: Vec<Cell>,
        columns: Arc<[String]>,
    }

    impl Row {
        pub(crate) fn new(value: Tuple, columns: Arc<[String]>) -> Self {
            Self { inner: value.f, columns }
        }

        pub fn len(&self) -> usize {
            self.inner.len()
        }

        pub fn is_empty(&self) -> bool {
            self.inner.is_empty()
        }

        pub fn columns(&self) -> &[String] {
            &self.columns
        }

        pub fn column<T: Decodable>(&self, index: usize) -> Result<T, Error> {
            let cell: &Cell = self.inner.get(index).ok_or(Error::UnexpectedColumnIndex(index))?;
            Ok(T::decode(&cell.v)?)
        }

        /// Exact match wins, otherwise the first case insensitive match.
        pub fn column_by_name<T: Decodable>(&self, name: &str) -> Result<T, Error> {
            let index = self
                .columns
                .iter()
                .position(|c| c == name)
                .or_else(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(name)))
                .ok_or_else(|| Error::UnexpectedColumnName(name.to_string()))?;
            self.column(index)
        }

        /// Decodes the whole row into a user type.
        pub fn decode<T: StructDecodable>(self) -> Result<T, Error> {
            Ok(T::decode(Tuple { f: self.inner })?)
        }
    }
}

pub mod value {
    use std::str::FromStr;

    use base64::prelude::BASE64_STANDARD;
    use base64::Engine;
    use bigdecimal::BigDecimal;
    use time::error::ComponentRange;
    use time::macros::format_description;
    use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};

    use crate::http::tabledata::{Tuple, Value};

    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        #[error("invalid type")]
        InvalidType,
        #[error("unexpected null value")]
        UnexpectedNullValue,
        #[error(transparent)]
        Timestamp(#[from] ComponentRange),
        #[error("invalid number {0}")]
        FromString(String),
        #[error(transparent)]
        Base64(#[from] base64::DecodeError),
        #[error(transparent)]
        ParseDateTime(#[from] time::error::Parse),
        #[error(transparent)]
        ParseBigDecimal(#[from] bigdecimal::ParseBigDecimalError),
    }

    pub trait Decodable: Sized {
        fn decode(value: &Value) -> Result<Self, Error>;
    }

    pub trait StructDecodable: Sized {
        fn decode(value: Tuple) -> Result<Self, Error>;
    }

    impl<T: StructDecodable> Decodable for T {
        fn decode(value: &Value) -> Result<Self, Error> {
            match value {
                Value::Struct(v) => T::decode(v.clone()),
                Value::Null => Err(Error::UnexpectedNullValue),
                _ => Err(Error::InvalidType),
            }
        }
    }

    fn string(value: &Value) -> Result<&str, Error> {
        match value {
            Value::String(v) => Ok(v.as_str()),
            Value::Null => Err(Error::UnexpectedNullValue),
            _ => Err(Error::InvalidType),
        }
    }

    impl Decodable for String {
        fn decode(value: &Value) -> Result<Self, Error> {
            string(value).map(str::to_string)
        }
    }

    impl Decodable for Vec<u8> {
        fn decode(value: &Value) -> Result<Self, Error> {
            Ok(BASE64_STANDARD.decode(string(value)?)?)
        }
    }

    impl Decodable for bool {
        fn decode(value: &Value) -> Result<Self, Error> {
            let v = string(value)?;
            v.to_ascii_lowercase()
                .parse::<bool>()
                .map_err(|_| Error::FromString(v.to_string()))
        }
    }

    impl Decodable for f64 {
        fn decode(value: &Value) -> Result<Self, Error> {
            let v = string(value)?;
            v.parse::<f64>().map_err(|_| Error::FromString(v.to_string()))
        }
    }

    impl Decodable for i64 {
        fn decode(value: &Value) -> Result<Self, Error> {
            let v = string(value)?;
            v.parse::<i64>().map_err(|_| Error::FromString(v.to_string()))
        }
    }

    impl Decodable for BigDecimal {
        fn decode(value: &Value) -> Result<Self, Error> {
            Ok(BigDecimal::from_str(string(value)?)?)
        }
    }

    impl Decodable for OffsetDateTime {
        fn decode(value: &Value) -> Result<Self, Error> {
            let f = f64::decode(value)?;
            let sec = f.trunc();
            // Timestamps have microsecond precision, so we must
            // return a round number of microseconds.
            let micro = ((f - sec) * 1000000.0 + 0.5).trunc();
            Ok(OffsetDateTime::from_unix_timestamp_nanos(
                sec as i128 * 1_000_000_000 + micro as i128 * 1000,
            )?)
        }
    }

    impl Decodable for Date {
        fn decode(value: &Value) -> Result<Self, Error> {
            Ok(Date::parse(string(value)?, format_description!("[year]-[month]-[day]"))?)
        }
    }

    impl Decodable for Time {
        fn decode(value: &Value) -> Result<Self, Error> {
            Ok(Time::parse(
                string(value)?,
                format_description!("[hour]:[minute]:[second][optional [.[subsecond]]]"),
            )?)
        }
    }

    impl Decodable for PrimitiveDateTime {
        fn decode(value: &Value) -> Result<Self, Error> {
            Ok(PrimitiveDateTime::parse(
                string(value)?,
                format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"),
            )?)
        }
    }

    impl<T> Decodable for Vec<T>
    where
        T: Decodable,
    {
        fn decode(value: &Value) -> Result<Self, Error> {
            match value {
                Value::Array(v) => {
                    let mut result = Vec::with_capacity(v.len());
                    for element in v {
                        result.push(T::decode(&element.v)?);
                    }
                    Ok(result)
                }
                Value::Null => Err(Error::UnexpectedNullValue),
                _ => Err(Error::InvalidType),
            }
        }
    }

    impl<T> Decodable for Option<T>
    where
        T: Decodable,
    {
        fn decode(value: &Value) -> Result<Self, Error> {
            match value {
                Value::Null => Ok(None),
                _ => Ok(Some(T::decode(value)?)),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use bigdecimal::BigDecimal;
    use time::macros::{date, datetime};
    use time::OffsetDateTime;

    use crate::http::tabledata::{Cell, Tuple, Value};
    use crate::query::row::{Error, Row};
    use crate::query::value::{self, Decodable, StructDecodable};

    fn s(v: &str) -> Cell {
        Cell {
            v: Value::String(v.to_string()),
        }
    }

    struct Pair {
        flag: bool,
        n: i64,
    }

    impl StructDecodable for Pair {
        fn decode(value: Tuple) -> Result<Self, value::Error> {
            let col = &value.f;
            Ok(Self {
                flag: bool::decode(&col[0].v)?,
                n: i64::decode(&col[1].v)?,
            })
        }
    }

    fn row() -> Row {
        let columns: Arc<[String]> = vec!["name", "age", "ts", "tags", "pair", "note", "amount", "day"]
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>()
            .into();
        let tuple = Tuple {
            f: vec![
                s("alice"),
                s("42"),
                s("1.7E9"),
                Cell {
                    v: Value::Array(vec![s("a"), s("b")]),
                },
                Cell {
                    v: Value::Struct(Tuple {
                        f: vec![s("true"), s("7")],
                    }),
                },
                Cell { v: Value::Null },
                s("-12.345"),
                s("2024-02-29"),
            ],
        };
        Row::new(tuple, columns)
    }

    #[test]
    fn index_and_name_agree() {
        let row = row();
        for (i, name) in row.columns().to_vec().iter().enumerate() {
            let by_index: Option<String> = row.column::<Option<String>>(i).ok().flatten();
            let by_name: Option<String> = row.column_by_name::<Option<String>>(name).ok().flatten();
            assert_eq!(by_index, by_name, "column {name}");
        }
        assert_eq!(row.column_by_name::<i64>("AGE").unwrap(), 42);
        assert_eq!(row.column::<String>(0).unwrap(), "alice");
    }

    #[test]
    fn typed_decoding() {
        let row = row();
        assert_eq!(
            row.column::<OffsetDateTime>(2).unwrap(),
            datetime!(2023-11-14 22:13:20 UTC)
        );
        assert_eq!(row.column::<Vec<String>>(3).unwrap(), vec!["a", "b"]);
        let pair: Pair = row.column(4).unwrap();
        assert!(pair.flag);
        assert_eq!(pair.n, 7);
        assert_eq!(row.column::<Option<i64>>(5).unwrap(), None);
        assert!(row.column::<i64>(5).is_err());
        assert_eq!(row.column::<BigDecimal>(6).unwrap().to_string(), "-12.345");
        assert_eq!(row.column::<time::Date>(7).unwrap(), date!(2024 - 02 - 29));
    }

    #[test]
    fn unknown_columns() {
        let row = row();
        assert!(matches!(row.column::<String>(99), Err(Error::UnexpectedColumnIndex(99))));
        assert!(matches!(
            row.column_by_name::<String>("missing"),
            Err(Error::UnexpectedColumnName(_))
        ));
    }
}
