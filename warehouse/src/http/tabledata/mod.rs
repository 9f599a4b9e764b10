pub mod insert_all;

/// A cell value in the `f`/`v` row encoding used by query results.
#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug)]
#[serde(untagged)]
pub enum Value {
    Null,
    String(String),
    Array(Vec<Cell>),
    Struct(Tuple),
}

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub v: Value,
}

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Tuple {
    pub f: Vec<Cell>,
}

#[cfg(test)]
mod test {
    use crate::http::tabledata::{Tuple, Value};

    #[test]
    fn decode_nested_row() {
        let body = r#"{"f":[{"v":"1"},{"v":null},{"v":[{"v":"a"},{"v":"b"}]},{"v":{"f":[{"v":"true"}]}}]}"#;
        let row: Tuple = serde_json::from_str(body).unwrap();
        assert_eq!(row.f[0].v, Value::String("1".to_string()));
        assert_eq!(row.f[1].v, Value::Null);
        match &row.f[2].v {
            Value::Array(cells) => assert_eq!(cells.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
        match &row.f[3].v {
            Value::Struct(t) => assert_eq!(t.f[0].v, Value::String("true".to_string())),
            other => panic!("unexpected {other:?}"),
        }
    }
}
