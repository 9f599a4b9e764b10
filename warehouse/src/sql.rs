//! Statement parsing with the BigQuery dialect of `sqlparser`.

use std::ops::ControlFlow;

use sqlparser::ast::{visit_relations, ObjectName, ObjectNamePart, Statement};
use sqlparser::dialect::BigQueryDialect;
use sqlparser::parser::{Parser, ParserError};

pub(crate) fn parse(sql: &str) -> Result<Vec<Statement>, ParserError> {
    Parser::parse_sql(&BigQueryDialect {}, sql)
}

/// Segments of a table name. A backtick quoted `p.d.t` is a single identifier, so every part is
/// split on dots as well.
pub(crate) fn path(name: &ObjectName) -> Vec<String> {
    name.0
        .iter()
        .flat_map(|part| match part {
            ObjectNamePart::Identifier(ident) => ident.value.split('.').map(str::to_string).collect::<Vec<_>>(),
        })
        .collect()
}

/// Every table path the statements read or write, in order of appearance, without duplicates.
/// Names of common table expressions come back as one segment paths.
pub(crate) fn referenced_tables(sql: &str) -> Result<Vec<Vec<String>>, ParserError> {
    let statements = parse(sql)?;
    let mut tables: Vec<Vec<String>> = vec![];
    for statement in &statements {
        let _ = visit_relations(statement, |name| {
            let path = path(name);
            if !tables.contains(&path) {
                tables.push(path);
            }
            ControlFlow::<()>::Continue(())
        });
    }
    Ok(tables)
}

#[cfg(test)]
mod test {
    use crate::sql::referenced_tables;

    fn paths(sql: &str) -> Vec<String> {
        referenced_tables(sql).unwrap().into_iter().map(|p| p.join(".")).collect()
    }

    #[test]
    fn finds_from_and_join_targets() {
        assert_eq!(paths("SELECT * FROM d.t"), vec!["d.t"]);
        assert_eq!(paths("select a from `p.d.t` x join p2.d2.u AS y on x.a = y.a"), vec!["p.d.t", "p2.d2.u"]);
        assert_eq!(paths("SELECT * FROM `p`.`d`.`t` WHERE a = 'FROM x.y'"), vec!["p.d.t"]);
        assert_eq!(paths("SELECT * FROM a.b, c.d LIMIT 3"), vec!["a.b", "c.d"]);
        assert_eq!(paths("SELECT * FROM (SELECT 1)"), Vec::<String>::new());
        assert_eq!(paths("SELECT * FROM (SELECT x FROM d.inner_t) AS s"), vec!["d.inner_t"]);
    }

    #[test]
    fn comments_are_not_references() {
        assert_eq!(paths("SELECT name FROM us.people /* was: SELECT name FROM eu.people */"), vec!["us.people"]);
        assert_eq!(paths("-- FROM eu.people\nSELECT name FROM us.people"), vec!["us.people"]);
        assert_eq!(paths("# old source: FROM eu.people\nSELECT name FROM us.people"), vec!["us.people"]);
    }

    #[test]
    fn common_table_expressions() {
        assert_eq!(
            paths("WITH recent AS (SELECT * FROM d.events) SELECT * FROM recent"),
            vec!["d.events", "recent"]
        );
    }

    #[test]
    fn unparseable_input_is_an_error() {
        assert!(referenced_tables("SELECT 'open FROM d.t").is_err());
        assert!(referenced_tables("SELECT a FROM d.t WHERE").is_err());
    }
}
