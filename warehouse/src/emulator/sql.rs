//! A small SELECT evaluator over JSON rows.
//!
//! Statements are parsed with `sqlparser` and lowered to the supported subset: `SELECT *`,
//! column lists, `COUNT(*)`, literals, `AS` aliases, an optional single table `FROM`, `WHERE`
//! with `AND`ed comparisons and `IS [NOT] NULL`, `ORDER BY` on one column and `LIMIT`.

use std::cmp::Ordering;

use serde_json::{Map, Number, Value};
use sqlparser::ast::{
    BinaryOperator, Expr, FunctionArg, FunctionArgExpr, FunctionArguments, GroupByExpr, OrderByKind, Query,
    SelectItem, SetExpr, Statement, TableFactor, UnaryOperator, Value as SqlValue,
};

use crate::schema::{Field, FieldMode, FieldType, Schema};

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Select {
    items: Vec<Item>,
    pub(crate) from: Option<Vec<String>>,
    filters: Vec<Filter>,
    order_by: Option<(String, bool)>,
    limit: Option<usize>,
}

#[derive(Clone, Debug, PartialEq)]
enum Item {
    Wildcard,
    Count(Option<String>),
    Column { name: String, alias: Option<String> },
    Literal { value: Value, alias: Option<String> },
}

#[derive(Clone, Debug, PartialEq)]
enum Operand {
    Column(String),
    Literal(Value),
}

#[derive(Clone, Debug, PartialEq)]
enum Filter {
    Compare(Operand, String, Operand),
    IsNull(Operand, bool),
}

/// Output of a statement: the result schema and one JSON value per column and row.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ResultSet {
    pub schema: Schema,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    /// Rows as JSON objects keyed by column name.
    pub(crate) fn to_objects(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.schema
                    .fields()
                    .iter()
                    .zip(row)
                    .map(|(f, v)| (f.name.clone(), v.clone()))
                    .collect()
            })
            .collect()
    }
}

pub(crate) fn parse(query: &str) -> Result<Select, String> {
    let mut statements = crate::sql::parse(query).map_err(|e| format!("Syntax error: {e}"))?;
    if statements.len() != 1 {
        return Err(format!("Expected one statement but got {}", statements.len()));
    }
    match statements.pop() {
        Some(Statement::Query(query)) => lower(&query),
        Some(other) => Err(format!("Unsupported statement: {other}")),
        None => Err("Syntax error: empty statement".to_string()),
    }
}

fn lower(query: &Query) -> Result<Select, String> {
    if query.with.is_some() {
        return Err("WITH is not supported".to_string());
    }
    if query.offset.is_some() {
        return Err("OFFSET is not supported".to_string());
    }
    let SetExpr::Select(select) = query.body.as_ref() else {
        return Err(format!("Unsupported query: {}", query.body));
    };
    if !matches!(&select.group_by, GroupByExpr::Expressions(exprs, _) if exprs.is_empty()) || select.having.is_some() {
        return Err("GROUP BY is not supported".to_string());
    }

    let items = select.projection.iter().map(item).collect::<Result<Vec<_>, _>>()?;

    let from = match select.from.as_slice() {
        [] => None,
        [table] if table.joins.is_empty() => match &table.relation {
            TableFactor::Table { name, .. } => Some(crate::sql::path(name)),
            other => return Err(format!("Unsupported FROM item: {other}")),
        },
        _ => return Err("Joins are not supported".to_string()),
    };

    let mut filters = vec![];
    if let Some(selection) = &select.selection {
        conjuncts(selection, &mut filters)?;
    }

    let order_by = match &query.order_by {
        None => None,
        Some(order_by) => match &order_by.kind {
            OrderByKind::Expressions(exprs) => match exprs.as_slice() {
                [expr] => match operand(&expr.expr)? {
                    Operand::Column(column) => Some((column, expr.options.asc == Some(false))),
                    Operand::Literal(_) => return Err("ORDER BY literal is not supported".to_string()),
                },
                _ => return Err("ORDER BY supports a single column".to_string()),
            },
            OrderByKind::All(_) => return Err("ORDER BY ALL is not supported".to_string()),
        },
    };

    let limit = match &query.limit {
        None => None,
        Some(expr) => match operand(expr)? {
            Operand::Literal(Value::Number(n)) if n.as_u64().is_some() => n.as_u64().map(|n| n as usize),
            _ => return Err(format!("LIMIT expects a non-negative integer, got {expr}")),
        },
    };

    Ok(Select {
        items,
        from,
        filters,
        order_by,
        limit,
    })
}

fn item(item: &SelectItem) -> Result<Item, String> {
    let (expr, alias) = match item {
        SelectItem::Wildcard(_) => return Ok(Item::Wildcard),
        SelectItem::UnnamedExpr(expr) => (expr, None),
        SelectItem::ExprWithAlias { expr, alias } => (expr, Some(alias.value.clone())),
        other => return Err(format!("Unsupported select item: {other}")),
    };
    if is_count_star(expr) {
        return Ok(Item::Count(alias));
    }
    Ok(match operand(expr)? {
        Operand::Column(name) => Item::Column { name, alias },
        Operand::Literal(value) => Item::Literal { value, alias },
    })
}

fn is_count_star(expr: &Expr) -> bool {
    let Expr::Function(function) = expr else {
        return false;
    };
    let FunctionArguments::List(list) = &function.args else {
        return false;
    };
    crate::sql::path(&function.name).join(".").eq_ignore_ascii_case("COUNT")
        && matches!(list.args.as_slice(), [FunctionArg::Unnamed(FunctionArgExpr::Wildcard)])
}

fn operand(expr: &Expr) -> Result<Operand, String> {
    match expr {
        Expr::Identifier(ident) => Ok(Operand::Column(ident.value.clone())),
        Expr::CompoundIdentifier(idents) => idents
            .last()
            .map(|ident| Operand::Column(ident.value.clone()))
            .ok_or_else(|| "Syntax error: empty identifier".to_string()),
        Expr::Nested(inner) => operand(inner),
        Expr::Value(value) => literal(&value.value, false).map(Operand::Literal),
        Expr::UnaryOp {
            op: UnaryOperator::Minus,
            expr: inner,
        } => match inner.as_ref() {
            Expr::Value(value) => literal(&value.value, true).map(Operand::Literal),
            other => Err(format!("Unsupported expression: -{other}")),
        },
        other => Err(format!("Unsupported expression: {other}")),
    }
}

fn literal(value: &SqlValue, negative: bool) -> Result<Value, String> {
    match value {
        SqlValue::Number(n, _) => {
            let text = if negative { format!("-{n}") } else { n.clone() };
            number(&text).ok_or_else(|| format!("Syntax error: invalid number {text}"))
        }
        _ if negative => Err(format!("Syntax error: cannot negate {value}")),
        SqlValue::SingleQuotedString(s)
        | SqlValue::DoubleQuotedString(s)
        | SqlValue::TripleSingleQuotedString(s)
        | SqlValue::TripleDoubleQuotedString(s) => Ok(Value::String(s.clone())),
        SqlValue::Boolean(b) => Ok(Value::Bool(*b)),
        SqlValue::Null => Ok(Value::Null),
        other => Err(format!("Unsupported literal: {other}")),
    }
}

/// Flattens `AND` chains into filters.
fn conjuncts(expr: &Expr, filters: &mut Vec<Filter>) -> Result<(), String> {
    match expr {
        Expr::Nested(inner) => conjuncts(inner, filters),
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            conjuncts(left, filters)?;
            conjuncts(right, filters)
        }
        Expr::IsNull(inner) => {
            filters.push(Filter::IsNull(operand(inner)?, false));
            Ok(())
        }
        Expr::IsNotNull(inner) => {
            filters.push(Filter::IsNull(operand(inner)?, true));
            Ok(())
        }
        Expr::BinaryOp { left, op, right } => {
            let op = match op {
                BinaryOperator::Eq => "=",
                BinaryOperator::NotEq => "!=",
                BinaryOperator::Lt => "<",
                BinaryOperator::LtEq => "<=",
                BinaryOperator::Gt => ">",
                BinaryOperator::GtEq => ">=",
                other => return Err(format!("Unsupported operator: {other}")),
            };
            filters.push(Filter::Compare(operand(left)?, op.to_string(), operand(right)?));
            Ok(())
        }
        other => Err(format!("Unsupported condition: {other}")),
    }
}

fn number(text: &str) -> Option<Value> {
    if let Ok(i) = text.parse::<i64>() {
        return Some(Value::Number(i.into()));
    }
    text.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number)
}

impl Select {
    /// Evaluates the statement over `input`, which must be given when the statement has a `FROM`.
    pub(crate) fn evaluate(&self, input: Option<(&Schema, &[Map<String, Value>])>) -> Result<ResultSet, String> {
        let empty = Schema::default();
        let single = [Map::new()];
        let (source_schema, source_rows) = match input {
            Some((schema, rows)) => (schema, rows),
            None => (&empty, &single[..]),
        };

        let mut rows: Vec<&Map<String, Value>> = vec![];
        for row in source_rows {
            if self.matches(source_schema, row)? {
                rows.push(row);
            }
        }

        let aggregate = self.items.iter().any(|i| matches!(i, Item::Count(_)));
        if aggregate {
            if let Some(item) = self
                .items
                .iter()
                .find(|i| matches!(i, Item::Wildcard | Item::Column { .. }))
            {
                return Err(format!(
                    "SELECT list expression {item:?} references a column which is neither grouped nor aggregated"
                ));
            }
        }

        if let Some((column, descending)) = &self.order_by {
            let source = self.source_column(column);
            resolve(source_schema, &source)?;
            rows.sort_by(|a, b| {
                let ordering = order(lookup(a, &source), lookup(b, &source));
                if *descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        let schema = self.output_schema(source_schema)?;
        let mut output: Vec<Vec<Value>> = if aggregate {
            vec![self.project_aggregate(rows.len())]
        } else {
            rows.iter().map(|row| self.project(source_schema, row)).collect()
        };
        if let Some(limit) = self.limit {
            output.truncate(limit);
        }
        Ok(ResultSet { schema, rows: output })
    }

    /// Maps an output alias back to the column it selects.
    fn source_column(&self, name: &str) -> String {
        self.items
            .iter()
            .find_map(|item| match item {
                Item::Column {
                    name: source,
                    alias: Some(alias),
                } if alias.eq_ignore_ascii_case(name) => Some(source.clone()),
                _ => None,
            })
            .unwrap_or_else(|| name.to_string())
    }

    fn matches(&self, schema: &Schema, row: &Map<String, Value>) -> Result<bool, String> {
        for filter in &self.filters {
            let keep = match filter {
                Filter::IsNull(operand, negated) => operand_value(schema, row, operand)?.is_null() != *negated,
                Filter::Compare(left, op, right) => {
                    let left = operand_value(schema, row, left)?;
                    let right = operand_value(schema, row, right)?;
                    match compare(&left, &right) {
                        Some(ordering) => match op.as_str() {
                            "=" => ordering == Ordering::Equal,
                            "!=" | "<>" => ordering != Ordering::Equal,
                            "<" => ordering == Ordering::Less,
                            "<=" => ordering != Ordering::Greater,
                            ">" => ordering == Ordering::Greater,
                            _ => ordering != Ordering::Less,
                        },
                        None => false,
                    }
                }
            };
            if !keep {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn output_schema(&self, source: &Schema) -> Result<Schema, String> {
        let mut fields = vec![];
        let mut anonymous = 0;
        let mut anonymous_name = || {
            let name = format!("f{anonymous}_");
            anonymous += 1;
            name
        };
        for item in &self.items {
            match item {
                Item::Wildcard => {
                    if source.is_empty() {
                        return Err("SELECT * must have a FROM clause".to_string());
                    }
                    fields.extend(source.fields().iter().cloned());
                }
                Item::Count(alias) => {
                    let name = alias.clone().unwrap_or_else(&mut anonymous_name);
                    fields.push(Field::new(name, FieldType::Integer));
                }
                Item::Column { name, alias } => {
                    let mut field = resolve(source, name)?.clone();
                    if let Some(alias) = alias {
                        field.name = alias.clone();
                    }
                    if field.mode == FieldMode::Required {
                        field.mode = FieldMode::Nullable;
                    }
                    fields.push(field);
                }
                Item::Literal { value, alias } => {
                    let name = alias.clone().unwrap_or_else(&mut anonymous_name);
                    let field_type = match value {
                        Value::Bool(_) => FieldType::Boolean,
                        Value::Number(n) if n.is_i64() => FieldType::Integer,
                        Value::Number(_) => FieldType::Float,
                        _ => FieldType::String,
                    };
                    fields.push(Field::new(name, field_type));
                }
            }
        }
        Ok(Schema::new(fields))
    }

    fn project(&self, schema: &Schema, row: &Map<String, Value>) -> Vec<Value> {
        let mut values = vec![];
        for item in &self.items {
            match item {
                Item::Wildcard => values.extend(schema.fields().iter().map(|f| lookup(row, &f.name).clone())),
                Item::Column { name, .. } => values.push(lookup(row, name).clone()),
                Item::Literal { value, .. } => values.push(value.clone()),
                Item::Count(_) => values.push(Value::Null),
            }
        }
        values
    }

    fn project_aggregate(&self, count: usize) -> Vec<Value> {
        self.items
            .iter()
            .map(|item| match item {
                Item::Count(_) => Value::Number((count as u64).into()),
                Item::Literal { value, .. } => value.clone(),
                _ => Value::Null,
            })
            .collect()
    }
}

fn resolve<'a>(schema: &'a Schema, name: &str) -> Result<&'a Field, String> {
    schema
        .field(name)
        .ok_or_else(|| format!("Unrecognized name: {name}"))
}

fn operand_value(schema: &Schema, row: &Map<String, Value>, operand: &Operand) -> Result<Value, String> {
    match operand {
        Operand::Literal(value) => Ok(value.clone()),
        Operand::Column(name) => {
            resolve(schema, name)?;
            Ok(lookup(row, name).clone())
        }
    }
}

pub(crate) fn lookup<'a>(row: &'a Map<String, Value>, name: &str) -> &'a Value {
    row.get(name)
        .or_else(|| row.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v))
        .unwrap_or(&Value::Null)
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    let as_f64 = |v: &Value| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    };
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Number(_), _) | (_, Value::Number(_)) => as_f64(left)?.partial_cmp(&as_f64(right)?),
        _ => None,
    }
}

/// NULLs sort first.
fn order(left: &Value, right: &Value) -> Ordering {
    match (left.is_null(), right.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => compare(left, right).unwrap_or(Ordering::Equal),
    }
}
