use std::collections::HashMap;

use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, LimitClause, ObjectNamePart, SetExpr, Statement,
    TableFactor, TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertCampground {
        id: Ulid,
        name: Option<String>,
        max_reservations: u32,
    },
    UpdateCampground {
        id: Ulid,
        name: Option<String>,
        max_reservations: Option<u32>,
        /// `Some(None)` clears the rating.
        rating: Option<Option<f64>>,
    },
    DeleteCampground {
        id: Ulid,
    },
    InsertTag {
        id: Ulid,
        name: String,
    },
    DeleteTag {
        id: Ulid,
    },
    AttachTag {
        campground_id: Ulid,
        tag_id: Ulid,
    },
    DetachTag {
        campground_id: Ulid,
        tag_id: Ulid,
    },
    InsertReservation {
        id: Ulid,
        campground_id: Ulid,
        user_id: String,
        start: Ms,
        end: Ms,
        count: u32,
    },
    SetReservationStatus {
        id: Ulid,
        status: ReservationStatus,
    },
    CancelReservation {
        id: Ulid,
    },
    SelectCampgrounds {
        id: Option<Ulid>,
    },
    SelectTags,
    SelectReservations {
        campground_id: Option<Ulid>,
        id: Option<Ulid>,
    },
    SelectOccupancy {
        campground_id: Ulid,
        start: Ms,
        end: Ms,
    },
    SelectAvailability {
        campground_id: Ulid,
        start: Ms,
        end: Ms,
        count: u32,
    },
    SelectSimilar {
        campground_id: Ulid,
        limit: Option<usize>,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let stmt = parse_statement(sql)?;
    match &stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(&table.relation, assignments, selection.as_ref()),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

/// Table a SELECT reads from, without validating its filters. Used to
/// describe result columns of prepared statements whose parameters are
/// still placeholders.
pub fn select_table(sql: &str) -> Option<String> {
    match parse_statement(sql).ok()? {
        Statement::Query(query) => match query.body.as_ref() {
            SetExpr::Select(s) => table_factor_name(&s.from.first()?.relation).ok(),
            _ => None,
        },
        _ => None,
    }
}

fn parse_statement(sql: &str) -> Result<Statement, SqlError> {
    let dialect = PostgreSqlDialect {};
    let mut stmts =
        Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }
    Ok(stmts.swap_remove(0))
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    match table.as_str() {
        "campgrounds" => {
            let row = insert_row(insert, &["id", "name", "max_reservations"])?;
            Ok(Command::InsertCampground {
                id: parse_ulid(row.required("id")?)?,
                name: row.get("name").map(parse_string_or_null).transpose()?.flatten(),
                max_reservations: parse_u32(row.required("max_reservations")?)?,
            })
        }
        "tags" => {
            let row = insert_row(insert, &["id", "name"])?;
            Ok(Command::InsertTag {
                id: parse_ulid(row.required("id")?)?,
                name: parse_string(row.required("name")?)?,
            })
        }
        "campground_tags" => {
            let row = insert_row(insert, &["campground_id", "tag_id"])?;
            Ok(Command::AttachTag {
                campground_id: parse_ulid(row.required("campground_id")?)?,
                tag_id: parse_ulid(row.required("tag_id")?)?,
            })
        }
        "reservations" => {
            let row = insert_row(
                insert,
                &["id", "campground_id", "user_id", "start", "end", "count"],
            )?;
            Ok(Command::InsertReservation {
                id: parse_ulid(row.required("id")?)?,
                campground_id: parse_ulid(row.required("campground_id")?)?,
                user_id: parse_string(row.required("user_id")?)?,
                start: parse_instant_expr(row.required("start")?)?,
                end: parse_instant_expr(row.required("end")?)?,
                count: row.get("count").map(parse_u32).transpose()?.unwrap_or(1),
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let filters = Filters::from_selection(delete.selection.as_ref())?;

    match table.as_str() {
        "campgrounds" => Ok(Command::DeleteCampground {
            id: filters.ulid("id")?,
        }),
        "tags" => Ok(Command::DeleteTag {
            id: filters.ulid("id")?,
        }),
        "campground_tags" => Ok(Command::DetachTag {
            campground_id: filters.ulid("campground_id")?,
            tag_id: filters.ulid("tag_id")?,
        }),
        "reservations" => Ok(Command::CancelReservation {
            id: filters.ulid("id")?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_update(
    relation: &TableFactor,
    assignments: &[ast::Assignment],
    selection: Option<&Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(relation)?;
    let filters = Filters::from_selection(selection)?;
    let mut set: HashMap<String, &Expr> = HashMap::new();
    for a in assignments {
        let col = match &a.target {
            AssignmentTarget::ColumnName(name) => object_name_last(name),
            AssignmentTarget::Tuple(_) => None,
        }
        .ok_or_else(|| SqlError::Unsupported("tuple assignment".into()))?;
        set.insert(col, &a.value);
    }

    match table.as_str() {
        "campgrounds" => {
            let id = filters.ulid("id")?;
            let mut name = None;
            let mut max_reservations = None;
            let mut rating = None;
            for (col, value) in set {
                match col.as_str() {
                    "name" => name = parse_string_or_null(value)?,
                    "max_reservations" => max_reservations = Some(parse_u32(value)?),
                    "rating" => rating = Some(parse_f64_or_null(value)?),
                    other => return Err(SqlError::Unsupported(format!("cannot set {other}"))),
                }
            }
            Ok(Command::UpdateCampground {
                id,
                name,
                max_reservations,
                rating,
            })
        }
        "reservations" => {
            let id = filters.ulid("id")?;
            let value = set.get("status").ok_or(SqlError::MissingColumn("status"))?;
            if set.len() > 1 {
                return Err(SqlError::Unsupported("only status can be updated".into()));
            }
            let status = parse_string(value)?
                .parse::<ReservationStatus>()
                .map_err(SqlError::Parse)?;
            Ok(Command::SetReservationStatus { id, status })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;
    let filters = Filters::from_selection(select.selection.as_ref())?;

    match table.as_str() {
        "campgrounds" => Ok(Command::SelectCampgrounds {
            id: filters.ulid_opt("id")?,
        }),
        "tags" => Ok(Command::SelectTags),
        "reservations" => {
            let campground_id = filters.ulid_opt("campground_id")?;
            let id = filters.ulid_opt("id")?;
            if campground_id.is_none() && id.is_none() {
                return Err(SqlError::MissingFilter("campground_id or id"));
            }
            Ok(Command::SelectReservations { campground_id, id })
        }
        "occupancy" => Ok(Command::SelectOccupancy {
            campground_id: filters.ulid("campground_id")?,
            start: filters.instant_gte("start")?,
            end: filters.instant_lte("end")?,
        }),
        "availability" => Ok(Command::SelectAvailability {
            campground_id: filters.ulid("campground_id")?,
            start: filters.instant_gte("start")?,
            end: filters.instant_lte("end")?,
            count: match filters.eq.get("count") {
                Some(e) => parse_u32(e)?,
                None => 1,
            },
        }),
        "similar_campgrounds" => Ok(Command::SelectSimilar {
            campground_id: filters.ulid("campground_id")?,
            limit: query_limit(query)?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn query_limit(query: &ast::Query) -> Result<Option<usize>, SqlError> {
    let expr = match &query.limit_clause {
        Some(LimitClause::LimitOffset { limit: Some(e), .. }) => e,
        Some(LimitClause::OffsetCommaLimit { limit, .. }) => limit,
        _ => return Ok(None),
    };
    let n = parse_i64(expr)?;
    usize::try_from(n)
        .map(Some)
        .map_err(|_| SqlError::Parse(format!("bad LIMIT: {n}")))
}

// ── Filters ───────────────────────────────────────────────────

/// Column predicates from a conjunction of `col = v`, `col >= v`, `col <= v`.
#[derive(Default)]
struct Filters {
    eq: HashMap<String, Expr>,
    gte: HashMap<String, Expr>,
    lte: HashMap<String, Expr>,
}

impl Filters {
    fn from_selection(selection: Option<&Expr>) -> Result<Self, SqlError> {
        let mut filters = Filters::default();
        if let Some(expr) = selection {
            filters.collect(expr)?;
        }
        Ok(filters)
    }

    fn collect(&mut self, expr: &Expr) -> Result<(), SqlError> {
        match expr {
            Expr::Nested(inner) => self.collect(inner),
            Expr::BinaryOp { left, op, right } => {
                let target = match op {
                    ast::BinaryOperator::And => {
                        self.collect(left)?;
                        return self.collect(right);
                    }
                    ast::BinaryOperator::Eq => &mut self.eq,
                    ast::BinaryOperator::GtEq => &mut self.gte,
                    ast::BinaryOperator::LtEq => &mut self.lte,
                    other => return Err(SqlError::Unsupported(format!("operator {other}"))),
                };
                let col = expr_column_name(left)
                    .ok_or_else(|| SqlError::Parse(format!("expected column, got {left}")))?;
                target.insert(col, right.as_ref().clone());
                Ok(())
            }
            other => Err(SqlError::Unsupported(format!("filter {other}"))),
        }
    }

    fn ulid(&self, col: &'static str) -> Result<Ulid, SqlError> {
        self.ulid_opt(col)?.ok_or(SqlError::MissingFilter(col))
    }

    fn ulid_opt(&self, col: &'static str) -> Result<Option<Ulid>, SqlError> {
        self.eq.get(col).map(parse_ulid).transpose()
    }

    fn instant_gte(&self, col: &'static str) -> Result<Ms, SqlError> {
        let expr = self.gte.get(col).ok_or(SqlError::MissingFilter(col))?;
        parse_instant_expr(expr)
    }

    fn instant_lte(&self, col: &'static str) -> Result<Ms, SqlError> {
        let expr = self.lte.get(col).ok_or(SqlError::MissingFilter(col))?;
        parse_instant_expr(expr)
    }
}

/// One VALUES row keyed by column name. Without an explicit column list the
/// values are taken positionally in `default_columns` order.
struct Row {
    values: HashMap<String, Expr>,
}

impl Row {
    fn get(&self, col: &str) -> Option<&Expr> {
        self.values.get(col)
    }

    fn required(&self, col: &'static str) -> Result<&Expr, SqlError> {
        self.get(col).ok_or(SqlError::MissingColumn(col))
    }
}

fn insert_row(insert: &ast::Insert, default_columns: &[&str]) -> Result<Row, SqlError> {
    let exprs = extract_insert_values(insert)?;
    let columns: Vec<String> = if insert.columns.is_empty() {
        default_columns.iter().map(|c| c.to_string()).collect()
    } else {
        insert.columns.iter().map(|c| c.value.to_lowercase()).collect()
    };
    if exprs.len() > columns.len() {
        return Err(SqlError::WrongArity(columns.len(), exprs.len()));
    }
    let mut values = HashMap::new();
    for (col, expr) in columns.into_iter().zip(exprs) {
        if !default_columns.contains(&col.as_str()) {
            return Err(SqlError::Parse(format!("unknown column: {col}")));
        }
        values.insert(col, expr);
    }
    Ok(Row { values })
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [] => Err(SqlError::Parse("empty VALUES".into())),
            [row] => Ok(row.clone()),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) | Some(Value::Number(s, _)) => {
            Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
        }
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    parse_string_or_null(expr)?.ok_or_else(|| SqlError::Parse("unexpected NULL".into()))
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        Some(Value::SingleQuotedString(s)) => Ok(Some(s.clone())),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) | Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad integer {s}: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr}")))
    }
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64(expr)?;
    u32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u32 range")))
}

fn parse_f64_or_null(expr: &Expr) -> Result<Option<f64>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        Some(Value::Number(s, _)) | Some(Value::SingleQuotedString(s)) => s
            .parse()
            .map(Some)
            .map_err(|e| SqlError::Parse(format!("bad number {s}: {e}"))),
        Some(value) => Err(SqlError::Parse(format!("expected number, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

/// Dates, RFC 3339 timestamps and Unix milliseconds all land on `Ms`.
fn parse_instant_expr(expr: &Expr) -> Result<Ms, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) | Some(Value::Number(s, _)) => {
            parse_instant(s).ok_or_else(|| SqlError::Parse(format!("bad date: {s}")))
        }
        _ => parse_i64(expr),
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(usize, usize),
    MissingColumn(&'static str),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(expected, got) => {
                write!(f, "expected at most {expected} values, got {got}")
            }
            SqlError::MissingColumn(col) => write!(f, "missing column: {col}"),
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;

    const CG: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";
    const TAG: &str = "01BX5ZZKBKACTAV9WEVGEMMVRZ";
    const JUNE_1: Ms = 1_717_200_000_000;
    const DAY: Ms = 86_400_000;

    #[test]
    fn parse_insert_campground() {
        let sql = format!(
            "INSERT INTO campgrounds (id, name, max_reservations) VALUES ('{CG}', 'Lost Lake', 12)"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::InsertCampground {
                id,
                name,
                max_reservations,
            } => {
                assert_eq!(id.to_string(), CG);
                assert_eq!(name.as_deref(), Some("Lost Lake"));
                assert_eq!(max_reservations, 12);
            }
            _ => panic!("expected InsertCampground, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_campground_columns_out_of_order() {
        let sql = format!(
            "INSERT INTO campgrounds (max_reservations, id) VALUES (3, '{CG}')"
        );
        let cmd = parse_sql(&sql).unwrap();
        assert_eq!(
            cmd,
            Command::InsertCampground {
                id: Ulid::from_string(CG).unwrap(),
                name: None,
                max_reservations: 3,
            }
        );
    }

    #[test]
    fn parse_insert_reservation_with_dates() {
        let sql = format!(
            r#"INSERT INTO reservations (id, campground_id, user_id, start, "end") VALUES ('{TAG}', '{CG}', 'u-42', '2024-06-01', '2024-06-05')"#
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::InsertReservation {
                user_id,
                start,
                end,
                count,
                ..
            } => {
                assert_eq!(user_id, "u-42");
                assert_eq!(start, JUNE_1);
                assert_eq!(end, JUNE_1 + 4 * DAY);
                assert_eq!(count, 1);
            }
            _ => panic!("expected InsertReservation, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_reservation_with_millis_and_count() {
        let sql = format!(
            r#"INSERT INTO reservations (id, campground_id, user_id, start, "end", count) VALUES ('{TAG}', '{CG}', 'u', 1000, 2000, 3)"#
        );
        match parse_sql(&sql).unwrap() {
            Command::InsertReservation {
                start, end, count, ..
            } => {
                assert_eq!((start, end, count), (1000, 2000, 3));
            }
            other => panic!("expected InsertReservation, got {other:?}"),
        }
    }

    #[test]
    fn parse_update_reservation_status() {
        let sql = format!("UPDATE reservations SET status = 'confirmed' WHERE id = '{TAG}'");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SetReservationStatus {
                id: Ulid::from_string(TAG).unwrap(),
                status: ReservationStatus::Confirmed,
            }
        );
    }

    #[test]
    fn parse_update_campground_rating() {
        let sql = format!("UPDATE campgrounds SET rating = 4.5, max_reservations = 8 WHERE id = '{CG}'");
        match parse_sql(&sql).unwrap() {
            Command::UpdateCampground {
                name,
                max_reservations,
                rating,
                ..
            } => {
                assert_eq!(name, None);
                assert_eq!(max_reservations, Some(8));
                assert_eq!(rating, Some(Some(4.5)));
            }
            other => panic!("expected UpdateCampground, got {other:?}"),
        }
    }

    #[test]
    fn parse_update_campground_clears_rating() {
        let sql = format!("UPDATE campgrounds SET rating = NULL WHERE id = '{CG}'");
        match parse_sql(&sql).unwrap() {
            Command::UpdateCampground { rating, .. } => assert_eq!(rating, Some(None)),
            other => panic!("expected UpdateCampground, got {other:?}"),
        }
    }

    #[test]
    fn parse_delete_reservation_is_cancel() {
        let sql = format!("DELETE FROM reservations WHERE id = '{TAG}'");
        assert!(matches!(
            parse_sql(&sql).unwrap(),
            Command::CancelReservation { .. }
        ));
    }

    #[test]
    fn parse_tag_attach_and_detach() {
        let attach = format!("INSERT INTO campground_tags (campground_id, tag_id) VALUES ('{CG}', '{TAG}')");
        assert!(matches!(parse_sql(&attach).unwrap(), Command::AttachTag { .. }));

        let detach = format!(
            "DELETE FROM campground_tags WHERE campground_id = '{CG}' AND tag_id = '{TAG}'"
        );
        match parse_sql(&detach).unwrap() {
            Command::DetachTag {
                campground_id,
                tag_id,
            } => {
                assert_eq!(campground_id.to_string(), CG);
                assert_eq!(tag_id.to_string(), TAG);
            }
            other => panic!("expected DetachTag, got {other:?}"),
        }
    }

    #[test]
    fn parse_select_availability() {
        let sql = format!(
            r#"SELECT * FROM availability WHERE campground_id = '{CG}' AND start >= '2024-06-01' AND "end" <= '2024-06-08' AND count = 2"#
        );
        match parse_sql(&sql).unwrap() {
            Command::SelectAvailability {
                campground_id,
                start,
                end,
                count,
            } => {
                assert_eq!(campground_id.to_string(), CG);
                assert_eq!(start, JUNE_1);
                assert_eq!(end, JUNE_1 + 7 * DAY);
                assert_eq!(count, 2);
            }
            other => panic!("expected SelectAvailability, got {other:?}"),
        }
    }

    #[test]
    fn parse_select_occupancy_requires_range() {
        let sql = format!("SELECT * FROM occupancy WHERE campground_id = '{CG}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::MissingFilter("start"))));
    }

    #[test]
    fn parse_select_similar_with_limit() {
        let sql = format!("SELECT * FROM similar_campgrounds WHERE campground_id = '{CG}' LIMIT 5");
        match parse_sql(&sql).unwrap() {
            Command::SelectSimilar { limit, .. } => assert_eq!(limit, Some(5)),
            other => panic!("expected SelectSimilar, got {other:?}"),
        }

        let sql = format!("SELECT * FROM similar_campgrounds WHERE campground_id = '{CG}'");
        match parse_sql(&sql).unwrap() {
            Command::SelectSimilar { limit, .. } => assert_eq!(limit, None),
            other => panic!("expected SelectSimilar, got {other:?}"),
        }
    }

    #[test]
    fn parse_select_reservations_needs_a_key() {
        assert!(matches!(
            parse_sql("SELECT * FROM reservations"),
            Err(SqlError::MissingFilter(_))
        ));
        let sql = format!("SELECT * FROM reservations WHERE campground_id = '{CG}'");
        assert!(matches!(
            parse_sql(&sql).unwrap(),
            Command::SelectReservations {
                campground_id: Some(_),
                id: None
            }
        ));
    }

    #[test]
    fn parse_listings() {
        assert_eq!(
            parse_sql("SELECT * FROM campgrounds").unwrap(),
            Command::SelectCampgrounds { id: None }
        );
        assert_eq!(parse_sql("SELECT * FROM tags").unwrap(), Command::SelectTags);
    }

    #[test]
    fn select_table_ignores_placeholders() {
        assert_eq!(
            select_table("SELECT * FROM occupancy WHERE campground_id = $1 AND start >= $2").as_deref(),
            Some("occupancy")
        );
        assert_eq!(select_table("DELETE FROM tags WHERE id = $1"), None);
    }

    #[test]
    fn parse_unknown_table_errors() {
        let sql = format!("INSERT INTO bookings (id) VALUES ('{CG}')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::UnknownTable(_))));
    }

    #[test]
    fn parse_bad_date_errors() {
        let sql = format!(
            r#"INSERT INTO reservations (id, campground_id, user_id, start, "end") VALUES ('{TAG}', '{CG}', 'u', 'tomorrow', '2024-06-05')"#
        );
        assert!(matches!(parse_sql(&sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
