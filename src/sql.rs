use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value,
    ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::engine::ScheduleFilter;
use crate::model::*;

/// Which read-only conflict query a `SELECT` addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictQuery {
    Conflicts,
    AlternativeTimes,
    AlternativeRooms,
    AutoResolve,
}

impl ConflictQuery {
    fn from_table(table: &str) -> Option<Self> {
        match table {
            "conflicts" => Some(ConflictQuery::Conflicts),
            "alternative_times" => Some(ConflictQuery::AlternativeTimes),
            "alternative_rooms" => Some(ConflictQuery::AlternativeRooms),
            "auto_resolve" => Some(ConflictQuery::AutoResolve),
            _ => None,
        }
    }
}

/// Column changes from `UPDATE schedules SET ...`. Unset columns keep their value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleChanges {
    pub course_id: Option<CourseId>,
    pub instructor_id: Option<InstructorId>,
    pub room_id: Option<RoomId>,
    pub section_id: Option<SectionId>,
    pub day: Option<Day>,
    pub start_time: Option<ClockTime>,
    pub end_time: Option<ClockTime>,
    pub available_space: Option<u32>,
    /// `Some(None)` clears the notes.
    pub notes: Option<Option<String>>,
}

impl ScheduleChanges {
    /// Merge onto `current`; the merged range must still be non-empty.
    pub fn apply_to(&self, current: &ScheduleRecord) -> Result<(ProposedAssignment, Option<String>), TimeError> {
        let range = TimeRange::new(
            self.start_time.unwrap_or(current.range.start),
            self.end_time.unwrap_or(current.range.end),
        )?;
        let assignment = ProposedAssignment {
            course_id: self.course_id.unwrap_or(current.course_id),
            instructor_id: self.instructor_id.unwrap_or(current.instructor_id),
            room_id: self.room_id.unwrap_or(current.room_id),
            section_id: self.section_id.unwrap_or(current.section_id),
            day: self.day.unwrap_or(current.day),
            range,
            available_space: self.available_space.or(current.available_space),
        };
        let notes = match &self.notes {
            Some(n) => n.clone(),
            None => current.notes.clone(),
        };
        Ok((assignment, notes))
    }
}

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertRoom {
        id: RoomId,
        name: String,
        capacity: u32,
    },
    InsertName {
        kind: NamedKind,
        id: i64,
        name: String,
    },
    InsertSchedule {
        assignment: ProposedAssignment,
        notes: Option<String>,
    },
    UpdateSchedule {
        id: RecordId,
        changes: ScheduleChanges,
    },
    DeleteSchedule {
        id: RecordId,
    },
    DeleteRoom {
        id: RoomId,
    },
    SelectSchedules {
        filter: ScheduleFilter,
    },
    SelectRooms,
    SelectConflictQuery {
        query: ConflictQuery,
        proposal: ProposedAssignment,
        exclude: ExclusionSet,
    },
}

/// Parse a single statement. Anything after the first is ignored.
pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let stmts = parse_statements(sql)?;
    let Some(stmt) = stmts.first() else {
        return Err(SqlError::Empty);
    };
    parse_statement(stmt)
}

/// Parse every `;`-separated statement of a simple-query batch.
pub fn parse_batch(sql: &str) -> Result<Vec<Command>, SqlError> {
    let stmts = parse_statements(sql)?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }
    stmts.iter().map(parse_statement).collect()
}

fn parse_statements(sql: &str) -> Result<Vec<Statement>, SqlError> {
    let dialect = PostgreSqlDialect {};
    Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))
}

fn parse_statement(stmt: &Statement) -> Result<Command, SqlError> {
    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(&table.relation, assignments, selection),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

const ROOM_COLUMNS: &[&str] = &["id", "name", "capacity"];
const NAME_COLUMNS: &[&str] = &["id", "name"];
const SCHEDULE_COLUMNS: &[&str] = &[
    "course_id",
    "instructor_id",
    "room_id",
    "section_id",
    "day",
    "start_time",
    "end_time",
    "available_space",
    "notes",
];

/// One VALUES row bound to its column names.
struct InsertRow<'a> {
    table: &'static str,
    cells: Vec<(&'static str, &'a Expr)>,
}

impl<'a> InsertRow<'a> {
    /// Without a column list, values bind positionally to `columns` and the
    /// first `required` must be present.
    fn bind(
        table: &'static str,
        columns: &[&'static str],
        required: usize,
        named: &[ast::Ident],
        values: &'a [Expr],
    ) -> Result<Self, SqlError> {
        if named.is_empty() {
            if values.len() < required {
                return Err(SqlError::WrongArity(table, required, values.len()));
            }
            let cells = columns.iter().copied().zip(values).collect();
            return Ok(Self { table, cells });
        }

        if named.len() != values.len() {
            return Err(SqlError::WrongArity(table, named.len(), values.len()));
        }
        let mut cells = Vec::with_capacity(named.len());
        for (ident, value) in named.iter().zip(values) {
            let wanted = ident.value.to_lowercase();
            let column = columns
                .iter()
                .copied()
                .find(|c| *c == wanted)
                .ok_or_else(|| SqlError::UnknownColumn(ident.value.clone()))?;
            if cells.iter().any(|(c, _)| *c == column) {
                return Err(SqlError::Parse(format!("column {column} given twice")));
            }
            cells.push((column, value));
        }
        let row = Self { table, cells };
        for column in columns[..required].iter().copied() {
            row.require(column)?;
        }
        Ok(row)
    }

    fn get(&self, column: &str) -> Option<&'a Expr> {
        self.cells.iter().find(|(c, _)| *c == column).map(|(_, v)| *v)
    }

    fn require(&self, column: &'static str) -> Result<&'a Expr, SqlError> {
        self.get(column).ok_or(SqlError::MissingColumn(self.table, column))
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;
    let named = insert.columns.as_slice();

    match table.as_str() {
        "rooms" => {
            let row = InsertRow::bind("rooms", ROOM_COLUMNS, 3, named, &values)?;
            Ok(Command::InsertRoom {
                id: parse_i64_expr(row.require("id")?)?,
                name: parse_string(row.require("name")?)?,
                capacity: parse_u32(row.require("capacity")?)?,
            })
        }
        "instructors" | "sections" | "courses" => {
            let kind = match table.as_str() {
                "instructors" => NamedKind::Instructor,
                "sections" => NamedKind::Section,
                _ => NamedKind::Course,
            };
            let row = InsertRow::bind("names", NAME_COLUMNS, 2, named, &values)?;
            Ok(Command::InsertName {
                kind,
                id: parse_i64_expr(row.require("id")?)?,
                name: parse_string(row.require("name")?)?,
            })
        }
        "schedules" => {
            let row = InsertRow::bind("schedules", SCHEDULE_COLUMNS, 7, named, &values)?;
            let assignment = ProposedAssignment {
                course_id: parse_i64_expr(row.require("course_id")?)?,
                instructor_id: parse_i64_expr(row.require("instructor_id")?)?,
                room_id: parse_i64_expr(row.require("room_id")?)?,
                section_id: parse_i64_expr(row.require("section_id")?)?,
                day: parse_day(row.require("day")?)?,
                range: parse_range(row.require("start_time")?, row.require("end_time")?)?,
                available_space: row.get("available_space").map(parse_u32_or_null).transpose()?.flatten(),
            };
            let notes = row.get("notes").map(parse_string_or_null).transpose()?.flatten();
            Ok(Command::InsertSchedule { assignment, notes })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_update(
    relation: &TableFactor,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(relation)?;
    if table != "schedules" {
        return Err(SqlError::UnknownTable(table));
    }
    let id = extract_where_id(selection)?;

    let mut changes = ScheduleChanges::default();
    for assignment in assignments {
        let column = match &assignment.target {
            AssignmentTarget::ColumnName(name) => object_name_last(name),
            _ => None,
        }
        .ok_or_else(|| SqlError::Unsupported("tuple assignment".into()))?;
        let value = &assignment.value;
        match column.as_str() {
            "course_id" => changes.course_id = Some(parse_i64_expr(value)?),
            "instructor_id" => changes.instructor_id = Some(parse_i64_expr(value)?),
            "room_id" => changes.room_id = Some(parse_i64_expr(value)?),
            "section_id" => changes.section_id = Some(parse_i64_expr(value)?),
            "day" => changes.day = Some(parse_day(value)?),
            "start_time" => changes.start_time = Some(parse_clock(value)?),
            "end_time" => changes.end_time = Some(parse_clock(value)?),
            "available_space" => changes.available_space = parse_u32_or_null(value)?,
            "notes" => changes.notes = Some(parse_string_or_null(value)?),
            _ => return Err(SqlError::Unsupported(format!("cannot set column {column}"))),
        }
    }
    Ok(Command::UpdateSchedule { id, changes })
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_id(&delete.selection)?;

    match table.as_str() {
        "schedules" => Ok(Command::DeleteSchedule { id }),
        "rooms" => Ok(Command::DeleteRoom { id }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };
    let Some(from) = select.from.first() else {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    };
    let table = table_factor_name(&from.relation)?;

    let mut filters = Filters::default();
    if let Some(selection) = &select.selection {
        collect_filters(selection, &mut filters)?;
    }

    if let Some(query) = ConflictQuery::from_table(&table) {
        let proposal = filters.proposal()?;
        return Ok(Command::SelectConflictQuery {
            query,
            proposal,
            exclude: filters.exclude,
        });
    }

    match table.as_str() {
        "schedules" => Ok(Command::SelectSchedules {
            filter: filters.schedule_filter()?,
        }),
        "rooms" => Ok(Command::SelectRooms),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// `col = value` conjuncts and `exclude_id IN (...)` from a WHERE clause.
#[derive(Default)]
struct Filters {
    equalities: Vec<(String, Expr)>,
    exclude: ExclusionSet,
}

impl Filters {
    fn get(&self, column: &'static str) -> Option<&Expr> {
        self.equalities
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, e)| e)
    }

    fn require(&self, column: &'static str) -> Result<&Expr, SqlError> {
        self.get(column).ok_or(SqlError::MissingFilter(column))
    }

    fn proposal(&self) -> Result<ProposedAssignment, SqlError> {
        Ok(ProposedAssignment {
            course_id: parse_i64_expr(self.require("course_id")?)?,
            instructor_id: parse_i64_expr(self.require("instructor_id")?)?,
            room_id: parse_i64_expr(self.require("room_id")?)?,
            section_id: parse_i64_expr(self.require("section_id")?)?,
            day: parse_day(self.require("day")?)?,
            range: parse_range(self.require("start_time")?, self.require("end_time")?)?,
            available_space: self
                .get("available_space")
                .map(parse_u32_or_null)
                .transpose()?
                .flatten(),
        })
    }

    fn schedule_filter(&self) -> Result<ScheduleFilter, SqlError> {
        let mut filter = ScheduleFilter::default();
        for (column, value) in &self.equalities {
            match column.as_str() {
                "course_id" => filter.course_id = Some(parse_i64_expr(value)?),
                "instructor_id" => filter.instructor_id = Some(parse_i64_expr(value)?),
                "room_id" => filter.room_id = Some(parse_i64_expr(value)?),
                "section_id" => filter.section_id = Some(parse_i64_expr(value)?),
                "day" => filter.day = Some(parse_day(value)?),
                _ => return Err(SqlError::Unsupported(format!("filter on {column}"))),
            }
        }
        if !self.exclude.is_empty() {
            return Err(SqlError::Unsupported("exclude_id on schedules".into()));
        }
        Ok(filter)
    }
}

fn collect_filters(expr: &Expr, filters: &mut Filters) -> Result<(), SqlError> {
    match expr {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::And,
            right,
        } => {
            collect_filters(left, filters)?;
            collect_filters(right, filters)
        }
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            let column = expr_column_name(left).ok_or_else(|| SqlError::Parse(format!("expected column, got {left}")))?;
            if column == "exclude_id" {
                filters.exclude.insert(parse_i64_expr(right)?);
            } else {
                filters.equalities.push((column, right.as_ref().clone()));
            }
            Ok(())
        }
        Expr::InList {
            expr,
            list,
            negated: false,
        } if expr_column_name(expr).as_deref() == Some("exclude_id") => {
            for item in list {
                filters.exclude.insert(parse_i64_expr(item)?);
            }
            Ok(())
        }
        Expr::Nested(inner) => collect_filters(inner, filters),
        other => Err(SqlError::Unsupported(format!("WHERE clause {other}"))),
    }
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
    let first = tables_with_joins
        .first()
        .ok_or_else(|| SqlError::Parse("DELETE without table".into()))?;
    table_factor_name(&first.relation)
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
            [row] => Ok(row.clone()),
            [] => Err(SqlError::Parse("empty VALUES".into())),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<i64, SqlError> {
    match selection {
        Some(Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        }) if expr_column_name(left).as_deref() == Some("id") => parse_i64_expr(right),
        _ => Err(SqlError::MissingFilter("id")),
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

fn parse_i64_expr(expr: &Expr) -> Result<i64, SqlError> {
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
        Ok(-parse_i64_expr(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr}")))
    }
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64_expr(expr)?;
    u32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u32 range")))
}

fn parse_u32_or_null(expr: &Expr) -> Result<Option<u32>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        _ => parse_u32(expr).map(Some),
    }
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        _ => Err(SqlError::Parse(format!("expected string, got {expr}"))),
    }
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        _ => parse_string(expr).map(Some),
    }
}

fn parse_day(expr: &Expr) -> Result<Day, SqlError> {
    parse_string(expr)?.parse().map_err(SqlError::Time)
}

fn parse_clock(expr: &Expr) -> Result<ClockTime, SqlError> {
    parse_string(expr)?.parse().map_err(SqlError::Time)
}

fn parse_range(start: &Expr, end: &Expr) -> Result<TimeRange, SqlError> {
    TimeRange::new(parse_clock(start)?, parse_clock(end)?).map_err(SqlError::Time)
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Time(TimeError),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
    UnknownColumn(String),
    MissingColumn(&'static str, &'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Time(e) => write!(f, "{e}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
            SqlError::UnknownColumn(col) => write!(f, "unknown column: {col}"),
            SqlError::MissingColumn(t, col) => write!(f, "{t}: missing column {col}"),
        }
    }
}

impl std::error::Error for SqlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SqlError::Time(e) => Some(e),
            _ => None,
        }
    }
}
