use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::data::DataRow;
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::auth::TimetableAuthSource;
use crate::conflict::ResolveError;
use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability::{command_label, QUERIES_TOTAL, QUERY_DURATION_SECONDS};
use crate::search::{ConflictResolver, SearchConfig};
use crate::semester::SemesterManager;
use crate::sql::{self, Command, ConflictQuery, SqlError};

pub struct TimetableHandler {
    semesters: Arc<SemesterManager>,
    search: SearchConfig,
    query_parser: Arc<TimetableQueryParser>,
}

impl TimetableHandler {
    pub fn new(semesters: Arc<SemesterManager>, search: SearchConfig) -> Self {
        Self {
            semesters,
            search,
            query_parser: Arc::new(TimetableQueryParser),
        }
    }

    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.semesters
            .get_or_create(&db)
            .map_err(|e| user_error("08006", format!("semester error: {e}")))
    }

    async fn run_batch(&self, engine: Arc<Engine>, sql: &str) -> PgWireResult<Vec<Response>> {
        let commands = sql::parse_batch(sql).map_err(sql_err)?;
        let mut responses = Vec::with_capacity(commands.len());
        for cmd in commands {
            responses.extend(self.run(engine.clone(), cmd).await?);
        }
        Ok(responses)
    }

    async fn run(&self, engine: Arc<Engine>, cmd: Command) -> PgWireResult<Vec<Response>> {
        let label = command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(engine, cmd).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(&self, engine: Arc<Engine>, cmd: Command) -> PgWireResult<Vec<Response>> {
        match cmd {
            Command::InsertRoom { id, name, capacity } => {
                engine.create_room(id, name, capacity).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::InsertName { kind, id, name } => {
                engine.register_name(kind, id, name).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::InsertSchedule { assignment, notes } => {
                engine
                    .create_schedule(assignment, notes)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::UpdateSchedule { id, changes } => {
                let current = engine.get_schedule(id).ok_or_else(|| {
                    engine_err(EngineError::NotFound { kind: "schedule", id })
                })?;
                let (assignment, notes) = changes
                    .apply_to(&current)
                    .map_err(|e| sql_err(SqlError::Time(e)))?;
                engine
                    .update_schedule(id, assignment, notes)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::DeleteSchedule { id } => {
                engine.delete_schedule(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::DeleteRoom { id } => {
                engine.delete_room(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::SelectSchedules { filter } => {
                let records = engine.list_schedules(&filter);
                let schema = Arc::new(schedule_schema());
                let rows = records
                    .iter()
                    .map(|r| encode_schedule(&schema, r))
                    .collect();
                Ok(vec![query_response(schema, rows)])
            }
            Command::SelectRooms => {
                let schema = Arc::new(room_schema());
                let rows: Vec<PgWireResult<DataRow>> = engine
                    .rooms_by_name()
                    .iter()
                    .map(|room| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&room.id)?;
                        encoder.encode_field(&room.name)?;
                        encoder.encode_field(&i64::from(room.capacity))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![query_response(schema, rows)])
            }
            Command::SelectConflictQuery {
                query,
                proposal,
                exclude,
            } => {
                let resolver = ConflictResolver::new(engine, self.search.clone());
                let response = match query {
                    ConflictQuery::Conflicts => {
                        let conflicts = resolver
                            .detect_conflicts(&proposal, &exclude)
                            .await
                            .map_err(resolve_err)?;
                        conflict_rows(&conflicts)
                    }
                    ConflictQuery::AlternativeTimes => {
                        let candidates = resolver
                            .suggest_alternative_times(&proposal, &exclude)
                            .await
                            .map_err(resolve_err)?;
                        alternative_time_rows(&candidates)?
                    }
                    ConflictQuery::AlternativeRooms => {
                        let candidates = resolver
                            .suggest_alternative_rooms(&proposal, &exclude)
                            .await
                            .map_err(resolve_err)?;
                        alternative_room_rows(&candidates)
                    }
                    ConflictQuery::AutoResolve => {
                        let outcome = resolver
                            .auto_resolve(&proposal, &exclude)
                            .await
                            .map_err(resolve_err)?;
                        auto_resolve_rows(&outcome)?
                    }
                };
                Ok(vec![response])
            }
        }
    }
}

// ── Result encoding ──────────────────────────────────────────────

fn text(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
}

fn int(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::INT8, FieldFormat::Text)
}

fn schedule_schema() -> Vec<FieldInfo> {
    vec![
        int("id"),
        int("course_id"),
        int("instructor_id"),
        int("room_id"),
        int("section_id"),
        text("day"),
        text("start_time"),
        text("end_time"),
        int("available_space"),
        text("notes"),
    ]
}

fn room_schema() -> Vec<FieldInfo> {
    vec![int("id"), text("name"), int("capacity")]
}

fn conflict_schema() -> Vec<FieldInfo> {
    vec![
        text("conflict_type"),
        text("resource_name"),
        int("schedule_id"),
        int("course_id"),
        text("day"),
        text("start_time"),
        text("end_time"),
    ]
}

fn alternative_time_schema() -> Vec<FieldInfo> {
    vec![
        text("days"),
        text("start_time"),
        text("end_time"),
        int("conflict_count"),
        int("section_id"),
    ]
}

fn alternative_room_schema() -> Vec<FieldInfo> {
    vec![int("room_id"), text("room_name"), int("capacity"), int("conflict_count")]
}

fn auto_resolve_schema() -> Vec<FieldInfo> {
    vec![
        text("status"),
        text("message"),
        text("days"),
        text("start_time"),
        text("end_time"),
        int("room_id"),
        text("room_name"),
        int("available_space"),
    ]
}

fn query_response(schema: Arc<Vec<FieldInfo>>, rows: Vec<PgWireResult<DataRow>>) -> Response {
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

fn encode_schedule(schema: &Arc<Vec<FieldInfo>>, r: &ScheduleRecord) -> PgWireResult<DataRow> {
    let mut encoder = DataRowEncoder::new(schema.clone());
    encoder.encode_field(&r.id)?;
    encoder.encode_field(&r.course_id)?;
    encoder.encode_field(&r.instructor_id)?;
    encoder.encode_field(&r.room_id)?;
    encoder.encode_field(&r.section_id)?;
    encoder.encode_field(&r.day.as_str())?;
    encoder.encode_field(&r.range.start.to_string())?;
    encoder.encode_field(&r.range.end.to_string())?;
    encoder.encode_field(&r.available_space.map(i64::from))?;
    encoder.encode_field(&r.notes)?;
    Ok(encoder.take_row())
}

fn days_json(days: &[Day]) -> PgWireResult<String> {
    serde_json::to_string(days).map_err(|e| user_error("XX000", format!("encode days: {e}")))
}

fn conflict_rows(conflicts: &[Conflict]) -> Response {
    let schema = Arc::new(conflict_schema());
    let rows: Vec<PgWireResult<DataRow>> = conflicts
        .iter()
        .map(|c| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&c.kind.label())?;
            encoder.encode_field(&c.resource_name)?;
            encoder.encode_field(&c.record.id)?;
            encoder.encode_field(&c.record.course_id)?;
            encoder.encode_field(&c.record.day.as_str())?;
            encoder.encode_field(&c.record.range.start.to_string())?;
            encoder.encode_field(&c.record.range.end.to_string())?;
            Ok(encoder.take_row())
        })
        .collect();
    query_response(schema, rows)
}

fn alternative_time_rows(candidates: &[AlternativeTimeCandidate]) -> PgWireResult<Response> {
    let schema = Arc::new(alternative_time_schema());
    let mut rows = Vec::with_capacity(candidates.len());
    for c in candidates {
        let days = days_json(&c.days)?;
        let mut encoder = DataRowEncoder::new(schema.clone());
        encoder.encode_field(&days)?;
        encoder.encode_field(&c.range.start.to_string())?;
        encoder.encode_field(&c.range.end.to_string())?;
        encoder.encode_field(&(c.conflict_count as i64))?;
        encoder.encode_field(&c.section_id)?;
        rows.push(Ok(encoder.take_row()));
    }
    Ok(query_response(schema, rows))
}

fn alternative_room_rows(candidates: &[AlternativeRoomCandidate]) -> Response {
    let schema = Arc::new(alternative_room_schema());
    let rows: Vec<PgWireResult<DataRow>> = candidates
        .iter()
        .map(|c| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&c.room_id)?;
            encoder.encode_field(&c.room_name)?;
            encoder.encode_field(&i64::from(c.capacity))?;
            encoder.encode_field(&(c.conflict_count as i64))?;
            Ok(encoder.take_row())
        })
        .collect();
    query_response(schema, rows)
}

fn auto_resolve_rows(outcome: &AutoResolveOutcome) -> PgWireResult<Response> {
    let schema = Arc::new(auto_resolve_schema());
    let mut encoder = DataRowEncoder::new(schema.clone());
    match outcome {
        AutoResolveOutcome::Resolved(r) => {
            encoder.encode_field(&"resolved")?;
            encoder.encode_field(&r.summary())?;
            encoder.encode_field(&days_json(&r.days)?)?;
            encoder.encode_field(&r.range.start.to_string())?;
            encoder.encode_field(&r.range.end.to_string())?;
            encoder.encode_field(&r.room_id)?;
            encoder.encode_field(&r.room_name)?;
            encoder.encode_field(&i64::from(r.available_space))?;
        }
        AutoResolveOutcome::NotFound { reason } => {
            encoder.encode_field(&"not_found")?;
            encoder.encode_field(reason)?;
            encoder.encode_field(&None::<String>)?;
            encoder.encode_field(&None::<String>)?;
            encoder.encode_field(&None::<String>)?;
            encoder.encode_field(&None::<i64>)?;
            encoder.encode_field(&None::<String>)?;
            encoder.encode_field(&None::<i64>)?;
        }
    }
    Ok(query_response(schema, vec![Ok(encoder.take_row())]))
}

/// Result columns for a statement, from the table after `FROM`.
fn result_schema(sql: &str) -> Vec<FieldInfo> {
    let lower = sql.to_lowercase();
    if !lower.trim_start().starts_with("select") {
        return vec![];
    }
    let table = lower
        .split_whitespace()
        .skip_while(|w| *w != "from")
        .nth(1)
        .map(|t| t.trim_end_matches(';').to_string());
    match table.as_deref() {
        Some("schedules") => schedule_schema(),
        Some("rooms") => room_schema(),
        Some("conflicts") => conflict_schema(),
        Some("alternative_times") => alternative_time_schema(),
        Some("alternative_rooms") => alternative_room_schema(),
        Some("auto_resolve") => auto_resolve_schema(),
        _ => vec![],
    }
}

#[async_trait]
impl SimpleQueryHandler for TimetableHandler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        self.run_batch(engine, query).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct TimetableQueryParser;

#[async_trait]
impl QueryParser for TimetableQueryParser {
    type Statement = String;

    async fn parse_sql<C>(&self, _client: &C, sql: &str, _types: &[Option<Type>]) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(&self, stmt: &String, _column_format: Option<&Format>) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for TimetableHandler {
    type Statement = String;
    type QueryParser = TimetableQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let sql = substitute_params(portal);
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        let mut responses = self.run(engine, cmd).await?;
        Ok(responses.remove(0))
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(param_types, result_schema(&target.statement)))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(result_schema(&target.statement.statement)))
    }
}

/// Highest `$N` placeholder in the statement.
fn count_params(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    let mut max = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        i += 1;
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if let Ok(n) = sql[start..i].parse::<usize>() {
            max = max.max(n);
        }
    }
    max
}

/// Inline bound text parameters as quoted literals. Highest index first so
/// `$1` does not clobber `$10`.
fn substitute_params(portal: &Portal<String>) -> String {
    let mut sql = portal.statement.statement.to_string();
    for (i, param) in portal.parameters.iter().enumerate().rev() {
        let value = match param {
            Some(bytes) => format!("'{}'", String::from_utf8_lossy(bytes).replace('\'', "''")),
            None => "NULL".to_string(),
        };
        sql = sql.replace(&format!("${}", i + 1), &value);
    }
    sql
}

// ── Factory ──────────────────────────────────────────────────────

pub struct TimetableFactory {
    handler: Arc<TimetableHandler>,
    auth_handler: Arc<CleartextPasswordAuthStartupHandler<TimetableAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl TimetableFactory {
    pub fn new(semesters: Arc<SemesterManager>, password: String, search: SearchConfig) -> Self {
        Self {
            handler: Arc::new(TimetableHandler::new(semesters, search)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                TimetableAuthSource::new(password),
                DefaultServerParameterProvider::default(),
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for TimetableFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client until it disconnects.
pub async fn process_connection(
    socket: TcpStream,
    semesters: Arc<SemesterManager>,
    password: String,
    search: SearchConfig,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    let factory = Arc::new(TimetableFactory::new(semesters, password, search));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Errors ───────────────────────────────────────────────────────

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new("ERROR".into(), code.into(), message)))
}

fn resolve_code(e: &ResolveError) -> &'static str {
    match e {
        ResolveError::InvalidProposal(_) => "22023",
        ResolveError::Repository(_) => "58000",
        ResolveError::LimitExceeded(_) => "54000",
        ResolveError::Cancelled => "57014",
    }
}

fn resolve_err(e: ResolveError) -> PgWireError {
    user_error(resolve_code(&e), e.to_string())
}

fn engine_code(e: &EngineError) -> &'static str {
    match e {
        EngineError::NotFound { .. } => "P0002",
        EngineError::AlreadyExists { .. } => "23505",
        EngineError::Conflicts(_) => "23P01",
        EngineError::RoomInUse { .. } => "23503",
        EngineError::Resolve(inner) => resolve_code(inner),
        EngineError::LimitExceeded(_) => "54000",
        EngineError::WalError(_) => "58030",
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    user_error(engine_code(&e), e.to_string())
}

fn sql_err(e: SqlError) -> PgWireError {
    let code = match &e {
        SqlError::Time(_) => "22007",
        SqlError::UnknownTable(_) => "42P01",
        SqlError::UnknownColumn(_) => "42703",
        _ => "42601",
    };
    user_error(code, e.to_string())
}
