use std::fmt::Debug;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{
    AuthSource, DefaultServerParameterProvider, LoginInfo, Password, StartupHandler,
};
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
use pgwire::messages::PgWireBackendMessage;
use tokio::net::TcpStream;
use ulid::Ulid;

use crate::engine::{Engine, EngineError};
use crate::limits::DEFAULT_SIMILAR_LIMIT;
use crate::model::*;
use crate::observability;
use crate::sql::{self, Command};

pub struct CampdHandler {
    engine: Arc<Engine>,
    query_parser: Arc<CampdQueryParser>,
}

impl CampdHandler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            query_parser: Arc::new(CampdQueryParser),
        }
    }

    async fn run(&self, query: &str) -> PgWireResult<Vec<Response>> {
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        let label = observability::command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(cmd).await;
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        result
    }

    async fn execute_command(&self, cmd: Command) -> PgWireResult<Vec<Response>> {
        let engine = &self.engine;
        match cmd {
            Command::InsertCampground {
                id,
                name,
                max_reservations,
            } => {
                engine
                    .create_campground(id, name, max_reservations)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::UpdateCampground {
                id,
                name,
                max_reservations,
                rating,
            } => {
                engine
                    .update_campground(id, name, max_reservations, rating)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::DeleteCampground { id } => {
                engine.delete_campground(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::InsertTag { id, name } => {
                engine.create_tag(id, &name).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::DeleteTag { id } => {
                engine.delete_tag(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::AttachTag {
                campground_id,
                tag_id,
            } => {
                engine
                    .attach_tag(campground_id, tag_id)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::DetachTag {
                campground_id,
                tag_id,
            } => {
                engine
                    .detach_tag(campground_id, tag_id)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::InsertReservation {
                id,
                campground_id,
                user_id,
                start,
                end,
                count,
            } => {
                engine
                    .request_reservation(
                        id,
                        campground_id,
                        user_id,
                        Span::unchecked(start, end),
                        count,
                    )
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::SetReservationStatus { id, status } => {
                let result = match status {
                    ReservationStatus::Confirmed => engine.confirm_reservation(id).await,
                    ReservationStatus::Cancelled => engine.cancel_reservation(id).await,
                    ReservationStatus::Expired => Err(EngineError::Validation(
                        "reservations expire on their own",
                    )),
                    ReservationStatus::Pending => Err(EngineError::Validation(
                        "reservations cannot return to Pending",
                    )),
                };
                result.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::CancelReservation { id } => {
                engine.cancel_reservation(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::SelectCampgrounds { id } => {
                let campgrounds = match id {
                    Some(id) => match engine.get_campground(id).await {
                        Ok(info) => vec![info],
                        Err(EngineError::NotFound(_)) => Vec::new(),
                        Err(e) => return Err(engine_err(e)),
                    },
                    None => engine.list_campgrounds().await,
                };
                let schema = Arc::new(campgrounds_schema());
                let rows: Vec<PgWireResult<_>> = campgrounds
                    .into_iter()
                    .map(|c| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&c.id.to_string())?;
                        encoder.encode_field(&c.name)?;
                        encoder.encode_field(&i64::from(c.max_reservations))?;
                        encoder.encode_field(&c.rating)?;
                        let tags: Vec<String> = c.tags.iter().map(Ulid::to_string).collect();
                        encoder.encode_field(&tags.join(","))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectTags => {
                let schema = Arc::new(tags_schema());
                let rows: Vec<PgWireResult<_>> = engine
                    .list_tags()
                    .into_iter()
                    .map(|t| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&t.id.to_string())?;
                        encoder.encode_field(&t.name)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectReservations { campground_id, id } => {
                let records = match id {
                    Some(id) => match engine.get_reservation(id).await {
                        Ok(r) if campground_id.is_none_or(|c| c == r.campground_id) => vec![r],
                        Ok(_) | Err(EngineError::NotFound(_)) => Vec::new(),
                        Err(e) => return Err(engine_err(e)),
                    },
                    None => match campground_id {
                        Some(cid) => engine.list_reservations(cid).await,
                        None => Vec::new(),
                    },
                };
                let schema = Arc::new(reservations_schema());
                let rows: Vec<PgWireResult<_>> = records
                    .into_iter()
                    .map(|r| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&r.id.to_string())?;
                        encoder.encode_field(&r.campground_id.to_string())?;
                        encoder.encode_field(&r.user_id)?;
                        encoder.encode_field(&r.span.start)?;
                        encoder.encode_field(&r.span.end)?;
                        encoder.encode_field(&i64::from(r.count))?;
                        encoder.encode_field(&r.status.to_string())?;
                        encoder.encode_field(&r.created_at)?;
                        encoder.encode_field(&r.updated_at)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectOccupancy {
                campground_id,
                start,
                end,
            } => {
                let occ = engine
                    .occupancy(campground_id, Span::unchecked(start, end))
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(occupancy_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&campground_id.to_string())?;
                encoder.encode_field(&i64::from(occ.peak))?;
                encoder.encode_field(&i64::from(occ.capacity))?;
                encoder.encode_field(&i64::from(occ.remaining))?;
                let rows = vec![Ok(encoder.take_row())];
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectAvailability {
                campground_id,
                start,
                end,
                count,
            } => {
                let spans = engine
                    .availability(campground_id, Span::unchecked(start, end), count)
                    .await
                    .map_err(engine_err)?;

                let schema = Arc::new(availability_schema());
                let cid_str = campground_id.to_string();
                let rows: Vec<PgWireResult<_>> = spans
                    .into_iter()
                    .map(|span| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&cid_str)?;
                        encoder.encode_field(&span.start)?;
                        encoder.encode_field(&span.end)?;
                        Ok(encoder.take_row())
                    })
                    .collect();

                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectSimilar {
                campground_id,
                limit,
            } => {
                let ranked = engine
                    .similar_to(campground_id, limit.unwrap_or(DEFAULT_SIMILAR_LIMIT))
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(similar_schema());
                let rows: Vec<PgWireResult<_>> = ranked
                    .into_iter()
                    .map(|s| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&s.id.to_string())?;
                        encoder.encode_field(&(s.shared_tags as i64))?;
                        encoder.encode_field(&s.rating)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
        }
    }
}

// ── Result schemas ───────────────────────────────────────────────

fn text(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
}

fn int8(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::INT8, FieldFormat::Text)
}

fn float8(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::FLOAT8, FieldFormat::Text)
}

fn campgrounds_schema() -> Vec<FieldInfo> {
    vec![
        text("id"),
        text("name"),
        int8("max_reservations"),
        float8("rating"),
        text("tags"),
    ]
}

fn tags_schema() -> Vec<FieldInfo> {
    vec![text("id"), text("name")]
}

fn reservations_schema() -> Vec<FieldInfo> {
    vec![
        text("id"),
        text("campground_id"),
        text("user_id"),
        int8("start"),
        int8("end"),
        int8("count"),
        text("status"),
        int8("created_at"),
        int8("updated_at"),
    ]
}

fn occupancy_schema() -> Vec<FieldInfo> {
    vec![
        text("campground_id"),
        int8("peak"),
        int8("capacity"),
        int8("remaining"),
    ]
}

fn availability_schema() -> Vec<FieldInfo> {
    vec![text("campground_id"), int8("start"), int8("end")]
}

fn similar_schema() -> Vec<FieldInfo> {
    vec![text("campground_id"), int8("shared_tags"), float8("rating")]
}

/// Result columns for a statement, empty for anything that is not a SELECT.
fn result_schema(sql: &str) -> Vec<FieldInfo> {
    match sql::select_table(sql).as_deref() {
        Some("campgrounds") => campgrounds_schema(),
        Some("tags") => tags_schema(),
        Some("reservations") => reservations_schema(),
        Some("occupancy") => occupancy_schema(),
        Some("availability") => availability_schema(),
        Some("similar_campgrounds") => similar_schema(),
        _ => vec![],
    }
}

#[async_trait]
impl SimpleQueryHandler for CampdHandler {
    async fn do_query<C>(
        &self,
        _client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        self.run(query).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct CampdQueryParser;

#[async_trait]
impl QueryParser for CampdQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for CampdHandler {
    type Statement = String;
    type QueryParser = CampdQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        _client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let sql = substitute_params(portal);
        let mut responses = self.run(&sql).await?;
        if responses.is_empty() {
            return Ok(Response::EmptyQuery);
        }
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
        Ok(DescribeStatementResponse::new(
            param_types,
            result_schema(&target.statement),
        ))
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
        Ok(DescribePortalResponse::new(result_schema(
            &target.statement.statement,
        )))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > start
                && let Ok(n) = sql[start..i].parse::<usize>()
            {
                max = max.max(n);
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
/// Highest index first so `$1` never clobbers the prefix of `$10`.
fn substitute_params(portal: &Portal<String>) -> String {
    let mut result = portal.statement.statement.to_string();
    for (i, param) in portal.parameters.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        let value = match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        };
        result = result.replace(&placeholder, &value);
    }
    result
}

// ── Auth & factory ───────────────────────────────────────────────

/// Single shared password; the user name is not checked.
#[derive(Debug)]
pub struct CampdAuthSource {
    password: String,
}

impl CampdAuthSource {
    pub fn new(password: String) -> Self {
        Self { password }
    }
}

#[async_trait]
impl AuthSource for CampdAuthSource {
    async fn get_password(&self, _login: &LoginInfo) -> PgWireResult<Password> {
        Ok(Password::new(None, self.password.as_bytes().to_vec()))
    }
}

pub struct CampdFactory {
    handler: Arc<CampdHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<CampdAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl CampdFactory {
    pub fn new(engine: Arc<Engine>, password: String) -> Self {
        let auth_source = CampdAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(CampdHandler::new(engine)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for CampdFactory {
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

/// Serve one client socket until it disconnects.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
    password: String,
) -> io::Result<()> {
    let factory = CampdFactory::new(engine, password);
    pgwire::tokio::process_socket(socket, None, factory).await
}

fn engine_err(e: EngineError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        e.sqlstate().into(),
        e.to_string(),
    )))
}

fn sql_err(e: sql::SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}
