use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::models::{
    ActionDescriptor, ActionRef, CoreError, CoreErrorKind, ExecutionId, ExecutionRecord,
    ExecutionResult, ExecutionStatus, NewExecution, ParameterMap, RunnerDescriptor, SchemaMap,
};
use crate::persistence::in_memory::ambiguous_reference;
use crate::persistence::{
    ActionStore, ExecutionStore, MigrationStore, PersistenceResult, RunnerStore,
};
use crate::sqlite::migrations::{SqliteMigration, current_schema_version, migration, migrations};

const MIGRATIONS_TABLE: &str = "dispatch_schema_migrations";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const ACTION_COLUMNS: &str = "pack, name, description, enabled, entry_point, runner_type, parameters_json, required_parameters_json";
const EXECUTION_COLUMNS: &str = "execution_id, action_ref, parameters_json, resolved_parameters_json, status, start_timestamp_ms, end_timestamp_ms, result_json";

pub struct SqliteStore {
    database_path: PathBuf,
}

impl SqliteStore {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn planned_migrations(&self, from_version: i64) -> Vec<&'static SqliteMigration> {
        migrations()
            .iter()
            .filter(|entry| entry.version > from_version)
            .collect()
    }

    pub fn migrate_to_latest(&self) -> PersistenceResult<()> {
        self.apply_migration(current_schema_version())
    }

    fn with_connection<T>(
        &self,
        operation_name: &str,
        operation: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> PersistenceResult<T> {
        let mut connection = open_connection(&self.database_path)
            .map_err(|error| storage_error(operation_name, error))?;
        operation(&mut connection).map_err(|error| storage_error(operation_name, error))
    }
}

impl MigrationStore for SqliteStore {
    fn current_version(&self) -> PersistenceResult<i64> {
        self.with_connection("current_version", |connection| {
            ensure_migrations_table(connection)?;
            read_current_version(connection)
        })
    }

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()> {
        if target_version < 0 || target_version > current_schema_version() {
            return Err(storage_error_text(
                "apply_migration",
                format!("invalid migration target version '{target_version}'"),
            ));
        }

        if target_version > 0 && migration(target_version).is_none() {
            return Err(storage_error_text(
                "apply_migration",
                format!("migration version '{target_version}' is not defined"),
            ));
        }

        self.with_connection("apply_migration", |connection| {
            ensure_migrations_table(connection)?;
            let current_version = read_current_version(connection)?;

            if target_version == current_version {
                // All DDL is IF NOT EXISTS, so re-running repairs tables lost
                // after the version row was written.
                for version in 1..=target_version {
                    connection.execute_batch(defined_migration(version)?.up_sql)?;
                }
                return Ok(());
            }

            if target_version > current_version {
                for version in (current_version + 1)..=target_version {
                    apply_up_migration(connection, defined_migration(version)?)?;
                }
            } else {
                for version in ((target_version + 1)..=current_version).rev() {
                    apply_down_migration(connection, defined_migration(version)?)?;
                }
            }

            Ok(())
        })
    }
}

impl RunnerStore for SqliteStore {
    fn upsert_runner(&self, runner: &RunnerDescriptor) -> PersistenceResult<()> {
        self.with_connection("upsert_runner", |connection| {
            ensure_schema_ready(connection)?;
            connection.execute(
                "
INSERT INTO runner_types (
    name, description, enabled, runner_parameters_json, runner_module, updated_at_unix
) VALUES (?1, ?2, ?3, ?4, ?5, strftime('%s', 'now'))
ON CONFLICT(name) DO UPDATE SET
    description = excluded.description,
    enabled = excluded.enabled,
    runner_parameters_json = excluded.runner_parameters_json,
    runner_module = excluded.runner_module,
    updated_at_unix = excluded.updated_at_unix
",
                params![
                    runner.name.as_str(),
                    runner.description.as_str(),
                    bool_to_sqlite(runner.enabled),
                    encode_json(&runner.runner_parameters)?,
                    runner.runner_module.as_str(),
                ],
            )?;
            Ok(())
        })
    }

    fn runner_by_name(&self, name: &str) -> PersistenceResult<Option<RunnerDescriptor>> {
        self.with_connection("runner_by_name", |connection| {
            ensure_schema_ready(connection)?;
            connection
                .query_row(
                    "
SELECT name, description, enabled, runner_parameters_json, runner_module
FROM runner_types
WHERE name = ?1
",
                    [name],
                    runner_from_row,
                )
                .optional()
        })
    }

    fn list_runners(&self) -> PersistenceResult<Vec<RunnerDescriptor>> {
        self.with_connection("list_runners", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(
                "
SELECT name, description, enabled, runner_parameters_json, runner_module
FROM runner_types
ORDER BY name
",
            )?;
            let rows = statement.query_map([], runner_from_row)?;
            rows.collect()
        })
    }

    fn delete_runner(&self, name: &str) -> PersistenceResult<()> {
        self.with_connection("delete_runner", |connection| {
            ensure_schema_ready(connection)?;
            connection.execute("DELETE FROM runner_types WHERE name = ?1", [name])?;
            Ok(())
        })
        .map_err(|error| error.with_runner(name))
    }
}

impl ActionStore for SqliteStore {
    fn upsert_action(&self, action: &ActionDescriptor) -> PersistenceResult<()> {
        self.with_connection("upsert_action", |connection| {
            ensure_schema_ready(connection)?;
            connection.execute(
                "
INSERT INTO actions (
    pack, name, description, enabled, entry_point, runner_type,
    parameters_json, required_parameters_json, updated_at_unix
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, strftime('%s', 'now'))
ON CONFLICT(pack, name) DO UPDATE SET
    description = excluded.description,
    enabled = excluded.enabled,
    entry_point = excluded.entry_point,
    runner_type = excluded.runner_type,
    parameters_json = excluded.parameters_json,
    required_parameters_json = excluded.required_parameters_json,
    updated_at_unix = excluded.updated_at_unix
",
                params![
                    action.pack.as_str(),
                    action.name.as_str(),
                    action.description.as_str(),
                    bool_to_sqlite(action.enabled),
                    action.entry_point.as_str(),
                    action.runner_type.as_str(),
                    encode_json(&action.parameters)?,
                    encode_json(&action.required_parameters)?,
                ],
            )?;
            Ok(())
        })
        .map_err(|error| error.with_action(action.reference().to_string()))
    }

    fn action_by_ref(&self, reference: &ActionRef) -> PersistenceResult<Option<ActionDescriptor>> {
        let matches = self.with_connection("action_by_ref", |connection| {
            ensure_schema_ready(connection)?;
            match &reference.pack {
                Some(pack) => {
                    let mut statement = connection.prepare(&format!(
                        "SELECT {ACTION_COLUMNS} FROM actions WHERE pack = ?1 AND name = ?2"
                    ))?;
                    let rows = statement
                        .query_map(params![pack.as_str(), reference.name.as_str()], action_from_row)?;
                    rows.collect::<rusqlite::Result<Vec<_>>>()
                }
                None => {
                    let mut statement = connection.prepare(&format!(
                        "SELECT {ACTION_COLUMNS} FROM actions WHERE name = ?1 ORDER BY pack LIMIT 2"
                    ))?;
                    let rows = statement.query_map([reference.name.as_str()], action_from_row)?;
                    rows.collect::<rusqlite::Result<Vec<_>>>()
                }
            }
        })?;

        if matches.len() > 1 {
            return Err(ambiguous_reference(reference));
        }
        Ok(matches.into_iter().next())
    }

    fn list_actions(&self) -> PersistenceResult<Vec<ActionDescriptor>> {
        self.with_connection("list_actions", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(&format!(
                "SELECT {ACTION_COLUMNS} FROM actions ORDER BY pack, name"
            ))?;
            let rows = statement.query_map([], action_from_row)?;
            rows.collect()
        })
    }
}

impl ExecutionStore for SqliteStore {
    fn create_execution(&self, submission: NewExecution) -> PersistenceResult<ExecutionRecord> {
        self.with_connection("create_execution", |connection| {
            ensure_schema_ready(connection)?;
            let start_ms = to_unix_millis(submission.requested_at)?;
            connection.execute(
                "
INSERT INTO executions (
    action_ref, parameters_json, status, start_timestamp_ms
) VALUES (?1, ?2, ?3, ?4)
",
                params![
                    submission.action.as_str(),
                    encode_json(&submission.parameters)?,
                    ExecutionStatus::Initializing.as_str(),
                    start_ms,
                ],
            )?;
            let id = i64_to_u64(connection.last_insert_rowid())?;

            // Hand back the timestamp at the precision it was stored with.
            let persisted = NewExecution {
                requested_at: from_unix_millis(start_ms)?,
                ..submission
            };
            Ok(ExecutionRecord::initializing(ExecutionId(id), persisted))
        })
    }

    fn upsert_execution(&self, record: &ExecutionRecord) -> PersistenceResult<()> {
        self.with_connection("upsert_execution", |connection| {
            ensure_schema_ready(connection)?;
            let resolved = record
                .resolved_parameters
                .as_ref()
                .map(encode_json)
                .transpose()?;
            let result = record.result.as_ref().map(encode_json).transpose()?;
            let end_ms = record.end_timestamp.map(to_unix_millis).transpose()?;

            connection.execute(
                "
INSERT INTO executions (
    execution_id, action_ref, parameters_json, resolved_parameters_json, status,
    start_timestamp_ms, end_timestamp_ms, result_json
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
ON CONFLICT(execution_id) DO UPDATE SET
    action_ref = excluded.action_ref,
    parameters_json = excluded.parameters_json,
    resolved_parameters_json = excluded.resolved_parameters_json,
    status = excluded.status,
    start_timestamp_ms = excluded.start_timestamp_ms,
    end_timestamp_ms = excluded.end_timestamp_ms,
    result_json = excluded.result_json
",
                params![
                    execution_id_to_i64(record.id)?,
                    record.action.as_str(),
                    encode_json(&record.parameters)?,
                    resolved,
                    record.status.as_str(),
                    to_unix_millis(record.start_timestamp)?,
                    end_ms,
                    result,
                ],
            )?;
            Ok(())
        })
        .map_err(|error| error.with_execution(record.id))
    }

    fn transition_execution(
        &self,
        record: &ExecutionRecord,
        expected: ExecutionStatus,
    ) -> PersistenceResult<bool> {
        self.with_connection("transition_execution", |connection| {
            ensure_schema_ready(connection)?;
            let resolved = record
                .resolved_parameters
                .as_ref()
                .map(encode_json)
                .transpose()?;
            let result = record.result.as_ref().map(encode_json).transpose()?;
            let end_ms = record.end_timestamp.map(to_unix_millis).transpose()?;

            let changed = connection.execute(
                "
UPDATE executions SET
    action_ref = ?2,
    parameters_json = ?3,
    resolved_parameters_json = ?4,
    status = ?5,
    start_timestamp_ms = ?6,
    end_timestamp_ms = ?7,
    result_json = ?8
WHERE execution_id = ?1 AND status = ?9
",
                params![
                    execution_id_to_i64(record.id)?,
                    record.action.as_str(),
                    encode_json(&record.parameters)?,
                    resolved,
                    record.status.as_str(),
                    to_unix_millis(record.start_timestamp)?,
                    end_ms,
                    result,
                    expected.as_str(),
                ],
            )?;
            Ok(changed == 1)
        })
        .map_err(|error| error.with_execution(record.id))
    }

    fn execution_by_id(&self, id: ExecutionId) -> PersistenceResult<Option<ExecutionRecord>> {
        self.with_connection("execution_by_id", |connection| {
            ensure_schema_ready(connection)?;
            connection
                .query_row(
                    &format!("SELECT {EXECUTION_COLUMNS} FROM executions WHERE execution_id = ?1"),
                    [execution_id_to_i64(id)?],
                    execution_from_row,
                )
                .optional()
        })
    }

    fn list_recent_executions(&self, limit: usize) -> PersistenceResult<Vec<ExecutionRecord>> {
        self.with_connection("list_recent_executions", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(&format!(
                "SELECT {EXECUTION_COLUMNS} FROM executions ORDER BY execution_id DESC LIMIT ?1"
            ))?;
            let rows = statement.query_map([to_i64(limit)?], execution_from_row)?;
            rows.collect()
        })
    }
}

fn runner_from_row(row: &Row<'_>) -> rusqlite::Result<RunnerDescriptor> {
    let parameters_raw: String = row.get(3)?;
    Ok(RunnerDescriptor {
        name: row.get(0)?,
        description: row.get(1)?,
        enabled: sqlite_to_bool(row.get(2)?),
        runner_parameters: decode_json::<SchemaMap>(3, &parameters_raw)?,
        runner_module: row.get(4)?,
    })
}

fn action_from_row(row: &Row<'_>) -> rusqlite::Result<ActionDescriptor> {
    let parameters_raw: String = row.get(6)?;
    let required_raw: String = row.get(7)?;
    Ok(ActionDescriptor {
        pack: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        enabled: sqlite_to_bool(row.get(3)?),
        entry_point: row.get(4)?,
        runner_type: row.get(5)?,
        parameters: decode_json::<SchemaMap>(6, &parameters_raw)?,
        required_parameters: decode_json::<BTreeSet<String>>(7, &required_raw)?,
    })
}

fn execution_from_row(row: &Row<'_>) -> rusqlite::Result<ExecutionRecord> {
    let id: i64 = row.get(0)?;
    let parameters_raw: String = row.get(2)?;
    let resolved_raw: Option<String> = row.get(3)?;
    let status_raw: String = row.get(4)?;
    let start_ms: i64 = row.get(5)?;
    let end_ms: Option<i64> = row.get(6)?;
    let result_raw: Option<String> = row.get(7)?;

    Ok(ExecutionRecord {
        id: ExecutionId(i64_to_u64(id)?),
        action: row.get(1)?,
        parameters: decode_json::<ParameterMap>(2, &parameters_raw)?,
        resolved_parameters: resolved_raw
            .map(|raw| decode_json::<ParameterMap>(3, &raw))
            .transpose()?,
        status: parse_execution_status(&status_raw)?,
        start_timestamp: from_unix_millis(start_ms)?,
        end_timestamp: end_ms.map(from_unix_millis).transpose()?,
        result: result_raw
            .map(|raw| decode_json::<ExecutionResult>(7, &raw))
            .transpose()?,
    })
}

fn open_connection(database_path: &Path) -> rusqlite::Result<Connection> {
    if let Some(parent) = database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|error| rusqlite::Error::ToSqlConversionFailure(Box::new(error)))?;
    }
    let connection = Connection::open(database_path)?;
    connection.busy_timeout(BUSY_TIMEOUT)?;
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(connection)
}

fn ensure_migrations_table(connection: &Connection) -> rusqlite::Result<()> {
    connection.execute_batch(&format!(
        "
CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE} (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at_unix INTEGER NOT NULL
);
"
    ))?;
    Ok(())
}

fn ensure_schema_ready(connection: &Connection) -> rusqlite::Result<()> {
    ensure_migrations_table(connection)?;
    let version = read_current_version(connection)?;
    if version <= 0 {
        return Err(storage_error_sqlite(
            "database schema is not initialized; apply migrations before store operations",
        ));
    }
    Ok(())
}

fn read_current_version(connection: &Connection) -> rusqlite::Result<i64> {
    connection.query_row(
        &format!("SELECT COALESCE(MAX(version), 0) FROM {MIGRATIONS_TABLE}"),
        [],
        |row| row.get(0),
    )
}

fn defined_migration(version: i64) -> rusqlite::Result<&'static SqliteMigration> {
    migration(version).ok_or_else(|| {
        storage_error_sqlite(&format!("migration version '{version}' is not defined"))
    })
}

fn apply_up_migration(
    connection: &mut Connection,
    migration: &SqliteMigration,
) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    transaction.execute_batch(migration.up_sql)?;
    transaction.execute(
        &format!(
            "INSERT INTO {MIGRATIONS_TABLE} (version, name, applied_at_unix)
             VALUES (?1, ?2, strftime('%s', 'now'))"
        ),
        (migration.version, migration.name),
    )?;
    transaction.commit()?;
    Ok(())
}

fn apply_down_migration(
    connection: &mut Connection,
    migration: &SqliteMigration,
) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    transaction.execute_batch(migration.down_sql)?;
    transaction.execute(
        &format!("DELETE FROM {MIGRATIONS_TABLE} WHERE version = ?1"),
        [migration.version],
    )?;
    transaction.commit()?;
    Ok(())
}

fn storage_error(operation: &str, error: rusqlite::Error) -> CoreError {
    if is_foreign_key_violation(&error) {
        return CoreError::new(
            CoreErrorKind::ReferenceConflict,
            format!("sqlite store '{operation}' violated a runner reference: {error}"),
        );
    }
    storage_error_text(operation, error.to_string())
}

fn is_foreign_key_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
    )
}

fn storage_error_sqlite(message: &str) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::other(message.to_string())))
}

fn encode_json<T: Serialize>(value: &T) -> rusqlite::Result<String> {
    serde_json::to_string(value)
        .map_err(|error| rusqlite::Error::ToSqlConversionFailure(Box::new(error)))
}

fn decode_json<T: DeserializeOwned>(column: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw)
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(error)))
}

fn parse_execution_status(raw: &str) -> rusqlite::Result<ExecutionStatus> {
    raw.parse::<ExecutionStatus>().map_err(|_| {
        storage_error_sqlite(&format!("unknown execution status '{raw}' in sqlite record"))
    })
}

fn bool_to_sqlite(value: bool) -> i64 {
    if value { 1 } else { 0 }
}

fn sqlite_to_bool(value: i64) -> bool {
    value != 0
}

fn to_unix_millis(value: SystemTime) -> rusqlite::Result<i64> {
    let duration = value.duration_since(UNIX_EPOCH).map_err(|error| {
        storage_error_sqlite(&format!("time before unix epoch is not supported: {error}"))
    })?;
    i64::try_from(duration.as_millis())
        .map_err(|_| storage_error_sqlite("unix timestamp milliseconds exceed i64 range"))
}

fn from_unix_millis(value: i64) -> rusqlite::Result<SystemTime> {
    let millis = u64::try_from(value)
        .map_err(|_| storage_error_sqlite("negative unix timestamps are not supported"))?;
    Ok(UNIX_EPOCH + Duration::from_millis(millis))
}

fn execution_id_to_i64(value: ExecutionId) -> rusqlite::Result<i64> {
    i64::try_from(value.0).map_err(|_| storage_error_sqlite("execution id exceeds i64 range"))
}

fn i64_to_u64(value: i64) -> rusqlite::Result<u64> {
    u64::try_from(value)
        .map_err(|_| storage_error_sqlite("negative execution id in sqlite record"))
}

fn to_i64(value: usize) -> rusqlite::Result<i64> {
    i64::try_from(value).map_err(|_| storage_error_sqlite("value exceeds i64 range"))
}

fn storage_error_text(operation: &str, message: impl AsRef<str>) -> CoreError {
    CoreError::new(
        CoreErrorKind::StorageFailure,
        format!("sqlite store '{operation}' failed: {}", message.as_ref()),
    )
}
