#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SqliteMigration {
    pub version: i64,
    pub name: &'static str,
    pub up_sql: &'static str,
    pub down_sql: &'static str,
}

const MIGRATION_0001: SqliteMigration = SqliteMigration {
    version: 1,
    name: "initial_definition_schema",
    up_sql: r#"
CREATE TABLE IF NOT EXISTS runner_types (
    name TEXT PRIMARY KEY,
    description TEXT NOT NULL DEFAULT '',
    enabled INTEGER NOT NULL DEFAULT 1,
    runner_parameters_json TEXT NOT NULL,
    runner_module TEXT NOT NULL,
    updated_at_unix INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS actions (
    pack TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    enabled INTEGER NOT NULL DEFAULT 1,
    entry_point TEXT NOT NULL DEFAULT '',
    runner_type TEXT NOT NULL REFERENCES runner_types (name) ON DELETE RESTRICT,
    parameters_json TEXT NOT NULL,
    required_parameters_json TEXT NOT NULL,
    updated_at_unix INTEGER NOT NULL,
    PRIMARY KEY (pack, name)
);

CREATE INDEX IF NOT EXISTS idx_actions_name
    ON actions (name);

CREATE INDEX IF NOT EXISTS idx_actions_runner_type
    ON actions (runner_type);
"#,
    down_sql: r#"
DROP INDEX IF EXISTS idx_actions_runner_type;
DROP INDEX IF EXISTS idx_actions_name;
DROP TABLE IF EXISTS actions;
DROP TABLE IF EXISTS runner_types;
"#,
};

const MIGRATION_0002: SqliteMigration = SqliteMigration {
    version: 2,
    name: "add_execution_records",
    up_sql: r#"
CREATE TABLE IF NOT EXISTS executions (
    execution_id INTEGER PRIMARY KEY AUTOINCREMENT,
    action_ref TEXT NOT NULL,
    parameters_json TEXT NOT NULL,
    resolved_parameters_json TEXT,
    status TEXT NOT NULL,
    start_timestamp_ms INTEGER NOT NULL,
    end_timestamp_ms INTEGER,
    result_json TEXT
);

CREATE INDEX IF NOT EXISTS idx_executions_status
    ON executions (status);
"#,
    down_sql: r#"
DROP INDEX IF EXISTS idx_executions_status;
DROP TABLE IF EXISTS executions;
"#,
};

const MIGRATIONS: [SqliteMigration; 2] = [MIGRATION_0001, MIGRATION_0002];

pub fn migrations() -> &'static [SqliteMigration] {
    &MIGRATIONS
}

pub fn migration(version: i64) -> Option<&'static SqliteMigration> {
    MIGRATIONS.iter().find(|entry| entry.version == version)
}

pub fn current_schema_version() -> i64 {
    MIGRATIONS.last().map(|entry| entry.version).unwrap_or(0)
}
