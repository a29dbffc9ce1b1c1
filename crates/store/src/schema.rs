pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS logs (
  id BIGINT PRIMARY KEY,
  message TEXT NOT NULL,
  stack_trace TEXT,
  level INTEGER NOT NULL,
  program_name TEXT NOT NULL,
  program_version TEXT NOT NULL,
  windows_version TEXT NOT NULL,
  system_details TEXT NOT NULL,
  created_at TIMESTAMP NOT NULL
);

CREATE SEQUENCE IF NOT EXISTS logs_id_seq START 1;

CREATE INDEX IF NOT EXISTS idx_logs_created_at ON logs(created_at);
CREATE INDEX IF NOT EXISTS idx_logs_level_created_at ON logs(level, created_at);
CREATE INDEX IF NOT EXISTS idx_logs_program_created_at ON logs(program_name, created_at);
CREATE INDEX IF NOT EXISTS idx_logs_system ON logs(system_details);
"#;
