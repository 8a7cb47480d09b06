//! PostgreSQL dialect (spec §4.3): single DB dumps via the custom binary
//! format (`pg_dump -Fc`), multi-DB dumps via a `pg_dumpall`-style plain-SQL
//! tool. `choose()` shapes the argument vector by detected server version;
//! unknown versions default to PG16.

use std::path::Path;

use async_trait::async_trait;
use backhaul_protocol::execution::LogType;
use backhaul_protocol::{CancellationToken, Reporter};
use serde::{Deserialize, Serialize};

use crate::adapter::{ConnectionTest, DatabaseAdapter, DatabaseMapping, OperationResult, PrivilegedAuth};
use crate::error::{DbError, DbResult};
use crate::process::run_subprocess;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Empty means "all databases" (spec §4.5 step 2: `databases.label`
    /// becomes `All DBs`).
    #[serde(default)]
    pub selected_databases: Vec<String>,
    #[serde(default)]
    pub detected_version: Option<u8>,
}

fn default_port() -> u16 {
    5432
}

/// Version-shaped argument rules (spec §4.3): PG14/15 use `--no-sync` for
/// cross-version portability, PG17 explicitly encodes UTF-8, default PG16
/// when the version is unknown or unrecognized.
struct PostgresDialect {
    no_sync: bool,
    force_utf8: bool,
}

fn choose(detected_version: Option<u8>) -> PostgresDialect {
    let version = detected_version.unwrap_or(16);
    match version {
        13 => PostgresDialect {
            no_sync: false,
            force_utf8: false,
        },
        14 | 15 => PostgresDialect {
            no_sync: true,
            force_utf8: false,
        },
        17 => PostgresDialect {
            no_sync: false,
            force_utf8: true,
        },
        _ => PostgresDialect {
            no_sync: false,
            force_utf8: false,
        },
    }
}

pub struct PostgresAdapter {
    config: PostgresConfig,
}

impl PostgresAdapter {
    pub fn new(config: PostgresConfig) -> Self {
        Self { config }
    }

    fn connection_env(&self) -> Vec<(String, String)> {
        vec![("PGPASSWORD".to_string(), self.config.password.clone())]
    }

    fn connection_args(&self, database: Option<&str>) -> Vec<String> {
        let mut args = vec![
            "-h".to_string(),
            self.config.host.clone(),
            "-p".to_string(),
            self.config.port.to_string(),
            "-U".to_string(),
            self.config.username.clone(),
        ];
        if let Some(db) = database {
            args.push("-d".to_string());
            args.push(db.to_string());
        }
        args
    }
}

#[async_trait]
impl DatabaseAdapter for PostgresAdapter {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn test(&self) -> DbResult<ConnectionTest> {
        let psql = which::which("psql")
            .map_err(|_| DbError::ToolNotFound("psql".to_string()))?;
        let output = tokio::process::Command::new(psql)
            .args(self.connection_args(Some("postgres")))
            .args(["-tAc", "SELECT version();"])
            .env_clear()
            .env("PGPASSWORD", &self.config.password)
            .output()
            .await?;
        if output.status.success() {
            let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
            Ok(ConnectionTest {
                ok: true,
                version: Some(version),
                message: "connected".to_string(),
            })
        } else {
            Ok(ConnectionTest {
                ok: false,
                version: None,
                message: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }

    async fn list_databases(&self) -> DbResult<Vec<String>> {
        let psql = which::which("psql")
            .map_err(|_| DbError::ToolNotFound("psql".to_string()))?;
        let output = tokio::process::Command::new(psql)
            .args(self.connection_args(Some("postgres")))
            .args(["-tAc", "SELECT datname FROM pg_database WHERE datistemplate = false;"])
            .env_clear()
            .env("PGPASSWORD", &self.config.password)
            .output()
            .await?;
        if !output.status.success() {
            return Err(DbError::Unreachable(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect())
    }

    async fn dump(
        &self,
        dest_path: &Path,
        cancel: &CancellationToken,
        reporter: &dyn Reporter,
    ) -> DbResult<OperationResult> {
        let dialect = choose(self.config.detected_version);
        let env = self.connection_env();

        if self.config.selected_databases.len() == 1 {
            let tool = which::which("pg_dump")
                .map_err(|_| DbError::ToolNotFound("pg_dump".to_string()))?;
            let mut args = self.connection_args(Some(&self.config.selected_databases[0]));
            args.extend([
                "-Fc".to_string(),
                "--compress=6".to_string(),
            ]);
            if dialect.no_sync {
                args.push("--no-sync".to_string());
            }
            if dialect.force_utf8 {
                args.push("--encoding=UTF8".to_string());
            }
            run_subprocess(
                tool.to_string_lossy().as_ref(),
                &args,
                &env,
                None,
                Some(dest_path),
                cancel,
                reporter,
                LogType::Dump,
            )
            .await?;
        } else {
            let tool = which::which("pg_dumpall")
                .map_err(|_| DbError::ToolNotFound("pg_dumpall".to_string()))?;
            let mut args = self.connection_args(None);
            if dialect.no_sync {
                args.push("--no-sync".to_string());
            }
            run_subprocess(
                tool.to_string_lossy().as_ref(),
                &args,
                &env,
                None,
                Some(dest_path),
                cancel,
                reporter,
                LogType::Dump,
            )
            .await?;
        }

        let bytes = tokio::fs::metadata(dest_path).await?.len();
        Ok(OperationResult::success(bytes))
    }

    async fn restore(
        &self,
        src_path: &Path,
        _mapping: Option<&std::collections::HashMap<String, DatabaseMapping>>,
        _privileged_auth: Option<&PrivilegedAuth>,
        cancel: &CancellationToken,
        reporter: &dyn Reporter,
    ) -> DbResult<OperationResult> {
        let env = self.connection_env();
        if self.config.selected_databases.len() == 1 {
            let tool = which::which("pg_restore")
                .map_err(|_| DbError::ToolNotFound("pg_restore".to_string()))?;
            let mut args = self.connection_args(Some(&self.config.selected_databases[0]));
            args.push("--clean".to_string());
            args.push("--if-exists".to_string());
            args.push(src_path.to_string_lossy().into_owned());
            run_subprocess(
                tool.to_string_lossy().as_ref(),
                &args,
                &env,
                None,
                None,
                cancel,
                reporter,
                LogType::Dump,
            )
            .await?;
        } else {
            let tool = which::which("psql").map_err(|_| DbError::ToolNotFound("psql".to_string()))?;
            let args = self.connection_args(Some("postgres"));
            run_subprocess(
                tool.to_string_lossy().as_ref(),
                &args,
                &env,
                Some(src_path),
                None,
                cancel,
                reporter,
                LogType::Dump,
            )
            .await?;
        }
        let bytes = tokio::fs::metadata(src_path).await?.len();
        Ok(OperationResult::success(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_version_defaults_to_pg16_rules() {
        let dialect = choose(None);
        assert!(!dialect.no_sync);
        assert!(!dialect.force_utf8);
    }

    #[test]
    fn pg14_and_pg15_use_no_sync() {
        assert!(choose(Some(14)).no_sync);
        assert!(choose(Some(15)).no_sync);
    }

    #[test]
    fn pg17_forces_utf8() {
        assert!(choose(Some(17)).force_utf8);
        assert!(!choose(Some(17)).no_sync);
    }
}
