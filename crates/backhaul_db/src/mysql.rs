//! MySQL/MariaDB dialect (spec §4.3): client binary is family-matched to the
//! detected server (`mariadb-dump` vs `mysqldump`), the password travels via
//! `MYSQL_PWD` rather than argv, and version-dependent flags
//! (`--set-gtid-purged`, `--column-statistics`) are chosen by `choose()`.
//! Multi-database restores are rewritten line-wise against the caller's
//! `{originalName -> {targetName, selected}}` mapping, since mysqldump's
//! multi-database output is plain, line-oriented SQL.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use backhaul_protocol::execution::LogType;
use backhaul_protocol::{CancellationToken, Reporter};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::adapter::{ConnectionTest, DatabaseAdapter, DatabaseMapping, OperationResult, PrivilegedAuth};
use crate::error::{DbError, DbResult};
use crate::process::{find_binary, run_subprocess};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MysqlConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub selected_databases: Vec<String>,
    /// e.g. `"8.0.35"` or `"mariadb-10.11.4"`; used only to pick flags, not
    /// parsed strictly.
    #[serde(default)]
    pub detected_version: Option<String>,
}

fn default_port() -> u16 {
    3306
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MysqlFamily {
    MySql,
    MariaDb,
}

struct MysqlDialect {
    family: MysqlFamily,
    set_gtid_purged_off: bool,
    column_statistics_zero: bool,
}

fn choose(detected_version: Option<&str>) -> MysqlDialect {
    let lowered = detected_version.unwrap_or_default().to_ascii_lowercase();
    if lowered.contains("mariadb") {
        return MysqlDialect {
            family: MysqlFamily::MariaDb,
            set_gtid_purged_off: false,
            column_statistics_zero: false,
        };
    }
    // MySQL 8+ enables GTID consistency checks and column-statistics
    // queries that break against older/replica servers and some managed
    // hosting providers; both are turned off for portability.
    let is_mysql8_or_newer = lowered
        .split('.')
        .next()
        .and_then(|major| major.parse::<u32>().ok())
        .map(|major| major >= 8)
        .unwrap_or(true);
    MysqlDialect {
        family: MysqlFamily::MySql,
        set_gtid_purged_off: is_mysql8_or_newer,
        column_statistics_zero: is_mysql8_or_newer,
    }
}

fn dump_binary_candidates(family: MysqlFamily) -> &'static [&'static str] {
    match family {
        MysqlFamily::MariaDb => &["mariadb-dump", "mysqldump"],
        MysqlFamily::MySql => &["mysqldump", "mariadb-dump"],
    }
}

fn client_binary_candidates(family: MysqlFamily) -> &'static [&'static str] {
    match family {
        MysqlFamily::MariaDb => &["mariadb", "mysql"],
        MysqlFamily::MySql => &["mysql", "mariadb"],
    }
}

pub struct MysqlAdapter {
    config: MysqlConfig,
}

impl MysqlAdapter {
    pub fn new(config: MysqlConfig) -> Self {
        Self { config }
    }

    fn connection_env(&self) -> Vec<(String, String)> {
        vec![("MYSQL_PWD".to_string(), self.config.password.clone())]
    }

    fn connection_args(&self, database: Option<&str>) -> Vec<String> {
        let mut args = vec![
            "-h".to_string(),
            self.config.host.clone(),
            "-P".to_string(),
            self.config.port.to_string(),
            "-u".to_string(),
            self.config.username.clone(),
        ];
        if let Some(db) = database {
            args.push(db.to_string());
        }
        args
    }
}

#[async_trait]
impl DatabaseAdapter for MysqlAdapter {
    fn name(&self) -> &str {
        "mysql"
    }

    async fn test(&self) -> DbResult<ConnectionTest> {
        let dialect = choose(self.config.detected_version.as_deref());
        let client = find_binary(client_binary_candidates(dialect.family))?;
        let output = tokio::process::Command::new(&client)
            .args(self.connection_args(None))
            .args(["-N", "-B", "-e", "SELECT VERSION();"])
            .env_clear()
            .env("MYSQL_PWD", &self.config.password)
            .output()
            .await?;
        if output.status.success() {
            Ok(ConnectionTest {
                ok: true,
                version: Some(String::from_utf8_lossy(&output.stdout).trim().to_string()),
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
        let dialect = choose(self.config.detected_version.as_deref());
        let client = find_binary(client_binary_candidates(dialect.family))?;
        let output = tokio::process::Command::new(&client)
            .args(self.connection_args(None))
            .args(["-N", "-B", "-e", "SHOW DATABASES;"])
            .env_clear()
            .env("MYSQL_PWD", &self.config.password)
            .output()
            .await?;
        if !output.status.success() {
            return Err(DbError::Unreachable(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }
        const SYSTEM_SCHEMAS: [&str; 4] = ["information_schema", "mysql", "performance_schema", "sys"];
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty() && !SYSTEM_SCHEMAS.contains(&line.as_str()))
            .collect())
    }

    async fn dump(
        &self,
        dest_path: &Path,
        cancel: &CancellationToken,
        reporter: &dyn Reporter,
    ) -> DbResult<OperationResult> {
        let dialect = choose(self.config.detected_version.as_deref());
        let tool = find_binary(dump_binary_candidates(dialect.family))?;
        let mut args = self.connection_args(None);
        args.push("--single-transaction".to_string());
        args.push("--routines".to_string());
        args.push("--triggers".to_string());
        if dialect.set_gtid_purged_off {
            args.push("--set-gtid-purged=OFF".to_string());
        }
        if dialect.column_statistics_zero {
            args.push("--column-statistics=0".to_string());
        }
        if self.config.selected_databases.is_empty() {
            args.push("--all-databases".to_string());
        } else {
            args.push("--databases".to_string());
            args.extend(self.config.selected_databases.iter().cloned());
        }

        run_subprocess(
            &tool,
            &args,
            &self.connection_env(),
            None,
            Some(dest_path),
            cancel,
            reporter,
            LogType::Dump,
        )
        .await?;

        let bytes = tokio::fs::metadata(dest_path).await?.len();
        Ok(OperationResult::success(bytes))
    }

    async fn restore(
        &self,
        src_path: &Path,
        mapping: Option<&HashMap<String, DatabaseMapping>>,
        _privileged_auth: Option<&PrivilegedAuth>,
        cancel: &CancellationToken,
        reporter: &dyn Reporter,
    ) -> DbResult<OperationResult> {
        let dialect = choose(self.config.detected_version.as_deref());
        let client = find_binary(client_binary_candidates(dialect.family))?;

        let stream_path = match mapping {
            Some(mapping) if !mapping.is_empty() => {
                let rewritten = src_path.with_extension("rewritten.sql");
                rewrite_multi_database_stream(src_path, &rewritten, mapping).await?;
                rewritten
            }
            _ => src_path.to_path_buf(),
        };

        let database_arg = self
            .config
            .selected_databases
            .first()
            .map(|name| name.as_str());
        let args = self.connection_args(database_arg);

        let result = run_subprocess(
            &client,
            &args,
            &self.connection_env(),
            Some(&stream_path),
            None,
            cancel,
            reporter,
            LogType::Dump,
        )
        .await;

        if stream_path != src_path {
            let _ = tokio::fs::remove_file(&stream_path).await;
        }
        result?;

        let bytes = tokio::fs::metadata(src_path).await?.len();
        Ok(OperationResult::success(bytes))
    }
}

/// Rewrites a mysqldump multi-database stream line-wise: `CREATE DATABASE`/
/// `USE` statements are renamed per `mapping`, sections for databases not
/// present (or not selected) in `mapping` are dropped entirely, and any
/// preamble before the first database switch (charset/variable `SET`
/// statements) is always kept.
async fn rewrite_multi_database_stream(
    src_path: &Path,
    dest_path: &Path,
    mapping: &HashMap<String, DatabaseMapping>,
) -> DbResult<()> {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    let create_re = Regex::new(r#"(?i)^(--\s*)?CREATE (DATABASE|SCHEMA)(\s*/\*![0-9]+ IF NOT EXISTS\*/)?\s*`?([A-Za-z0-9_$]+)`?"#)
        .expect("valid regex");
    let use_re = Regex::new(r#"(?i)^USE\s+`?([A-Za-z0-9_$]+)`?\s*;"#).expect("valid regex");

    let src = tokio::fs::File::open(src_path).await?;
    let mut dest = tokio::fs::File::create(dest_path).await?;
    let mut lines = BufReader::new(src).lines();
    let mut section_selected = true;

    while let Some(line) = lines.next_line().await? {
        if let Some(captures) = create_re.captures(&line) {
            let original = &captures[4];
            match mapping.get(original) {
                Some(target) if target.selected => {
                    section_selected = true;
                    let rewritten = create_re.replace(&line, |caps: &regex::Captures| {
                        format!(
                            "{}CREATE {}{}`{}`",
                            caps.get(1).map(|m| m.as_str()).unwrap_or(""),
                            &caps[2],
                            caps.get(3).map(|m| m.as_str()).unwrap_or(""),
                            target.target_name
                        )
                    });
                    dest.write_all(rewritten.as_bytes()).await?;
                    dest.write_all(b"\n").await?;
                }
                _ => {
                    section_selected = false;
                }
            }
            continue;
        }
        if let Some(captures) = use_re.captures(&line) {
            let original = &captures[1];
            match mapping.get(original) {
                Some(target) if target.selected => {
                    section_selected = true;
                    dest.write_all(format!("USE `{}`;\n", target.target_name).as_bytes())
                        .await?;
                }
                _ => {
                    section_selected = false;
                }
            }
            continue;
        }
        if section_selected {
            dest.write_all(line.as_bytes()).await?;
            dest.write_all(b"\n").await?;
        }
    }

    dest.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mariadb_hint_selects_mariadb_family() {
        let dialect = choose(Some("mariadb-10.11.4"));
        assert_eq!(dialect.family, MysqlFamily::MariaDb);
        assert!(!dialect.set_gtid_purged_off);
    }

    #[test]
    fn mysql8_enables_portability_flags() {
        let dialect = choose(Some("8.0.35"));
        assert_eq!(dialect.family, MysqlFamily::MySql);
        assert!(dialect.set_gtid_purged_off);
        assert!(dialect.column_statistics_zero);
    }

    #[test]
    fn mysql57_skips_portability_flags() {
        let dialect = choose(Some("5.7.44"));
        assert!(!dialect.set_gtid_purged_off);
        assert!(!dialect.column_statistics_zero);
    }

    #[tokio::test]
    async fn rewrite_drops_unselected_sections_and_renames_selected() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.sql");
        let dest = dir.path().join("dest.sql");
        tokio::fs::write(
            &src,
            "SET NAMES utf8mb4;\n\
             CREATE DATABASE `shop`;\n\
             USE `shop`;\n\
             INSERT INTO orders VALUES (1);\n\
             CREATE DATABASE `analytics`;\n\
             USE `analytics`;\n\
             INSERT INTO events VALUES (1);\n",
        )
        .await
        .unwrap();

        let mut mapping = HashMap::new();
        mapping.insert(
            "shop".to_string(),
            DatabaseMapping {
                target_name: "shop_restored".to_string(),
                selected: true,
            },
        );
        mapping.insert(
            "analytics".to_string(),
            DatabaseMapping {
                target_name: "analytics".to_string(),
                selected: false,
            },
        );

        rewrite_multi_database_stream(&src, &dest, &mapping)
            .await
            .unwrap();
        let output = tokio::fs::read_to_string(&dest).await.unwrap();

        assert!(output.contains("SET NAMES utf8mb4;"));
        assert!(output.contains("`shop_restored`"));
        assert!(output.contains("orders VALUES"));
        assert!(!output.contains("analytics"));
        assert!(!output.contains("events VALUES"));
    }
}
