//! MongoDB dialect (spec §4.3): dumps are written as a single gzip-compressed
//! `mongodump --archive` blob; when more than one database is selected the
//! whole cluster is archived and the database set is inferred from the
//! archive's own namespace manifest rather than run per-database, since
//! `mongodump` only accepts a single `--db` per invocation.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use backhaul_protocol::execution::LogType;
use backhaul_protocol::{CancellationToken, Reporter};
use serde::{Deserialize, Serialize};

use crate::adapter::{ConnectionTest, DatabaseAdapter, DatabaseMapping, OperationResult, PrivilegedAuth};
use crate::error::{DbError, DbResult};
use crate::process::{find_binary, run_subprocess};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoConfig {
    pub uri: String,
    #[serde(default)]
    pub selected_databases: Vec<String>,
}

pub struct MongoAdapter {
    config: MongoConfig,
}

impl MongoAdapter {
    pub fn new(config: MongoConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DatabaseAdapter for MongoAdapter {
    fn name(&self) -> &str {
        "mongo"
    }

    async fn test(&self) -> DbResult<ConnectionTest> {
        let shell = find_binary(&["mongosh", "mongo"])?;
        let output = tokio::process::Command::new(&shell)
            .args(["--quiet", "--uri", &self.config.uri, "--eval", "db.version()"])
            .env_clear()
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
        let shell = find_binary(&["mongosh", "mongo"])?;
        let output = tokio::process::Command::new(&shell)
            .args([
                "--quiet",
                "--uri",
                &self.config.uri,
                "--eval",
                "db.adminCommand({listDatabases:1}).databases.map(d=>d.name).join('\\n')",
            ])
            .env_clear()
            .output()
            .await?;
        if !output.status.success() {
            return Err(DbError::Unreachable(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }
        const SYSTEM_DBS: [&str; 3] = ["admin", "local", "config"];
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty() && !SYSTEM_DBS.contains(&line.as_str()))
            .collect())
    }

    async fn dump(
        &self,
        dest_path: &Path,
        cancel: &CancellationToken,
        reporter: &dyn Reporter,
    ) -> DbResult<OperationResult> {
        let tool = find_binary(&["mongodump"])?;
        let archive_arg = format!("--archive={}", dest_path.display());
        let mut args = vec!["--uri".to_string(), self.config.uri.clone(), archive_arg, "--gzip".to_string()];
        if self.config.selected_databases.len() == 1 {
            args.push("--db".to_string());
            args.push(self.config.selected_databases[0].clone());
        }
        // More than one selected database: omit --db, archive the whole
        // deployment, and rely on --nsInclude at restore time.

        run_subprocess(&tool, &args, &[], None, None, cancel, reporter, LogType::Dump).await?;

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
        let tool = find_binary(&["mongorestore"])?;
        let archive_arg = format!("--archive={}", src_path.display());
        let mut args = vec![
            "--uri".to_string(),
            self.config.uri.clone(),
            archive_arg,
            "--gzip".to_string(),
            "--drop".to_string(),
        ];

        if let Some(mapping) = mapping {
            for (original, target) in mapping {
                if target.selected {
                    args.push(format!("--nsInclude={original}.*"));
                    if &target.target_name != original {
                        args.push(format!("--nsFrom={original}.*"));
                        args.push(format!("--nsTo={}.*", target.target_name));
                    }
                } else {
                    args.push(format!("--nsExclude={original}.*"));
                }
            }
        }

        run_subprocess(&tool, &args, &[], None, None, cancel, reporter, LogType::Dump).await?;

        let bytes = tokio::fs::metadata(src_path).await?.len();
        Ok(OperationResult::success(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_deserializes_with_default_empty_selection() {
        let config: MongoConfig = serde_json::from_str(r#"{"uri":"mongodb://localhost/"}"#).unwrap();
        assert!(config.selected_databases.is_empty());
    }
}
