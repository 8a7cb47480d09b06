//! SQL Server dialect (spec §4.3 + supplemented side channel): `BACKUP
//! DATABASE`/`RESTORE DATABASE` write/read a `.bak` file on the server's own
//! filesystem, which the orchestrator does not necessarily share. When a
//! [`SftpSideChannel`] is configured the `.bak` is pulled/pushed over SFTP
//! (`ssh2`, blocking, run on a dedicated thread); otherwise the adapter
//! assumes `server_bak_dir` is a path both sides can see (a mounted share)
//! and moves the file directly. No other transport is supported: a
//! constrained SFTP-only side channel, not a general file-copy backend.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use backhaul_protocol::execution::LogType;
use backhaul_protocol::{CancellationToken, Reporter};
use serde::{Deserialize, Serialize};

use crate::adapter::{ConnectionTest, DatabaseAdapter, DatabaseMapping, OperationResult, PrivilegedAuth};
use crate::error::{DbError, DbResult};
use crate::process::{find_binary, run_subprocess};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MssqlConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub selected_databases: Vec<String>,
    /// Directory on the SQL Server host (not the orchestrator) that
    /// `BACKUP`/`RESTORE` reads and writes, e.g. `C:\\Backups` or
    /// `/var/opt/mssql/backup`.
    pub server_bak_dir: String,
    #[serde(default)]
    pub side_channel: Option<SftpSideChannel>,
}

fn default_port() -> u16 {
    1433
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SftpSideChannel {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,
}

fn default_ssh_port() -> u16 {
    22
}

const MANIFEST_FILE: &str = "manifest.json";

pub struct MssqlAdapter {
    config: MssqlConfig,
}

impl MssqlAdapter {
    pub fn new(config: MssqlConfig) -> Self {
        Self { config }
    }

    fn connection_env(&self) -> Vec<(String, String)> {
        vec![("SQLCMDPASSWORD".to_string(), self.config.password.clone())]
    }

    fn connection_args(&self) -> Vec<String> {
        vec![
            "-S".to_string(),
            format!("{},{}", self.config.host, self.config.port),
            "-U".to_string(),
            self.config.username.clone(),
            "-b".to_string(), // exit nonzero on SQL error
        ]
    }

    fn remote_bak_path(&self, db: &str) -> String {
        format!(
            "{}/{}.bak",
            self.config.server_bak_dir.trim_end_matches(['/', '\\']),
            db
        )
    }

    async fn run_query(&self, query: &str, cancel: &CancellationToken, reporter: &dyn Reporter) -> DbResult<()> {
        let tool = find_binary(&["sqlcmd"])?;
        let mut args = self.connection_args();
        args.push("-Q".to_string());
        args.push(query.to_string());
        run_subprocess(&tool, &args, &self.connection_env(), None, None, cancel, reporter, LogType::Dump).await?;
        Ok(())
    }

    /// Pulls the server-side `.bak` down to `local_path`, via SFTP when a
    /// side channel is configured or a direct filesystem move otherwise.
    async fn fetch_bak(&self, remote_path: &str, local_path: &Path) -> DbResult<()> {
        match &self.config.side_channel {
            Some(channel) => sftp_download(channel.clone(), remote_path.to_string(), local_path.to_path_buf()).await,
            None => {
                tokio::fs::copy(remote_path, local_path).await?;
                Ok(())
            }
        }
    }

    /// Pushes a local `.bak` up to the server-visible `remote_path` ahead of
    /// a `RESTORE DATABASE`.
    async fn push_bak(&self, local_path: &Path, remote_path: &str) -> DbResult<()> {
        match &self.config.side_channel {
            Some(channel) => sftp_upload(channel.clone(), local_path.to_path_buf(), remote_path.to_string()).await,
            None => {
                tokio::fs::copy(local_path, remote_path).await?;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl DatabaseAdapter for MssqlAdapter {
    fn name(&self) -> &str {
        "mssql"
    }

    async fn test(&self) -> DbResult<ConnectionTest> {
        let tool = find_binary(&["sqlcmd"])?;
        let mut args = self.connection_args();
        args.push("-h".to_string());
        args.push("-1".to_string());
        args.push("-Q".to_string());
        args.push("SET NOCOUNT ON; SELECT @@VERSION;".to_string());
        let output = tokio::process::Command::new(&tool)
            .args(&args)
            .env_clear()
            .env("SQLCMDPASSWORD", &self.config.password)
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
        let tool = find_binary(&["sqlcmd"])?;
        let mut args = self.connection_args();
        args.push("-h".to_string());
        args.push("-1".to_string());
        args.push("-Q".to_string());
        args.push("SET NOCOUNT ON; SELECT name FROM sys.databases WHERE database_id > 4;".to_string());
        let output = tokio::process::Command::new(&tool)
            .args(&args)
            .env_clear()
            .env("SQLCMDPASSWORD", &self.config.password)
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
        if self.config.selected_databases.len() <= 1 {
            let db = self
                .config
                .selected_databases
                .first()
                .ok_or_else(|| DbError::ConfigInvalid("mssql dump requires at least one selected database".to_string()))?;
            let remote_path = self.remote_bak_path(db);
            let query = format!(
                "BACKUP DATABASE [{db}] TO DISK = N'{remote_path}' WITH COMPRESSION, STATS = 10;"
            );
            self.run_query(&query, cancel, reporter).await?;
            self.fetch_bak(&remote_path, dest_path).await?;
        } else {
            tokio::fs::create_dir_all(dest_path).await?;
            let mut manifest = Vec::new();
            for db in &self.config.selected_databases {
                let remote_path = self.remote_bak_path(db);
                let query = format!(
                    "BACKUP DATABASE [{db}] TO DISK = N'{remote_path}' WITH COMPRESSION, STATS = 10;"
                );
                self.run_query(&query, cancel, reporter).await?;
                let local_file = dest_path.join(format!("{db}.bak"));
                self.fetch_bak(&remote_path, &local_file).await?;
                manifest.push(db.clone());
            }
            let manifest_json = serde_json::to_vec_pretty(&manifest)
                .map_err(|err| DbError::ConfigInvalid(err.to_string()))?;
            tokio::fs::write(dest_path.join(MANIFEST_FILE), manifest_json).await?;
        }

        let bytes = directory_or_file_size(dest_path).await?;
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
        let manifest_path = src_path.join(MANIFEST_FILE);
        if tokio::fs::try_exists(&manifest_path).await.unwrap_or(false) {
            let manifest: Vec<String> = serde_json::from_slice(&tokio::fs::read(&manifest_path).await?)
                .map_err(|err| DbError::ConfigInvalid(err.to_string()))?;
            for original in &manifest {
                let target_name = mapping
                    .and_then(|m| m.get(original))
                    .filter(|entry| entry.selected)
                    .map(|entry| entry.target_name.clone());
                let Some(target_name) = target_name else { continue };
                let local_file = src_path.join(format!("{original}.bak"));
                let remote_path = self.remote_bak_path(original);
                self.push_bak(&local_file, &remote_path).await?;
                let query = format!(
                    "RESTORE DATABASE [{target_name}] FROM DISK = N'{remote_path}' WITH REPLACE, STATS = 10;"
                );
                self.run_query(&query, cancel, reporter).await?;
            }
        } else {
            let db = self
                .config
                .selected_databases
                .first()
                .ok_or_else(|| DbError::ConfigInvalid("mssql restore requires a target database".to_string()))?;
            let remote_path = self.remote_bak_path(db);
            self.push_bak(src_path, &remote_path).await?;
            let query = format!(
                "RESTORE DATABASE [{db}] FROM DISK = N'{remote_path}' WITH REPLACE, STATS = 10;"
            );
            self.run_query(&query, cancel, reporter).await?;
        }

        let bytes = directory_or_file_size(src_path).await?;
        Ok(OperationResult::success(bytes))
    }
}

async fn directory_or_file_size(path: &Path) -> DbResult<u64> {
    let metadata = tokio::fs::metadata(path).await?;
    if metadata.is_file() {
        return Ok(metadata.len());
    }
    let mut total = 0u64;
    let mut entries = tokio::fs::read_dir(path).await?;
    while let Some(entry) = entries.next_entry().await? {
        total += entry.metadata().await?.len();
    }
    Ok(total)
}

async fn sftp_download(channel: SftpSideChannel, remote_path: String, local_path: PathBuf) -> DbResult<()> {
    tokio::task::spawn_blocking(move || -> DbResult<()> {
        let sftp = open_sftp(&channel)?;
        let mut remote_file = sftp
            .open(Path::new(&remote_path))
            .map_err(|err| DbError::Unreachable(format!("sftp open {remote_path}: {err}")))?;
        let mut local_file = std::fs::File::create(&local_path)?;
        std::io::copy(&mut remote_file, &mut local_file)
            .map_err(|err| DbError::StreamIo(err.to_string()))?;
        Ok(())
    })
    .await
    .map_err(|err| DbError::StreamIo(err.to_string()))?
}

async fn sftp_upload(channel: SftpSideChannel, local_path: PathBuf, remote_path: String) -> DbResult<()> {
    tokio::task::spawn_blocking(move || -> DbResult<()> {
        let sftp = open_sftp(&channel)?;
        let mut local_file = std::fs::File::open(&local_path)?;
        let mut remote_file = sftp
            .create(Path::new(&remote_path))
            .map_err(|err| DbError::Unreachable(format!("sftp create {remote_path}: {err}")))?;
        std::io::copy(&mut local_file, &mut remote_file)
            .map_err(|err| DbError::StreamIo(err.to_string()))?;
        Ok(())
    })
    .await
    .map_err(|err| DbError::StreamIo(err.to_string()))?
}

fn open_sftp(channel: &SftpSideChannel) -> DbResult<ssh2::Sftp> {
    let tcp = std::net::TcpStream::connect((channel.host.as_str(), channel.port))
        .map_err(|err| DbError::Unreachable(format!("ssh connect {}: {err}", channel.host)))?;
    let mut session = ssh2::Session::new().map_err(|err| DbError::Unreachable(err.to_string()))?;
    session.set_tcp_stream(tcp);
    session
        .handshake()
        .map_err(|err| DbError::Unreachable(format!("ssh handshake: {err}")))?;

    if let Some(key_path) = &channel.private_key_path {
        session
            .userauth_pubkey_file(&channel.username, None, key_path, None)
            .map_err(|err| DbError::AuthDenied(err.to_string()))?;
    } else {
        let password = channel.password.as_deref().unwrap_or_default();
        session
            .userauth_password(&channel.username, password)
            .map_err(|err| DbError::AuthDenied(err.to_string()))?;
    }
    if !session.authenticated() {
        return Err(DbError::AuthDenied("sftp side channel authentication failed".to_string()));
    }

    session.sftp().map_err(|err| DbError::Unreachable(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> MssqlConfig {
        MssqlConfig {
            host: "sql.internal".to_string(),
            port: default_port(),
            username: "sa".to_string(),
            password: "hunter2".to_string(),
            selected_databases: vec!["widgets".to_string()],
            server_bak_dir: "C:\\Backups\\".to_string(),
            side_channel: None,
        }
    }

    #[test]
    fn remote_bak_path_strips_trailing_slash() {
        let adapter = MssqlAdapter::new(sample_config());
        assert_eq!(adapter.remote_bak_path("widgets"), "C:\\Backups/widgets.bak");
    }

    #[test]
    fn side_channel_defaults_to_port_22() {
        let channel: SftpSideChannel = serde_json::from_str(
            r#"{"host":"bastion.internal","username":"backhaul"}"#,
        )
        .unwrap();
        assert_eq!(channel.port, 22);
    }
}
