//! Static adapter registry (spec REDESIGN FLAGS: a closed set of
//! capability-bearing structs keyed by a stable string id), mirroring
//! `backhaul_storage`'s destination registry.

use backhaul_protocol::DatabaseKind;

use crate::adapter::DatabaseAdapter;
use crate::error::{DbError, DbResult};
use crate::mongo::{MongoAdapter, MongoConfig};
use crate::mssql::{MssqlAdapter, MssqlConfig};
use crate::mysql::{MysqlAdapter, MysqlConfig};
use crate::postgres::{PostgresAdapter, PostgresConfig};

/// Builds the concrete adapter for a source's kind and decrypted config
/// blob.
pub fn build_adapter(kind: DatabaseKind, config_json: &str) -> DbResult<Box<dyn DatabaseAdapter>> {
    match kind {
        DatabaseKind::Postgres => {
            let config: PostgresConfig = parse(config_json)?;
            Ok(Box::new(PostgresAdapter::new(config)))
        }
        DatabaseKind::Mysql | DatabaseKind::Mariadb => {
            let mut config: MysqlConfig = parse(config_json)?;
            if kind == DatabaseKind::Mariadb && config.detected_version.is_none() {
                config.detected_version = Some("mariadb".to_string());
            }
            Ok(Box::new(MysqlAdapter::new(config)))
        }
        DatabaseKind::Mongo => {
            let config: MongoConfig = parse(config_json)?;
            Ok(Box::new(MongoAdapter::new(config)))
        }
        DatabaseKind::Mssql => {
            let config: MssqlConfig = parse(config_json)?;
            Ok(Box::new(MssqlAdapter::new(config)))
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(config_json: &str) -> DbResult<T> {
    serde_json::from_str(config_json)
        .map_err(|err| DbError::ConfigInvalid(format!("invalid source config: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_json_shape_maps_to_config_invalid() {
        let result = build_adapter(DatabaseKind::Postgres, "{}");
        assert!(matches!(result, Err(DbError::ConfigInvalid(_))));
    }

    #[test]
    fn mariadb_kind_tags_family_hint_when_unset() {
        let result = build_adapter(
            DatabaseKind::Mariadb,
            r#"{"host":"db.internal","username":"root","password":"x"}"#,
        );
        assert!(result.is_ok());
    }
}
