//! Storage adapter interface and backends (C2): `upload/download/read/list/
//! delete/test` over local FS, S3-compatible object storage, FTP/FTPS,
//! WebDAV, and Google Drive destinations.

pub mod adapter;
pub mod error;
pub mod ftp;
pub mod gdrive;
pub mod local;
pub mod registry;
pub mod s3;
pub mod snapshot;
pub mod webdav;

pub use adapter::{normalize_path, ProgressSink, StorageAdapter, StorageEntry, TestResult};
pub use error::{StorageError, StorageResult};
pub use registry::build_adapter;
pub use snapshot::capture_snapshot;
