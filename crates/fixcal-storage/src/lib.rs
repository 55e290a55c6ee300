//! SQLite fixture store, atomic feed file writes and page fetching for fixcal.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use fixcal_core::{Fixture, IdentityKey, StoredFixture};
use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow, SqliteSynchronous};
use sqlx::{Row, Sqlite, Transaction};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "fixcal-storage";

const SELECT_COLUMNS: &str = "SELECT identity_key, match_date, kickoff, home_team, away_team, venue, result, \
     revision, created_at, updated_at FROM fixtures";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("creating store directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("opening fixture store {path}")]
    Open {
        path: PathBuf,
        #[source]
        source: sqlx::Error,
    },
    #[error("migrating fixture store schema")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("fixture store query failed")]
    Query(#[from] sqlx::Error),
    #[error("corrupt fixture row {key}: {reason}")]
    CorruptRow { key: String, reason: String },
}

/// Handle to the on-disk fixture store. Open once per run, pass it down,
/// and [`close`](FixtureStore::close) it on the way out.
#[derive(Debug, Clone)]
pub struct FixtureStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl FixtureStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .synchronous(SqliteSynchronous::Full);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|source| StoreError::Open {
                path: path.clone(),
                source,
            })?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        debug!(path = %path.display(), "fixture store opened");
        Ok(Self { pool, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self, key: &IdentityKey) -> Result<Option<StoredFixture>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE identity_key = ?1"))
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_stored).transpose()
    }

    /// Full scan ordered by date, kickoff (unknown first) and identity key.
    pub async fn all_sorted(&self) -> Result<Vec<StoredFixture>, StoreError> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} ORDER BY match_date ASC, kickoff ASC, identity_key ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_stored).collect()
    }

    pub async fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM fixtures")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    pub async fn begin(&self) -> Result<StoreTransaction, StoreError> {
        Ok(StoreTransaction {
            tx: self.pool.begin().await?,
        })
    }

    /// Flush and release the database file.
    pub async fn close(self) {
        self.pool.close().await;
        debug!(path = %self.path.display(), "fixture store closed");
    }
}

/// Write scope over the store. Dropping it without [`commit`](Self::commit)
/// rolls every change back.
pub struct StoreTransaction {
    tx: Transaction<'static, Sqlite>,
}

impl StoreTransaction {
    pub async fn get(&mut self, key: &IdentityKey) -> Result<Option<StoredFixture>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE identity_key = ?1"))
            .bind(key.as_str())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_stored).transpose()
    }

    pub async fn insert(&mut self, fixture: &Fixture, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO fixtures
                (identity_key, match_date, kickoff, home_team, away_team, venue, result,
                 revision, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?8)
            "#,
        )
        .bind(fixture.identity_key().as_str())
        .bind(fixture.date())
        .bind(fixture.time())
        .bind(fixture.home_team())
        .bind(fixture.away_team())
        .bind(fixture.venue())
        .bind(fixture.result())
        .bind(at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    /// Fill in a late result on an existing row and bump its revision.
    pub async fn merge_result(
        &mut self,
        key: &IdentityKey,
        result: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let done = sqlx::query(
            r#"
            UPDATE fixtures
               SET result = ?1, revision = revision + 1, updated_at = ?2
             WHERE identity_key = ?3
            "#,
        )
        .bind(result)
        .bind(at)
        .bind(key.as_str())
        .execute(&mut *self.tx)
        .await?;
        if done.rows_affected() != 1 {
            return Err(StoreError::CorruptRow {
                key: key.to_string(),
                reason: format!("expected one row to update, touched {}", done.rows_affected()),
            });
        }
        Ok(())
    }

    pub async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

fn row_to_stored(row: &SqliteRow) -> Result<StoredFixture, StoreError> {
    let key: String = row.try_get("identity_key")?;
    let date: NaiveDate = row.try_get("match_date")?;
    let kickoff: Option<NaiveTime> = row.try_get("kickoff")?;
    let home_team: String = row.try_get("home_team")?;
    let away_team: String = row.try_get("away_team")?;
    let venue: String = row.try_get("venue")?;
    let result: String = row.try_get("result")?;
    let revision: i64 = row.try_get("revision")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    let corrupt = |reason: String| StoreError::CorruptRow {
        key: key.clone(),
        reason,
    };
    let fixture = Fixture::new(date, kickoff, &home_team, &away_team, &venue, &result)
        .map_err(|e| corrupt(e.to_string()))?;
    if fixture.identity_key().as_str() != key {
        return Err(corrupt("identity key does not match stored fields".to_string()));
    }
    let revision = u32::try_from(revision).map_err(|_| corrupt(format!("bad revision {revision}")))?;

    Ok(StoredFixture {
        fixture,
        created_at,
        updated_at,
        revision,
    })
}

#[derive(Debug, Error)]
pub enum FeedWriteError {
    #[error("{action} {path}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct FeedWrite {
    pub path: PathBuf,
    pub content_hash: String,
    pub byte_size: usize,
    pub unchanged: bool,
}

/// Calendar output file, replaced atomically on every write.
#[derive(Debug, Clone)]
pub struct FeedFile {
    path: PathBuf,
}

impl FeedFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    /// Write via temp file + rename in the same directory. Identical content is
    /// left in place so the file's mtime only moves when the feed changes.
    pub async fn write_atomic(&self, bytes: &[u8]) -> Result<FeedWrite, FeedWriteError> {
        let content_hash = Self::sha256_hex(bytes);
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let io_err = |action: &'static str, path: &Path| {
            let path = path.to_path_buf();
            move |source| FeedWriteError::Io {
                action,
                path,
                source,
            }
        };

        fs::create_dir_all(&parent)
            .await
            .map_err(io_err("creating feed directory", &parent))?;

        if let Ok(existing) = fs::read(&self.path).await {
            if Self::sha256_hex(&existing) == content_hash {
                return Ok(FeedWrite {
                    path: self.path.clone(),
                    content_hash,
                    byte_size: bytes.len(),
                    unchanged: true,
                });
            }
        }

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "feed".to_string());
        let temp_path = parent.join(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

        let written: Result<(), FeedWriteError> = async {
            let mut file = fs::OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&temp_path)
                .await
                .map_err(io_err("opening temp feed file", &temp_path))?;
            file.write_all(bytes)
                .await
                .map_err(io_err("writing temp feed file", &temp_path))?;
            file.flush()
                .await
                .map_err(io_err("flushing temp feed file", &temp_path))?;
            file.sync_all()
                .await
                .map_err(io_err("syncing temp feed file", &temp_path))?;
            drop(file);
            fs::rename(&temp_path, &self.path)
                .await
                .map_err(io_err("replacing feed file", &self.path))
        }
        .await;

        if let Err(err) = written {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err);
        }

        Ok(FeedWrite {
            path: self.path.clone(),
            content_hash,
            byte_size: bytes.len(),
            unchanged: false,
        })
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub final_url: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("reading {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Single-shot page fetcher. `file://` URLs are read from disk.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        Ok(Self {
            client: builder.build()?,
        })
    }

    pub async fn fetch_bytes(&self, url: &str) -> Result<FetchedResponse, FetchError> {
        let span = info_span!("fetch_page", url);
        async {
            if let Some(path) = url.strip_prefix("file://") {
                let body = fs::read(path).await.map_err(|source| FetchError::File {
                    path: PathBuf::from(path),
                    source,
                })?;
                return Ok(FetchedResponse {
                    final_url: url.to_string(),
                    body,
                });
            }

            let resp = self.client.get(url).send().await?;
            let status = resp.status();
            let final_url = resp.url().to_string();
            if !status.is_success() {
                return Err(FetchError::HttpStatus {
                    status: status.as_u16(),
                    url: final_url,
                });
            }
            let body = resp.bytes().await?.to_vec();
            debug!(bytes = body.len(), "page fetched");
            Ok(FetchedResponse { final_url, body })
        }
        .instrument(span)
        .await
    }
}
