//! Durable bet store collaborator.
//!
//! The coordinator only needs append and read-all; the trait keeps the
//! draw logic testable without touching the filesystem.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::io::AsyncWriteExt;

use crate::bet::Bet;

const BIRTHDATE_FORMAT: &str = "%Y-%m-%d";
const RECORD_FIELDS: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("bet store I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt bet record: {0:?}")]
    Corrupt(String),
}

/// Append-only bet storage.
#[async_trait]
pub trait BetStore: Send + Sync {
    /// Persist a batch, preserving its order.
    async fn append(&self, batch: &[Bet]) -> Result<(), StoreError>;

    /// Every bet persisted so far, in append order.
    async fn read_all(&self) -> Result<Vec<Bet>, StoreError>;
}

/// File-backed store, one comma-separated record per line.
pub struct FileBetStore {
    path: PathBuf,
}

impl FileBetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl BetStore for FileBetStore {
    async fn append(&self, batch: &[Bet]) -> Result<(), StoreError> {
        let mut buffer = String::new();
        for bet in batch {
            buffer.push_str(&encode_record(bet));
            buffer.push('\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .await?;
        file.write_all(buffer.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<Bet>, StoreError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        contents.lines().map(decode_record).collect()
    }
}

fn encode_record(bet: &Bet) -> String {
    format!(
        "{},{},{},{},{},{}",
        bet.agency,
        bet.first_name,
        bet.last_name,
        bet.document,
        bet.birthdate.format(BIRTHDATE_FORMAT),
        bet.number
    )
}

fn decode_record(line: &str) -> Result<Bet, StoreError> {
    let fields: Vec<&str> = line.splitn(RECORD_FIELDS, ',').collect();
    if fields.len() != RECORD_FIELDS {
        return Err(StoreError::Corrupt(line.to_string()));
    }

    let corrupt = || StoreError::Corrupt(line.to_string());
    Ok(Bet {
        agency: fields[0].parse().map_err(|_| corrupt())?,
        first_name: fields[1].to_string(),
        last_name: fields[2].to_string(),
        document: fields[3].to_string(),
        birthdate: NaiveDate::parse_from_str(fields[4], BIRTHDATE_FORMAT)
            .map_err(|_| corrupt())?,
        number: fields[5].parse().map_err(|_| corrupt())?,
    })
}

/// In-memory store for tests and local experiments.
#[derive(Default)]
pub struct MemoryBetStore {
    bets: Mutex<Vec<Bet>>,
}

impl MemoryBetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BetStore for MemoryBetStore {
    async fn append(&self, batch: &[Bet]) -> Result<(), StoreError> {
        let mut bets = self.bets.lock().unwrap_or_else(|e| e.into_inner());
        bets.extend_from_slice(batch);
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<Bet>, StoreError> {
        let bets = self.bets.lock().unwrap_or_else(|e| e.into_inner());
        Ok(bets.clone())
    }
}
