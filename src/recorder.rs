// ===============================
// src/recorder.rs
// ===============================
//
// JSONL store yang ringan & tahan banting:
// - Every write lands in an in-memory index first (queries, /metrics/trading),
//   then goes to a background writer as one tagged JSON line (append).
// - Bufer dengan BufWriter; flush tiap 1s, tiap 1000 record, dan on demand.
// - Parent directory dibuat otomatis.
// - Jika tulis gagal, coba reopen file dan lanjut.
// - On open, an existing file is replayed line by line so a restart can
//   rehydrate. The file keeps full history; the index keeps only the newest
//   `sample_retention` samples per symbol.
//
// ENV: set `RECORD_FILE=/path/to/events.jsonl` agar aktif (lihat main.rs).
//
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{
    fs::{self, OpenOptions},
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter},
    sync::{mpsc, oneshot},
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{error, info, warn};

use crate::domain::{Order, Position, PositionUpdate, PriceSample, Signal, TradingSummary};
use crate::error::StoreError;
use crate::store::{MemoryStore, Store};

const FLUSH_EVERY_N_RECORDS: u32 = 1000;
const WRITER_QUEUE: usize = 8192;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Record {
    Sample(PriceSample),
    Signal(Signal),
    Order(Order),
    Position(Position),
    PositionUpdate { symbol: String, update: PositionUpdate },
}

enum Command {
    Write(Record),
    Flush(oneshot::Sender<()>),
}

pub struct JsonlStore {
    index: MemoryStore,
    tx: mpsc::Sender<Command>,
}

impl JsonlStore {
    pub async fn open(path: impl Into<PathBuf>, sample_retention: usize) -> Result<Self, StoreError> {
        let path = path.into();
        let index = MemoryStore::with_sample_retention(sample_retention);
        let replayed = replay(&path, &index).await?;

        let writer = open_writer(&path).await?;
        let (tx, rx) = mpsc::channel(WRITER_QUEUE);
        tokio::spawn(run(rx, path.clone(), writer));

        info!(path = %path.display(), replayed, "recorder: started");
        Ok(Self { index, tx })
    }

    pub fn index(&self) -> &MemoryStore { &self.index }

    async fn record(&self, rec: Record) -> Result<(), StoreError> {
        self.tx.send(Command::Write(rec)).await.map_err(|_| StoreError::WriterClosed)
    }
}

#[async_trait]
impl Store for JsonlStore {
    async fn save_sample(&self, sample: &PriceSample) -> Result<(), StoreError> {
        self.index.save_sample(sample).await?;
        self.record(Record::Sample(sample.clone())).await
    }

    async fn save_signal(&self, signal: &Signal) -> Result<(), StoreError> {
        self.index.save_signal(signal).await?;
        self.record(Record::Signal(signal.clone())).await
    }

    async fn save_order(&self, order: &Order) -> Result<(), StoreError> {
        self.index.save_order(order).await?;
        self.record(Record::Order(order.clone())).await
    }

    async fn save_position(&self, position: &Position) -> Result<(), StoreError> {
        self.index.save_position(position).await?;
        self.record(Record::Position(position.clone())).await
    }

    async fn update_position(&self, symbol: &str, update: &PositionUpdate) -> Result<(), StoreError> {
        self.index.update_position(symbol, update).await?;
        self.record(Record::PositionUpdate { symbol: symbol.to_string(), update: update.clone() }).await
    }

    async fn recent_samples(&self, symbol: &str, limit: usize) -> Result<Vec<PriceSample>, StoreError> {
        self.index.recent_samples(symbol, limit).await
    }

    async fn open_position(&self, symbol: &str) -> Result<Option<Position>, StoreError> {
        self.index.open_position(symbol).await
    }

    async fn summary(&self) -> Result<TradingSummary, StoreError> {
        self.index.summary().await
    }

    async fn flush(&self) -> Result<(), StoreError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx.send(Command::Flush(ack_tx)).await.map_err(|_| StoreError::WriterClosed)?;
        ack_rx.await.map_err(|_| StoreError::WriterClosed)
    }
}

/// Load an existing file into `index`. Unparseable lines are skipped.
async fn replay(path: &Path, index: &MemoryStore) -> Result<usize, StoreError> {
    let file = match fs::File::open(path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut lines = BufReader::new(file).lines();
    let mut n = 0;
    let mut lineno = 0usize;
    while let Some(line) = lines.next_line().await? {
        lineno += 1;
        if line.trim().is_empty() {
            continue;
        }
        let rec = match serde_json::from_str::<Record>(&line) {
            Ok(r) => r,
            Err(e) => {
                warn!(?e, line = lineno, "recorder: skip unreadable line");
                continue;
            }
        };
        let applied = match &rec {
            Record::Sample(s) => index.save_sample(s).await,
            Record::Signal(s) => index.save_signal(s).await,
            Record::Order(o) => index.save_order(o).await,
            Record::Position(p) => index.save_position(p).await,
            Record::PositionUpdate { symbol, update } => index.update_position(symbol, update).await,
        };
        if let Err(e) = applied {
            warn!(?e, line = lineno, "recorder: replay skipped record");
            continue;
        }
        n += 1;
    }
    Ok(n)
}

async fn open_writer(path: &Path) -> Result<BufWriter<fs::File>, std::io::Error> {
    // Pastikan parent directory ada (kalau ada)
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(path).await?;
    Ok(BufWriter::new(file))
}

async fn write_line(writer: &mut BufWriter<fs::File>, line: &[u8]) -> Result<(), std::io::Error> {
    writer.write_all(line).await?;
    writer.write_all(b"\n").await
}

async fn run(mut rx: mpsc::Receiver<Command>, path: PathBuf, mut writer: BufWriter<fs::File>) {
    // Flush periodik (tiap 1 detik) + flush berbasis jumlah record
    let mut tick = interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut since_last_flush: u32 = 0;

    loop {
        tokio::select! {
            cmd = rx.recv() => {
                match cmd {
                    Some(Command::Write(rec)) => {
                        let line = match serde_json::to_vec(&rec) {
                            Ok(s) => s,
                            Err(e) => {
                                error!(?e, "recorder: serialize error, skip record");
                                continue;
                            }
                        };

                        if let Err(e) = write_line(&mut writer, &line).await {
                            error!(?e, "recorder: write failed, attempting reopen");
                            match open_writer(&path).await {
                                Ok(w) => writer = w,
                                Err(e2) => {
                                    error!(?e2, "recorder: reopen failed, drop record");
                                    continue;
                                }
                            }
                            // coba lagi sekali setelah reopen
                            if let Err(e2) = write_line(&mut writer, &line).await {
                                error!(?e2, "recorder: write failed again after reopen, drop record");
                                continue;
                            }
                        }

                        since_last_flush += 1;
                        if since_last_flush >= FLUSH_EVERY_N_RECORDS {
                            let _ = writer.flush().await;
                            since_last_flush = 0;
                        }
                    }
                    Some(Command::Flush(ack)) => {
                        if let Err(e) = writer.flush().await {
                            error!(?e, "recorder: flush failed");
                        }
                        since_last_flush = 0;
                        let _ = ack.send(());
                    }
                    None => {
                        // Channel closed: flush dan keluar
                        let _ = writer.flush().await;
                        info!("recorder: channel closed, stopped");
                        break;
                    }
                }
            }

            _ = tick.tick() => {
                let _ = writer.flush().await;
                since_last_flush = 0;
            }
        }
    }
}
