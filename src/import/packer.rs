use crate::config::MAX_BATCH_SIZE;
use crate::import::record::{WriteItem, parse_record};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// A group of puts submitted in one request.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Zero-based dispatch position.
    pub index: usize,
    pub items: Vec<WriteItem>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Streams records from a line source into fixed-size batches.
///
/// Malformed lines are logged and skipped; they never count toward a batch
/// or toward [`RecordPacker::total_items`]. Neither do records collected
/// before a read error, since they never reach a batch.
pub struct RecordPacker<R> {
    source: R,
    batch_size: usize,
    line_buf: Vec<u8>,
    line_number: u64,
    batches: usize,
    total_items: usize,
    skipped_lines: usize,
}

impl<R> RecordPacker<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(source: R) -> Self {
        Self::with_batch_size(source, MAX_BATCH_SIZE)
    }

    /// Sizes above the backend limit are clamped to it.
    pub fn with_batch_size(source: R, batch_size: usize) -> Self {
        Self {
            source,
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
            line_buf: Vec::with_capacity(1024),
            line_number: 0,
            batches: 0,
            total_items: 0,
            skipped_lines: 0,
        }
    }

    /// Records placed in a returned batch so far.
    pub fn total_items(&self) -> usize {
        self.total_items
    }

    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    /// Read up to `batch_size` records.
    ///
    /// Returns `Ok(None)` once the source is exhausted and nothing was
    /// collected. A short batch only happens at end of input.
    pub async fn pack(&mut self) -> std::io::Result<Option<Batch>> {
        let mut items = Vec::with_capacity(self.batch_size);

        while items.len() < self.batch_size {
            let Some(len) = self.read_line().await? else {
                break;
            };
            let line = &self.line_buf[..len];

            match parse_record(line) {
                Ok(record) => items.push(WriteItem::put(record)),
                Err(e) => {
                    self.skipped_lines += 1;
                    log::warn!(
                        "line {}: failed to unmarshal {:?}: {}",
                        self.line_number,
                        String::from_utf8_lossy(line),
                        e
                    );
                }
            }
        }

        if items.is_empty() {
            return Ok(None);
        }

        let batch = Batch {
            index: self.batches,
            items,
        };
        self.batches += 1;
        self.total_items += batch.len();
        log::trace!(
            "packed batch {} with {} items (total {})",
            batch.index,
            batch.len(),
            self.total_items
        );
        Ok(Some(batch))
    }

    /// Fill `line_buf` with the next line and return its length without the
    /// line terminator.
    async fn read_line(&mut self) -> std::io::Result<Option<usize>> {
        self.line_buf.clear();
        let read = self.source.read_until(b'\n', &mut self.line_buf).await?;
        if read == 0 {
            return Ok(None);
        }
        self.line_number += 1;

        let mut len = self.line_buf.len();
        if self.line_buf[..len].ends_with(b"\n") {
            len -= 1;
        }
        if self.line_buf[..len].ends_with(b"\r") {
            len -= 1;
        }
        Ok(Some(len))
    }
}
