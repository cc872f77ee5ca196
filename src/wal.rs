use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Upper bound on one encoded event; a larger length prefix is treated as corruption.
const MAX_RECORD_LEN: usize = 1 << 20;

/// Encode a single event as `[len][bincode][crc32]`. Returns the bytes written.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<u64> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "event too large"))?;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(8 + u64::from(len))
}

/// Result of reading a log back.
#[derive(Debug, Default)]
pub struct Replay {
    pub events: Vec<Event>,
    /// True when trailing bytes were dropped (torn write or bad checksum).
    pub discarded_tail: bool,
    /// Bytes of the file covered by `events`.
    pub valid_len: u64,
}

/// Append-only reservation log.
///
/// Format per entry: `[u32: len][bincode: Event][u32: crc32]`, little endian.
/// `len` covers the payload only. A torn last entry is detected by the length
/// prefix and CRC and dropped on replay.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    /// File length covered by entries that reached a successful `flush_sync`.
    synced_len: u64,
    /// Bytes and entries appended since then.
    pending_len: u64,
    pending: u64,
    appends_since_compact: u64,
    #[cfg(test)]
    fail_next_sync: bool,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let synced_len = file.metadata()?.len();
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            synced_len,
            pending_len: 0,
            pending: 0,
            appends_since_compact: 0,
            #[cfg(test)]
            fail_next_sync: false,
        })
    }

    /// Append and fsync one event. Tests only; the engine batches through
    /// `append_buffered` + `flush_sync`.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Buffer an event without syncing. Durable only after `flush_sync()`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        self.pending_len += encode_event(&mut self.writer, event)?;
        self.pending += 1;
        Ok(())
    }

    /// Write out and fsync everything appended so far. On error the pending
    /// entries may be partly on disk; call `rollback` before appending again.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        #[cfg(test)]
        if std::mem::take(&mut self.fail_next_sync) {
            return Err(io::Error::other("injected fsync failure"));
        }
        self.writer.get_ref().sync_all()?;
        self.synced_len += self.pending_len;
        self.appends_since_compact += self.pending;
        self.pending_len = 0;
        self.pending = 0;
        Ok(())
    }

    /// Drop every entry appended since the last successful `flush_sync`,
    /// buffered or already written, and make the cut durable.
    pub fn rollback(&mut self) -> io::Result<()> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        file.set_len(self.synced_len)?;
        file.sync_all()?;
        let stale = std::mem::replace(&mut self.writer, BufWriter::new(file));
        // into_parts hands back the unwritten buffer instead of flushing it.
        let _ = stale.into_parts();
        self.pending_len = 0;
        self.pending = 0;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn fail_next_sync(&mut self) {
        self.fail_next_sync = true;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn compact_tmp_path(path: &Path) -> PathBuf {
        path.with_extension("wal.tmp")
    }

    /// Write a compacted log next to `path` and fsync it. Slow; the live log is untouched.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let file = File::create(Self::compact_tmp_path(path))?;
        let mut writer = BufWriter::new(file);
        for event in events {
            encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the compacted file over the live log and append to it from now on.
    /// The handle is opened before the rename, so a failure leaves the old log
    /// live and still the one being appended to.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        let tmp = Self::compact_tmp_path(&self.path);
        let file = OpenOptions::new().append(true).open(&tmp)?;
        let len = file.metadata()?.len();
        fs::rename(&tmp, &self.path)?;
        self.writer = BufWriter::new(file);
        self.synced_len = len;
        self.pending_len = 0;
        self.pending = 0;
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Cut the file back to `len` bytes so new appends follow the last intact entry.
    pub fn truncate(path: &Path, len: u64) -> io::Result<()> {
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(len)?;
        file.sync_all()
    }

    /// Read every intact entry. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Replay> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Replay::default()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut replay = Replay::default();

        loop {
            let mut len_buf = [0u8; 4];
            match read_full(&mut reader, &mut len_buf)? {
                Fill::Complete => {}
                Fill::Empty => break,
                Fill::Partial => {
                    replay.discarded_tail = true;
                    break;
                }
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_RECORD_LEN {
                replay.discarded_tail = true;
                break;
            }

            let mut payload = vec![0u8; len];
            let mut crc_buf = [0u8; 4];
            if read_full(&mut reader, &mut payload)? != Fill::Complete
                || read_full(&mut reader, &mut crc_buf)? != Fill::Complete
            {
                replay.discarded_tail = true;
                break;
            }

            if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
                replay.discarded_tail = true;
                break;
            }
            match bincode::deserialize::<Event>(&payload) {
                Ok(event) => {
                    replay.events.push(event);
                    replay.valid_len += 8 + len as u64;
                }
                Err(_) => {
                    replay.discarded_tail = true;
                    break;
                }
            }
        }

        Ok(replay)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Fill {
    Complete,
    Empty,
    Partial,
}

/// Like `read_exact`, but tells a clean EOF apart from a short read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<Fill> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(match filled {
        n if n == buf.len() => Fill::Complete,
        0 => Fill::Empty,
        _ => Fill::Partial,
    })
}
