use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// File magic, written once at offset 0. Bump the trailing digit on format changes.
pub const MAGIC: &[u8; 8] = b"CAMPWAL1";

/// Encode one event as a `[len][bincode][crc32]` frame. Returns the frame size.
fn encode_frame(writer: &mut impl Write, event: &Event) -> io::Result<u64> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "event too large"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(8 + u64::from(len))
}

/// Read the next frame and its size. `Ok(None)` marks the end of the usable
/// log: clean EOF, a torn trailing frame, or a checksum mismatch.
fn decode_frame(reader: &mut impl Read) -> io::Result<Option<(Event, u64)>> {
    let mut len_buf = [0u8; 4];
    if !read_full(reader, &mut len_buf)? {
        return Ok(None);
    }
    let len = u32::from_le_bytes(len_buf) as usize;

    let mut payload = vec![0u8; len];
    if !read_full(reader, &mut payload)? {
        return Ok(None);
    }
    let mut crc_buf = [0u8; 4];
    if !read_full(reader, &mut crc_buf)? {
        return Ok(None);
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(None);
    }
    Ok(bincode::deserialize::<Event>(&payload)
        .ok()
        .map(|event| (event, 8 + len as u64)))
}

/// `read_exact` that reports a short read as `false` instead of an error.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Append-only write-ahead log of catalog and reservation events.
///
/// Layout: the 8-byte [`MAGIC`] header followed by frames of
/// `[u32: len][bincode: Event][u32: crc32]`. A crash can leave a torn last
/// frame; replay stops at the first frame that is short or fails its checksum.
///
/// The file never holds more than the intact prefix plus the batch in
/// flight: `open` cuts off a torn tail and `rollback` cuts off a batch that
/// failed to sync, so later frames always follow an intact one.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
    /// File length as of the last successful sync.
    committed_len: u64,
    committed_appends: u64,
    pending_len: u64,
    /// Set when a failed batch could not be cut off. Appends are refused
    /// until a compaction replaces the file.
    broken: bool,
    #[cfg(test)]
    fail_next_sync: bool,
}

impl Wal {
    /// Open (or create) the log at `path`, writing the header into a new file
    /// and truncating anything after the last intact frame.
    pub fn open(path: &Path) -> io::Result<Self> {
        let (_, intact_len) = Self::scan(path)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let on_disk = file.metadata()?.len();
        if intact_len < on_disk {
            tracing::warn!(
                "{}: dropping {} bytes after the last intact frame",
                path.display(),
                on_disk - intact_len
            );
            file.set_len(intact_len)?;
            file.sync_all()?;
        }
        let mut writer = BufWriter::new(file);
        let mut committed_len = intact_len;
        if intact_len == 0 {
            writer.write_all(MAGIC)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            committed_len = MAGIC.len() as u64;
        }
        Ok(Self {
            writer,
            path: path.to_path_buf(),
            appends_since_compact: 0,
            committed_len,
            committed_appends: 0,
            pending_len: 0,
            broken: false,
            #[cfg(test)]
            fail_next_sync: false,
        })
    }

    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Buffer one event. Nothing is durable until `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        self.check_usable()?;
        self.pending_len += encode_frame(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.check_usable()?;
        self.writer.flush()?;
        self.injected_sync_failure()?;
        self.writer.get_ref().sync_all()?;
        self.committed_len += self.pending_len;
        self.pending_len = 0;
        self.committed_appends = self.appends_since_compact;
        Ok(())
    }

    /// Discard everything appended since the last successful `flush_sync`,
    /// both the unwritten buffer and any bytes that already reached the file.
    /// If the file cannot be cut back, the log stops accepting appends.
    pub fn rollback(&mut self) -> io::Result<()> {
        self.pending_len = 0;
        self.appends_since_compact = self.committed_appends;
        let result = self.truncate_to_committed();
        if result.is_err() {
            self.broken = true;
        }
        result
    }

    fn truncate_to_committed(&mut self) -> io::Result<()> {
        let file = self.writer.get_ref().try_clone()?;
        let stale = std::mem::replace(&mut self.writer, BufWriter::new(file));
        // into_parts hands back the unwritten bytes instead of flushing them.
        let (_stale_file, _unwritten) = stale.into_parts();
        let file = self.writer.get_ref();
        file.set_len(self.committed_len)?;
        file.sync_all()
    }

    fn check_usable(&self) -> io::Result<()> {
        if self.broken {
            return Err(io::Error::other(format!(
                "{}: journal holds a failed batch that could not be removed",
                self.path.display()
            )));
        }
        Ok(())
    }

    #[cfg(test)]
    fn injected_sync_failure(&mut self) -> io::Result<()> {
        if std::mem::take(&mut self.fail_next_sync) {
            return Err(io::Error::other("injected sync failure"));
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn injected_sync_failure(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Make the next `flush_sync` fail after its bytes reach the file.
    #[cfg(test)]
    pub(crate) fn fail_next_sync(&mut self) {
        self.fail_next_sync = true;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Write a replacement log next to `path`. Slow; runs before the swap.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let tmp_path = path.with_extension("wal.tmp");
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        writer.write_all(MAGIC)?;
        for event in events {
            encode_frame(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the compacted file over the live log and reopen it for appends.
    /// Anything appended but not synced is dropped with the old file.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        let tmp_path = self.path.with_extension("wal.tmp");
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new().append(true).open(&self.path)?;
        self.committed_len = file.metadata()?.len();
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        self.committed_appends = 0;
        self.pending_len = 0;
        self.broken = false;
        Ok(())
    }

    /// Replay every intact event. A missing file is an empty log; a file with
    /// a foreign header is refused rather than misread.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        Self::scan(path).map(|(events, _)| events)
    }

    /// Intact events plus the byte length they occupy, header included.
    /// A missing file or a short header scans as length 0.
    fn scan(path: &Path) -> io::Result<(Vec<Event>, u64)> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);

        let mut header = [0u8; 8];
        if !read_full(&mut reader, &mut header)? {
            return Ok((Vec::new(), 0));
        }
        if &header != MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{}: not a campd journal", path.display()),
            ));
        }

        let mut events = Vec::new();
        let mut len = MAGIC.len() as u64;
        while let Some((event, frame_len)) = decode_frame(&mut reader)? {
            events.push(event);
            len += frame_len;
        }
        Ok((events, len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Span;
    use ulid::Ulid;

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("campd_test_wal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn campground(id: Ulid) -> Event {
        Event::CampgroundCreated {
            id,
            name: Some("Pine Flat".into()),
            max_reservations: 4,
        }
    }

    fn requested(campground_id: Ulid) -> Event {
        Event::ReservationRequested {
            id: Ulid::new(),
            campground_id,
            user_id: "hiker".into(),
            span: Span::new(1000, 2000),
            count: 1,
            created_at: 10,
        }
    }

    #[test]
    fn append_and_replay() {
        let path = tmp_path("append_and_replay.wal");
        let cid = Ulid::new();
        let events = vec![campground(cid), requested(cid)];
        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append(e).unwrap();
            }
        }
        assert_eq!(Wal::replay(&path).unwrap(), events);
    }

    #[test]
    fn reopen_does_not_rewrite_header() {
        let path = tmp_path("reopen.wal");
        let cid = Ulid::new();
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&campground(cid)).unwrap();
        }
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&requested(cid)).unwrap();
        }
        assert_eq!(Wal::replay(&path).unwrap().len(), 2);
    }

    #[test]
    fn torn_tail_is_dropped() {
        let path = tmp_path("torn_tail.wal");
        let event = campground(Ulid::new());
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&event).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[7u8; 6]).unwrap();
        }
        assert_eq!(Wal::replay(&path).unwrap(), vec![event]);
    }

    #[test]
    fn bad_checksum_stops_replay() {
        let path = tmp_path("bad_crc.wal");
        let good = campground(Ulid::new());
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&good).unwrap();
        }
        {
            let payload = bincode::serialize(&Event::TagDeleted { id: Ulid::new() }).unwrap();
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&0xDEAD_BEEFu32.to_le_bytes()).unwrap();
        }
        assert_eq!(Wal::replay(&path).unwrap(), vec![good]);
    }

    #[test]
    fn reopen_cuts_torn_tail_so_later_appends_survive() {
        let path = tmp_path("torn_then_append.wal");
        let cid = Ulid::new();
        let first = campground(cid);
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&first).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[7u8; 6]).unwrap();
        }
        let later = requested(cid);
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&later).unwrap();
        }
        assert_eq!(Wal::replay(&path).unwrap(), vec![first, later]);
    }

    #[test]
    fn rollback_removes_bytes_already_written() {
        let path = tmp_path("rollback.wal");
        let cid = Ulid::new();
        let kept = campground(cid);
        let mut wal = Wal::open(&path).unwrap();
        wal.append(&kept).unwrap();
        let committed = fs::metadata(&path).unwrap().len();

        // One frame pushed through to the file, one still buffered.
        wal.append_buffered(&requested(cid)).unwrap();
        wal.writer.flush().unwrap();
        wal.append_buffered(&requested(cid)).unwrap();
        assert!(fs::metadata(&path).unwrap().len() > committed);

        wal.rollback().unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), committed);
        assert_eq!(wal.appends_since_compact(), 1);

        let later = requested(cid);
        wal.append(&later).unwrap();
        drop(wal);
        assert_eq!(Wal::replay(&path).unwrap(), vec![kept, later]);
    }

    #[test]
    fn failed_sync_leaves_frames_until_rollback() {
        let path = tmp_path("failed_sync.wal");
        let cid = Ulid::new();
        let mut wal = Wal::open(&path).unwrap();
        wal.append(&campground(cid)).unwrap();

        wal.append_buffered(&requested(cid)).unwrap();
        wal.fail_next_sync();
        assert!(wal.flush_sync().is_err());
        assert_eq!(Wal::replay(&path).unwrap().len(), 2);

        wal.rollback().unwrap();
        assert_eq!(Wal::replay(&path).unwrap().len(), 1);
    }

    #[test]
    fn missing_file_is_empty() {
        let path = tmp_path("missing.wal");
        assert!(Wal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn foreign_file_is_refused() {
        let path = tmp_path("foreign.wal");
        fs::write(&path, b"PGDMP\x01\x0e\x00 not ours").unwrap();
        let err = Wal::replay(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn compact_then_append() {
        let path = tmp_path("compact_append.wal");
        let cid = Ulid::new();
        let mut wal = Wal::open(&path).unwrap();
        for _ in 0..20 {
            wal.append(&requested(cid)).unwrap();
        }
        let before = fs::metadata(&path).unwrap().len();

        let snapshot = vec![campground(cid)];
        Wal::write_compact_file(&path, &snapshot).unwrap();
        wal.swap_compact_file().unwrap();
        assert_eq!(wal.appends_since_compact(), 0);
        assert!(fs::metadata(&path).unwrap().len() < before);

        let later = requested(cid);
        wal.append(&later).unwrap();
        drop(wal);

        assert_eq!(Wal::replay(&path).unwrap(), vec![snapshot[0].clone(), later]);
    }

    #[test]
    fn buffered_appends_count_until_flush() {
        let path = tmp_path("buffered.wal");
        let cid = Ulid::new();
        let mut wal = Wal::open(&path).unwrap();
        for _ in 0..5 {
            wal.append_buffered(&requested(cid)).unwrap();
        }
        assert_eq!(wal.appends_since_compact(), 5);
        wal.flush_sync().unwrap();
        assert_eq!(Wal::replay(&path).unwrap().len(), 5);
    }
}
