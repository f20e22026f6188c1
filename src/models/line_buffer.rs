use std::io::{self, BufRead};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub const DEFAULT_LINE_CAPACITY: usize = 1024;

/// Two-slot store for the most recently completed line of one stream.
///
/// There is exactly one writer (the reader thread draining the task's pipe)
/// and any number of concurrent readers. The writer fills the slot that is
/// not currently published and then flips `current`, so a reader only ever
/// sees a complete line. Every slot has its own lock: the writer never holds
/// the published slot, so a reader waits at most for one line copy when the
/// writer laps it.
#[derive(Debug)]
pub struct LineBuffer {
    slots: [Mutex<String>; 2],
    current: AtomicUsize,
    capacity: usize,
}

impl LineBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: [Mutex::new(String::new()), Mutex::new(String::new())],
            current: AtomicUsize::new(0),
            capacity,
        }
    }

    /// Publish `line`, truncated to the buffer's capacity.
    ///
    /// Must only be called from the single writer of this buffer.
    pub fn write_line(&self, line: &str) {
        let next = self.current.load(Ordering::Relaxed) ^ 1;
        {
            let mut slot = lock_slot(&self.slots[next]);
            slot.clear();
            slot.push_str(truncate(line, self.capacity));
        }
        self.current.store(next, Ordering::Release);
    }

    /// Latest completed line, or an empty string if none has completed yet.
    pub fn read_latest(&self) -> String {
        let current = self.current.load(Ordering::Acquire);
        lock_slot(&self.slots[current]).clone()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LINE_CAPACITY)
    }
}

fn lock_slot(slot: &Mutex<String>) -> MutexGuard<'_, String> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Read one `\n`-terminated line into `line`, keeping at most `limit` bytes.
///
/// The rest of an overlong line is consumed and dropped, so memory stays
/// bounded no matter how long the line is. The newline itself is never
/// stored. Returns the number of bytes consumed; 0 means end of input.
pub fn read_bounded_line<R: BufRead + ?Sized>(
    reader: &mut R,
    limit: usize,
    line: &mut Vec<u8>,
) -> io::Result<usize> {
    line.clear();
    let mut consumed = 0;
    loop {
        let available = match reader.fill_buf() {
            Ok(available) => available,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if available.is_empty() {
            return Ok(consumed);
        }

        let newline = available.iter().position(|&b| b == b'\n');
        let chunk = &available[..newline.unwrap_or(available.len())];
        let room = limit.saturating_sub(line.len());
        line.extend_from_slice(&chunk[..chunk.len().min(room)]);

        let used = newline.map_or(available.len(), |i| i + 1);
        reader.consume(used);
        consumed += used;
        if newline.is_some() {
            return Ok(consumed);
        }
    }
}

/// Cut `line` to at most `capacity` bytes without splitting a character.
fn truncate(line: &str, capacity: usize) -> &str {
    if line.len() <= capacity {
        return line;
    }
    let mut end = capacity;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    &line[..end]
}
