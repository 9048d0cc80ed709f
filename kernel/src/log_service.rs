//! Structured kernel log service.
//!
//! Provides a fixed-size, heap-free circular buffer of structured log
//! entries. Each entry carries a tick timestamp, severity level, and a
//! fixed-length message. The service is stored as const-initialized global
//! state behind a [`spin::Mutex`] and doubles as the backend for the [`log`]
//! crate facade, so ordinary `log::info!("...")` calls anywhere in the
//! kernel land in the same buffer.
//!
//! # Usage
//!
//! ```ignore
//! log_service::init();
//! log::info!("scheduler initialized");
//! let n = log_service::count();
//! ```
//!
//! The buffer holds up to [`LOG_BUFFER_CAPACITY`] entries. Once full it wraps
//! around and silently overwrites the oldest entries.

use log::{Level, Metadata, Record};
use spin::Mutex;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Maximum number of log entries the circular buffer can hold.
const LOG_BUFFER_CAPACITY: usize = 256;

/// Maximum length (in bytes) of a log message stored in a [`LogEntry`].
const LOG_MESSAGE_MAX_LEN: usize = 128;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A single structured log entry.
///
/// The message is stored inline in a fixed-size array so the entry can live
/// in a static circular buffer without heap allocation.
#[derive(Clone)]
pub struct LogEntry {
    /// Tick count (see [`crate::timer::now`]) when the entry was logged.
    pub timestamp: u64,
    /// Severity of the message.
    pub level: Level,
    /// The log message text, truncated to [`LOG_MESSAGE_MAX_LEN`] bytes.
    message_buf: [u8; LOG_MESSAGE_MAX_LEN],
    message_len: u8,
}

impl LogEntry {
    /// Create a zeroed, empty entry (used to initialize the buffer).
    const fn empty() -> Self {
        Self {
            timestamp: 0,
            level: Level::Trace,
            message_buf: [0u8; LOG_MESSAGE_MAX_LEN],
            message_len: 0,
        }
    }

    /// Return the message text as a `&str`.
    pub fn message(&self) -> &str {
        let len = self.message_len as usize;
        core::str::from_utf8(&self.message_buf[..len]).unwrap_or("")
    }
}

// ---------------------------------------------------------------------------
// Circular buffer
// ---------------------------------------------------------------------------

/// Fixed-size circular buffer of [`LogEntry`] items.
///
/// Uses a head index with a count to distinguish empty from full.
struct LogBuffer {
    entries: [LogEntry; LOG_BUFFER_CAPACITY],
    /// Index of the next slot to write.
    head: usize,
    /// Total number of valid entries (capped at `LOG_BUFFER_CAPACITY`).
    count: usize,
}

impl LogBuffer {
    const fn new() -> Self {
        const EMPTY: LogEntry = LogEntry::empty();
        Self {
            entries: [EMPTY; LOG_BUFFER_CAPACITY],
            head: 0,
            count: 0,
        }
    }

    /// Append a log entry, overwriting the oldest if full.
    fn push(&mut self, entry: LogEntry) {
        self.entries[self.head] = entry;
        self.head = (self.head + 1) % LOG_BUFFER_CAPACITY;
        if self.count < LOG_BUFFER_CAPACITY {
            self.count += 1;
        }
    }

    fn len(&self) -> usize {
        self.count
    }

    fn clear(&mut self) {
        self.head = 0;
        self.count = 0;
    }

    /// Return the tail index (oldest entry).
    fn tail(&self) -> usize {
        if self.count < LOG_BUFFER_CAPACITY {
            0
        } else {
            self.head // when full, head == tail (oldest)
        }
    }

    /// Get the entry at logical index `i` (0 = oldest).
    fn get(&self, i: usize) -> Option<&LogEntry> {
        if i >= self.count {
            return None;
        }
        let physical = (self.tail() + i) % LOG_BUFFER_CAPACITY;
        Some(&self.entries[physical])
    }
}

// ---------------------------------------------------------------------------
// Global state
// ---------------------------------------------------------------------------

static LOG_BUFFER: Mutex<LogBuffer> = Mutex::new(LogBuffer::new());

/// [`log::Log`] backend that records into [`LOG_BUFFER`].
struct KernelLogger;

impl log::Log for KernelLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        struct Cursor<'a> {
            buf: &'a mut [u8],
            len: usize,
        }
        impl core::fmt::Write for Cursor<'_> {
            fn write_str(&mut self, s: &str) -> core::fmt::Result {
                let remaining = self.buf.len() - self.len;
                let take = s.len().min(remaining);
                self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
                self.len += take;
                Ok(())
            }
        }

        let mut message_buf = [0u8; LOG_MESSAGE_MAX_LEN];
        let mut cursor = Cursor {
            buf: &mut message_buf,
            len: 0,
        };
        let _ = core::fmt::write(&mut cursor, *record.args());
        let message_len = cursor.len as u8;

        #[cfg(test)]
        std::eprintln!("[{}] {}", record.level(), record.args());

        LOG_BUFFER.lock().push(LogEntry {
            timestamp: crate::timer::now() as u64,
            level: record.level(),
            message_buf,
            message_len,
        });
    }

    fn flush(&self) {}
}

static LOGGER: KernelLogger = KernelLogger;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Install the kernel logger as the global [`log`] backend.
///
/// Must be called once during `kernel_init`, before any `log::info!` et al.
/// A second call is a no-op (matches [`log::set_logger`]'s own contract).
pub fn init() {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(log::LevelFilter::Trace);
}

/// Iterate over all buffered log entries from oldest to newest, calling `f`
/// for each. Returns the number of entries visited.
pub fn drain<F: FnMut(&LogEntry)>(mut f: F) -> usize {
    let buffer = LOG_BUFFER.lock();
    let n = buffer.len();
    for i in 0..n {
        if let Some(entry) = buffer.get(i) {
            f(entry);
        }
    }
    n
}

/// Number of entries currently in the log buffer.
pub fn count() -> usize {
    LOG_BUFFER.lock().len()
}

/// Clear all log entries.
pub fn clear() {
    LOG_BUFFER.lock().clear();
}
