use std::io::{self, Read, Write};

use tracing::{debug, instrument, warn};

use crate::command::Response;
use crate::dispatch::Dispatcher;
use crate::error::Result;

/// bytes read from the socket per call
const READ_CHUNK: usize = 4096;

/// the longest request line accepted unless configured otherwise
pub const DEFAULT_MAX_LINE_LEN: usize = 16 * 1024 * 1024;

/// Per connection state. Identity is supplied per command by username, so the session only
/// remembers who last logged in on this connection; nothing outlives the connection.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Session {
    user: Option<String>,
}

impl Session {
    /// remembers `username` until logout or the connection closes
    pub fn login(&mut self, username: &str) {
        self.user = Some(username.to_owned());
    }

    /// forgets the remembered user
    pub fn logout(&mut self) {
        self.user = None;
    }

    /// the user that last logged in on this connection, if any
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }
}

/// A growable receive buffer that hands out complete `\n` terminated lines in the order they
/// arrived, however the bytes were split across reads.
///
/// Every byte is searched for `\n` once. Consumed lines are only dropped from the front when
/// at least half of the buffer is consumed, so the cost stays linear in the bytes received.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
    /// start of the first line not handed out yet
    start: usize,
    /// `buf[start..scanned]` holds no `\n`
    scanned: usize,
}

impl LineBuffer {
    /// an empty buffer
    pub fn new() -> Self {
        LineBuffer::default()
    }

    /// appends bytes as they were read
    pub fn extend(&mut self, bytes: &[u8]) {
        if self.start > 0 && self.start * 2 >= self.buf.len() {
            self.buf.drain(..self.start);
            self.scanned -= self.start;
            self.start = 0;
        }
        self.buf.extend_from_slice(bytes);
    }

    /// removes and returns the next complete line, without its `\n` or a trailing `\r`.
    /// Invalid UTF-8 is replaced rather than rejected.
    pub fn next_line(&mut self) -> Option<String> {
        let found = self.buf[self.scanned..].iter().position(|b| *b == b'\n');
        let end = match found {
            Some(offset) => self.scanned + offset,
            None => {
                self.scanned = self.buf.len();
                return None;
            }
        };
        let mut line = &self.buf[self.start..end];
        if line.last() == Some(&b'\r') {
            line = &line[..line.len() - 1];
        }
        let line = String::from_utf8_lossy(line).into_owned();
        self.start = end + 1;
        self.scanned = self.start;
        Some(line)
    }

    /// bytes received that do not yet form a complete line
    pub fn pending_len(&self) -> usize {
        self.buf.len() - self.start
    }
}

/// Serves one client: reads request lines, dispatches each one in arrival order and writes
/// its response before the next line is handled.
pub struct Connection<S> {
    stream: S,
    dispatcher: Dispatcher,
    session: Session,
    buffer: LineBuffer,
    max_line_len: usize,
    peer: String,
}

impl<S: Read + Write> Connection<S> {
    /// a connection over `stream`; `peer` only names it in logs
    pub fn new(stream: S, dispatcher: Dispatcher, peer: impl Into<String>) -> Self {
        Connection {
            stream,
            dispatcher,
            session: Session::default(),
            buffer: LineBuffer::new(),
            max_line_len: DEFAULT_MAX_LINE_LEN,
            peer: peer.into(),
        }
    }

    /// overrides [`DEFAULT_MAX_LINE_LEN`]
    pub fn with_max_line_len(mut self, max_line_len: usize) -> Self {
        self.max_line_len = max_line_len;
        self
    }

    /// the session state of this connection
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// handles requests until the client closes the connection.
    ///
    /// A line longer than the configured maximum is answered with `ERROR line too long` and
    /// the connection is closed.
    ///
    /// # Errors
    /// I/O errors on the underlying stream
    #[instrument(skip(self), fields(peer = %self.peer))]
    pub fn run(mut self) -> Result<S> {
        debug!("connection opened");
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            while let Some(line) = self.buffer.next_line() {
                if line.len() > self.max_line_len {
                    return self.refuse_long_line();
                }
                if line.trim().is_empty() {
                    continue;
                }
                debug!("request: {:?}", line);
                let response = self.dispatcher.dispatch_line(&line, &mut self.session);
                self.send(&response)?;
            }
            if self.buffer.pending_len() > self.max_line_len {
                return self.refuse_long_line();
            }

            let n = match self.stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            self.buffer.extend(&chunk[..n]);
        }
        if self.buffer.pending_len() > 0 {
            debug!(
                "discarding {} bytes of an unterminated line",
                self.buffer.pending_len()
            );
        }
        debug!("connection closed, last user {:?}", self.session.user());
        Ok(self.stream)
    }

    fn send(&mut self, response: &Response) -> Result<()> {
        let wire = response.to_wire();
        self.stream.write_all(wire.as_bytes())?;
        self.stream.flush()?;
        debug!("response: {:?}", wire.lines().next().unwrap_or_default());
        Ok(())
    }

    fn refuse_long_line(mut self) -> Result<S> {
        warn!(
            "closing connection: line exceeds {} bytes",
            self.max_line_len
        );
        self.send(&Response::error("line too long"))?;
        Ok(self.stream)
    }
}
