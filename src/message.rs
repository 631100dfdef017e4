//! HTTP/1.x-line-style request/response codec over a [`StreamLayer`]. Grounded in the teacher's
//! `parser::RawRequest` slice-scanning approach (`parser/raw_request.rs`) — a maximal-run scanner
//! over a byte slice rather than a generated grammar — adapted from a single synchronous parse
//! pass over a filled buffer to an incremental accumulator that tops itself up from the stream
//! layer as needed.

use std::future::Future;

use crate::error::{Error, Result};
use crate::info::InfoMap;
use crate::stream::{StreamLayer, CHUNK_SIZE};

/// Default cap on a single request/status line or header line before [`Error::MessageSize`].
pub const DEFAULT_MAX_READ: usize = 8 * 1024;

/// A request line: method, request-target, and protocol version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestLine {
    /// Request method (`GET`, `POST`, ...).
    pub method: String,
    /// Request-target.
    pub uri: String,
    /// Protocol version (`HTTP/1.1`, ...).
    pub version: String,
}

/// A status line: protocol version, status code, and reason phrase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseLine {
    /// Protocol version.
    pub version: String,
    /// Status code, as text.
    pub code: String,
    /// Reason phrase (may contain spaces).
    pub explanation: String,
}

/// A single header. `name == ":"` is the sentinel marking end-of-headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    /// Header name.
    pub name: String,
    /// Header value. Continuation lines are joined with `\n`.
    pub value: String,
}

impl Header {
    /// Builds an ordinary header.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// The end-of-headers sentinel.
    pub fn sentinel() -> Self {
        Self {
            name: ":".to_string(),
            value: String::new(),
        }
    }

    /// Whether this is the end-of-headers sentinel.
    pub fn is_sentinel(&self) -> bool {
        self.name == ":"
    }
}

/// The message layer's exchange-state machine, used by broker-wrapped handles to guard
/// out-of-sequence body I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// No headers have been read or written yet.
    Unknown,
    /// Request headers staged/parsed; body I/O not yet begun.
    RequestHeaders,
    /// Request body I/O in progress.
    RequestBody,
    /// Response headers staged/parsed; body I/O not yet begun.
    ResponseHeaders,
    /// Response body I/O in progress.
    ResponseBody,
}

fn is_space_or_control(b: u8) -> bool {
    b <= 0x20 || b == 0x7f
}

fn is_token_char(b: u8) -> bool {
    !is_space_or_control(b)
}

fn is_name_char(b: u8) -> bool {
    !is_space_or_control(b) && b != b':'
}

fn skip_space(buf: &[u8]) -> &[u8] {
    let idx = buf.iter().position(|&b| !is_space_or_control(b)).unwrap_or(buf.len());
    &buf[idx..]
}

fn take_while(buf: &[u8], pred: impl Fn(u8) -> bool) -> (&[u8], &[u8]) {
    let idx = buf.iter().position(|&b| !pred(b)).unwrap_or(buf.len());
    (&buf[..idx], &buf[idx..])
}

/// Skips leading space-class bytes, then takes a maximal token-class run.
fn take_token(buf: &[u8]) -> (&[u8], &[u8]) {
    take_while(skip_space(buf), is_token_char)
}

/// Takes a maximal name-class run (no leading-space skip: the name starts at the line's head).
fn take_name(buf: &[u8]) -> (&[u8], &[u8]) {
    take_while(buf, is_name_char)
}

/// Finds the next unfolded line terminator. Returns `(content_end, bytes_consumed)`: a CR or LF
/// immediately followed by a space/tab is a continuation fold, not a terminator, and scanning
/// continues past it.
fn find_line(buf: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i < buf.len() {
        if buf[i] == b'\r' || buf[i] == b'\n' {
            let term_len = if buf[i] == b'\r' && buf.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
            let next = i + term_len;
            if matches!(buf.get(next), Some(b' ') | Some(b'\t')) {
                i = next;
                continue;
            }
            return Some((i, next));
        }
        i += 1;
    }
    None
}

fn extract_line(buf: &mut Vec<u8>) -> Option<Vec<u8>> {
    let (end, consumed) = find_line(buf)?;
    let line = buf[..end].to_vec();
    buf.drain(..consumed);
    Some(line)
}

/// Splits a line's content on embedded (folded) CR/LF runs, i.e. the runs [`find_line`] skipped
/// over because they were followed by continuation whitespace.
fn split_folds(buf: &[u8]) -> Vec<&[u8]> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < buf.len() {
        if buf[i] == b'\r' || buf[i] == b'\n' {
            parts.push(&buf[start..i]);
            while i < buf.len() && (buf[i] == b'\r' || buf[i] == b'\n') {
                i += 1;
            }
            start = i;
        } else {
            i += 1;
        }
    }
    parts.push(&buf[start..]);
    parts
}

fn write_first_token(out: &mut Vec<u8>, field: &str) {
    let (token, _) = take_token(field.as_bytes());
    out.extend_from_slice(token);
}

/// Wraps a [`StreamLayer`] with the request/response-line and header codec plus body windowing.
pub struct MessageLayer {
    stream: StreamLayer,
    read_accum: Vec<u8>,
    write_accum: Vec<u8>,
    max_read: usize,
    min_write: usize,
    status: Status,
}

impl MessageLayer {
    /// Wraps `stream` with the default line-size bound ([`DEFAULT_MAX_READ`]).
    pub fn new(stream: StreamLayer) -> Self {
        Self::with_max_read(stream, DEFAULT_MAX_READ)
    }

    /// Wraps `stream`, capping a single request/status line or header at `max_read` bytes.
    pub fn with_max_read(stream: StreamLayer, max_read: usize) -> Self {
        Self {
            stream,
            read_accum: Vec::new(),
            write_accum: Vec::new(),
            max_read,
            min_write: 0,
            status: Status::Unknown,
        }
    }

    /// Transport metadata of the underlying connection, if any.
    pub fn info(&self) -> Option<&InfoMap> {
        self.stream.connection().map(|c| c.info())
    }

    /// SNI of the underlying connection (empty if raw or the connection is gone).
    pub fn get_sni(&self) -> String {
        self.stream
            .connection()
            .map(|c| c.get_sni().to_string())
            .unwrap_or_default()
    }

    /// Whether the underlying connection is still open.
    pub fn is_open(&self) -> bool {
        self.stream.connection().map(|c| c.is_open()).unwrap_or(false)
    }

    /// Pending readable bytes on the underlying connection.
    pub async fn available(&self) -> Result<usize> {
        match self.stream.connection() {
            Some(c) => c.available().await,
            None => Err(Error::NotConnected),
        }
    }

    /// Cancels outstanding operations on the underlying connection.
    pub fn cancel(&self) {
        if let Some(c) = self.stream.connection() {
            c.cancel();
        }
    }

    /// Closes the underlying connection.
    pub async fn close(&mut self) {
        if let Some(c) = self.stream.connection_mut() {
            c.close().await;
        }
    }

    /// Delegates to the underlying connection's strand.
    pub fn post<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.stream.post(task);
    }

    /// Current exchange state.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Consumes the wrapper and returns the underlying stream layer.
    pub fn into_stream(self) -> StreamLayer {
        self.stream
    }

    async fn flush_all(&mut self) -> Result<()> {
        while !self.write_accum.is_empty() {
            self.stream.async_write_string(&mut self.write_accum).await?;
        }
        self.min_write = 0;
        Ok(())
    }

    async fn maybe_flush(&mut self) -> Result<()> {
        if self.write_accum.len() > self.min_write {
            self.flush_all().await
        } else {
            Ok(())
        }
    }

    async fn next_line(&mut self) -> Result<Vec<u8>> {
        loop {
            if let Some(line) = extract_line(&mut self.read_accum) {
                return Ok(line);
            }
            if self.read_accum.len() > self.max_read {
                return Err(Error::MessageSize);
            }
            self.stream
                .async_read_string(&mut self.read_accum, self.max_read + CHUNK_SIZE)
                .await?;
        }
    }

    /// Stages a request line for writing; see module docs for the staging/flush contract.
    pub async fn async_write_request(&mut self, mut request: RequestLine) -> Result<()> {
        if !request.method.is_empty() {
            write_first_token(&mut self.write_accum, &request.method);
            self.write_accum.push(b' ');
            write_first_token(&mut self.write_accum, &request.uri);
            self.write_accum.push(b' ');
            write_first_token(&mut self.write_accum, &request.version);
            self.write_accum.extend_from_slice(b"\r\n");
            request.method.clear();
            request.uri.clear();
            request.version.clear();
            self.min_write = 256;
        }
        self.maybe_flush().await
    }

    /// Reads a request line, skipping blank-line prefaces.
    pub async fn async_read_request(&mut self) -> Result<RequestLine> {
        loop {
            let line = self.next_line().await?;
            let (method, rest) = take_token(&line);
            if method.is_empty() {
                continue;
            }
            let (uri, rest) = take_token(rest);
            let (version, _) = take_token(rest);
            return Ok(RequestLine {
                method: String::from_utf8_lossy(method).into_owned(),
                uri: String::from_utf8_lossy(uri).into_owned(),
                version: String::from_utf8_lossy(version).into_owned(),
            });
        }
    }

    /// Stages a status line for writing.
    pub async fn async_write_response(&mut self, mut response: ResponseLine) -> Result<()> {
        if !response.version.is_empty() {
            write_first_token(&mut self.write_accum, &response.version);
            self.write_accum.push(b' ');
            write_first_token(&mut self.write_accum, &response.code);
            self.write_accum.push(b' ');
            self.write_accum
                .extend_from_slice(response.explanation.trim_start().as_bytes());
            self.write_accum.extend_from_slice(b"\r\n");
            response.version.clear();
            response.code.clear();
            response.explanation.clear();
            self.min_write = 256;
        }
        self.maybe_flush().await
    }

    /// Reads a status line, skipping blank-line prefaces.
    pub async fn async_read_response(&mut self) -> Result<ResponseLine> {
        loop {
            let line = self.next_line().await?;
            let (version, rest) = take_token(&line);
            if version.is_empty() {
                continue;
            }
            let (code, rest) = take_token(rest);
            let explanation = skip_space(rest);
            return Ok(ResponseLine {
                version: String::from_utf8_lossy(version).into_owned(),
                code: String::from_utf8_lossy(code).into_owned(),
                explanation: String::from_utf8_lossy(explanation).into_owned(),
            });
        }
    }

    /// Writes a single header (or, if `header.name` is empty, the blank-line terminator).
    pub async fn async_write_header(&mut self, header: &Header) -> Result<()> {
        let name: String = header.name.chars().filter(|c| is_name_char(*c as u8)).collect();
        if name.is_empty() {
            self.write_accum.extend_from_slice(b"\r\n");
            return self.flush_all().await;
        }
        self.write_accum.extend_from_slice(name.as_bytes());
        self.write_accum.extend_from_slice(b": ");
        for (i, part) in header.value.split('\n').enumerate() {
            if i > 0 {
                self.write_accum.extend_from_slice(b"\r\n ");
            }
            self.write_accum.extend_from_slice(part.as_bytes());
        }
        self.write_accum.extend_from_slice(b"\r\n");
        self.maybe_flush().await
    }

    /// Reads a single header, returning the sentinel at end-of-headers.
    pub async fn async_read_header(&mut self) -> Result<Header> {
        let line = self.next_line().await?;
        let (name, rest) = take_name(&line);
        if name.is_empty() {
            return Ok(Header::sentinel());
        }
        let mut rest = rest;
        if rest.first() == Some(&b':') {
            rest = &rest[1..];
        }
        rest = skip_space(rest);

        let parts = split_folds(rest);
        let mut value = Vec::new();
        for (i, part) in parts.iter().enumerate() {
            let part = if i == 0 { *part } else { skip_space(part) };
            if i > 0 {
                value.push(b'\n');
            }
            value.extend_from_slice(part);
        }
        Ok(Header {
            name: String::from_utf8_lossy(name).into_owned(),
            value: String::from_utf8_lossy(&value).into_owned(),
        })
    }

    /// Writes `headers` followed by the end-of-headers terminator (unless the list already ends
    /// with the sentinel).
    pub async fn async_write_headers(&mut self, headers: &[Header]) -> Result<()> {
        for h in headers {
            self.async_write_header(h).await?;
            if h.is_sentinel() {
                return Ok(());
            }
        }
        self.async_write_header(&Header::sentinel()).await
    }

    /// Reads headers until (and including) the end-of-headers sentinel.
    pub async fn async_read_headers(&mut self) -> Result<Vec<Header>> {
        let mut headers = Vec::new();
        loop {
            let header = self.async_read_header().await?;
            let sentinel = header.is_sentinel();
            headers.push(header);
            if sentinel {
                return Ok(headers);
            }
        }
    }

    /// Writes a request line then headers, transitioning to [`Status::RequestHeaders`].
    pub async fn async_write_request_headers(
        &mut self,
        request: RequestLine,
        headers: &[Header],
    ) -> Result<()> {
        self.async_write_request(request).await?;
        self.async_write_headers(headers).await?;
        self.status = Status::RequestHeaders;
        Ok(())
    }

    /// Reads a request line then headers, transitioning to [`Status::RequestHeaders`].
    pub async fn async_read_request_headers(&mut self) -> Result<(RequestLine, Vec<Header>)> {
        let request = self.async_read_request().await?;
        let headers = self.async_read_headers().await?;
        self.status = Status::RequestHeaders;
        Ok((request, headers))
    }

    /// Writes a status line then headers, transitioning to [`Status::ResponseHeaders`].
    pub async fn async_write_response_headers(
        &mut self,
        response: ResponseLine,
        headers: &[Header],
    ) -> Result<()> {
        self.async_write_response(response).await?;
        self.async_write_headers(headers).await?;
        self.status = Status::ResponseHeaders;
        Ok(())
    }

    /// Reads a status line then headers, transitioning to [`Status::ResponseHeaders`].
    pub async fn async_read_response_headers(&mut self) -> Result<(ResponseLine, Vec<Header>)> {
        let response = self.async_read_response().await?;
        let headers = self.async_read_headers().await?;
        self.status = Status::ResponseHeaders;
        Ok((response, headers))
    }

    /// Advances the exchange-state machine into the body phase that follows whichever headers
    /// phase is current. A bare `MessageLayer` may stage a request/response line with
    /// [`Self::async_write_request`]/[`Self::async_write_response`] without ever entering a
    /// headers state, so `Status::Unknown` is left as-is rather than rejected here — the broker
    /// wrapper is the one that guards body I/O against out-of-sequence calls (see
    /// [`crate::broker::BrokerHandle`]).
    fn enter_body(&mut self) {
        self.status = match self.status {
            Status::Unknown => Status::Unknown,
            Status::RequestHeaders | Status::RequestBody => Status::RequestBody,
            Status::ResponseHeaders | Status::ResponseBody => Status::ResponseBody,
        };
    }

    /// Writes up to `min(*bytes_left, data.len())` bytes from `data`, decrementing `bytes_left`
    /// and flushing fully before returning.
    pub async fn async_write_body(&mut self, data: &[u8], bytes_left: &mut usize) -> Result<()> {
        self.enter_body();
        let take = (*bytes_left).min(data.len());
        self.write_accum.extend_from_slice(&data[..take]);
        *bytes_left -= take;
        self.flush_all().await
    }

    /// Reads one chunk (or drains already-buffered bytes), transferring up to `*bytes_left` bytes
    /// into `data` and decrementing it. The caller loops until `*bytes_left == 0`.
    pub async fn async_read_body(&mut self, data: &mut Vec<u8>, bytes_left: &mut usize) -> Result<()> {
        self.enter_body();
        if *bytes_left == 0 {
            return Ok(());
        }
        if self.read_accum.is_empty() {
            self.stream
                .async_read_string(&mut self.read_accum, self.max_read + CHUNK_SIZE)
                .await?;
        }
        let take = (*bytes_left).min(self.read_accum.len());
        data.extend_from_slice(&self.read_accum[..take]);
        self.read_accum.drain(..take);
        *bytes_left -= take;
        Ok(())
    }
}
