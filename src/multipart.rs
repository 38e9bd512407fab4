//! Incremental `multipart/form-data` scanner for single-file uploads.
//!
//! The request body arrives as a sequence of receive buffers of arbitrary
//! size. Every marker the scanner looks for (the `filename="` token, the
//! CR LF CR LF end of the part headers, the boundary line) can land astride
//! two or more of them, so [`PartScanner`] never assumes a marker is confined
//! to one buffer: it scans a window made of the unmatched tail of previous
//! input plus the current buffer, emits confirmed body bytes immediately, and
//! retains only a bounded tail. Retained state never exceeds a few bytes more
//! than the boundary length, independent of file size.

use std::fmt;

/// Part-header tokens. A part looks like:
/// `--boundary CRLF Content-Disposition: form-data; name="file"; filename="x" CRLF ... CRLF CRLF body CRLF --boundary--`
const FILENAME_TOKEN: &[u8] = b"filename=\"";
const HEADER_END: &[u8] = b"\r\n\r\n";

/// Upper bound on the part-header bytes retained while looking for the
/// closing quote of a filename.
const MAX_FILENAME_SCAN: usize = 1024;

/// Extracts the `boundary=` parameter from a `Content-Type` header value.
pub fn boundary_from_content_type(value: &str) -> Option<String> {
    let start = value.find("boundary=")? + "boundary=".len();
    let raw = value[start..].split(';').next().unwrap_or("").trim();
    let raw = raw.trim_matches('"');
    (!raw.is_empty()).then(|| raw.to_string())
}

/// What the scanner learned from a buffer, in order.
#[derive(Debug, PartialEq, Eq)]
pub enum PartEvent {
    /// A part carrying `filename="..."` was found; open the destination.
    FileOpen(String),
    /// Body bytes confirmed not to overlap any marker.
    Data(Vec<u8>),
    /// The closing boundary was seen; the upload is complete.
    Done,
}

#[derive(Debug)]
pub enum MultipartError {
    /// No closing `"` within [`MAX_FILENAME_SCAN`] bytes of the token.
    FilenameTooLong,
}

impl fmt::Display for MultipartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MultipartError::FilenameTooLong => write!(f, "unterminated filename in part header"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SeekingFilename,
    SeekingBodyStart,
    StreamingBody,
    Done,
}

/// Streaming scanner reconstructing the first `filename=`-bearing part.
pub struct PartScanner {
    /// `"--" + declared_boundary`.
    boundary: Vec<u8>,
    state: State,
    /// Unconsumed tail of previous buffers, prepended to the next scan.
    window: Vec<u8>,
}

impl PartScanner {
    pub fn new(declared_boundary: &str) -> Self {
        let mut boundary = Vec::with_capacity(declared_boundary.len() + 2);
        boundary.extend_from_slice(b"--");
        boundary.extend_from_slice(declared_boundary.as_bytes());
        Self {
            boundary,
            state: State::SeekingFilename,
            window: Vec::new(),
        }
    }

    /// Scans one receive buffer, appending events in the order they occur.
    /// State transitions happen mid-buffer, so one buffer may produce a
    /// `FileOpen`, `Data` and `Done` all at once.
    pub fn feed(
        &mut self,
        buf: &[u8],
        events: &mut Vec<PartEvent>,
    ) -> Result<(), MultipartError> {
        if self.state == State::Done {
            return Ok(());
        }
        self.window.extend_from_slice(buf);

        loop {
            match self.state {
                State::SeekingFilename => {
                    let Some(start) = find(&self.window, FILENAME_TOKEN) else {
                        self.retain_tail(FILENAME_TOKEN.len() - 1);
                        return Ok(());
                    };
                    let name_start = start + FILENAME_TOKEN.len();
                    let Some(quote) = find(&self.window[name_start..], b"\"") else {
                        // Keep from the token onward until the quote shows up.
                        self.window.drain(..start);
                        if self.window.len() > MAX_FILENAME_SCAN {
                            return Err(MultipartError::FilenameTooLong);
                        }
                        return Ok(());
                    };
                    let name =
                        String::from_utf8_lossy(&self.window[name_start..name_start + quote])
                            .into_owned();
                    self.window.drain(..name_start + quote + 1);
                    events.push(PartEvent::FileOpen(name));
                    self.state = State::SeekingBodyStart;
                }
                State::SeekingBodyStart => {
                    let Some(end) = find(&self.window, HEADER_END) else {
                        self.retain_tail(HEADER_END.len() - 1);
                        return Ok(());
                    };
                    self.window.drain(..end + HEADER_END.len());
                    self.state = State::StreamingBody;
                }
                State::StreamingBody => {
                    if let Some(at) = find(&self.window, &self.boundary) {
                        // The CR LF introducing the boundary line belongs to
                        // the framing, not the file.
                        let cut = at.saturating_sub(2);
                        if cut > 0 {
                            events.push(PartEvent::Data(self.window[..cut].to_vec()));
                        }
                        self.window.clear();
                        self.state = State::Done;
                        events.push(PartEvent::Done);
                    } else {
                        // Hold back enough bytes that a boundary starting in
                        // this buffer and finishing in the next, preceding
                        // CR LF included, can still be excised.
                        let hold = self.boundary.len() + 1;
                        if self.window.len() > hold {
                            let flush = self.window.len() - hold;
                            events.push(PartEvent::Data(self.window[..flush].to_vec()));
                            self.window.drain(..flush);
                        }
                    }
                    return Ok(());
                }
                State::Done => return Ok(()),
            }
        }
    }

    /// Flushes state at end of input. Once no more bytes can arrive, a
    /// partial marker match can never complete, so a retained body tail is
    /// plain data from a request that omitted the closing boundary.
    pub fn finish(&mut self, events: &mut Vec<PartEvent>) {
        if self.state == State::StreamingBody && !self.window.is_empty() {
            events.push(PartEvent::Data(std::mem::take(&mut self.window)));
        } else {
            self.window.clear();
        }
        self.state = State::Done;
    }

    fn retain_tail(&mut self, keep: usize) {
        if self.window.len() > keep {
            let drop = self.window.len() - keep;
            self.window.drain(..drop);
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDARY: &str = "X-FORM-BOUNDARY";

    fn body_for(name: &str, content: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\n")
                .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    /// Runs a body through the scanner in pieces and returns the
    /// reassembled upload.
    fn scan(chunks: &[&[u8]]) -> (Option<String>, Vec<u8>, bool) {
        let mut scanner = PartScanner::new(BOUNDARY);
        let mut events = Vec::new();
        for chunk in chunks {
            scanner.feed(chunk, &mut events).expect("feed");
        }
        scanner.finish(&mut events);

        let mut name = None;
        let mut data = Vec::new();
        let mut done = false;
        for event in events {
            match event {
                PartEvent::FileOpen(n) => name = Some(n),
                PartEvent::Data(bytes) => {
                    assert!(!done, "data after completion");
                    data.extend_from_slice(&bytes);
                }
                PartEvent::Done => done = true,
            }
        }
        (name, data, done)
    }

    #[test]
    fn single_buffer_upload() {
        let body = body_for("x.txt", b"hello");
        let (name, data, done) = scan(&[&body]);
        assert_eq!(name.as_deref(), Some("x.txt"));
        assert_eq!(data, b"hello");
        assert!(done);
    }

    #[test]
    fn empty_file() {
        let body = body_for("empty.bin", b"");
        let (name, data, done) = scan(&[&body]);
        assert_eq!(name.as_deref(), Some("empty.bin"));
        assert_eq!(data, b"");
        assert!(done);
    }

    #[test]
    fn marker_split_at_every_offset() {
        let content = b"The quick brown fox jumps over the lazy dog";
        let body = body_for("split.txt", content);
        for cut in 1..body.len() {
            let (name, data, done) = scan(&[&body[..cut], &body[cut..]]);
            assert_eq!(name.as_deref(), Some("split.txt"), "cut at {cut}");
            assert_eq!(data, content, "cut at {cut}");
            assert!(done, "cut at {cut}");
        }
    }

    #[test]
    fn boundary_split_across_three_buffers() {
        let content = b"payload";
        let body = body_for("three.bin", content);
        // Slice the terminal boundary region into single bytes.
        let tail_start = body.len() - (BOUNDARY.len() + 8);
        let mut chunks: Vec<&[u8]> = vec![&body[..tail_start]];
        for i in tail_start..body.len() {
            chunks.push(&body[i..i + 1]);
        }
        let (name, data, done) = scan(&chunks);
        assert_eq!(name.as_deref(), Some("three.bin"));
        assert_eq!(data, content);
        assert!(done);
    }

    #[test]
    fn body_containing_near_boundary_bytes() {
        // Prefixes of the boundary inside the payload must not be eaten.
        let content = b"data\r\n--X-FORM-BOUNDAR\rdata--X-FORM-BOUNDARdata";
        let body = body_for("tricky.bin", content);
        for cut in 1..body.len() {
            let (_, data, done) = scan(&[&body[..cut], &body[cut..]]);
            assert_eq!(data, content, "cut at {cut}");
            assert!(done);
        }
    }

    #[test]
    fn large_body_in_fixed_buffers() {
        let content: Vec<u8> = (0..40_000u32).map(|i| (i % 251) as u8).collect();
        let body = body_for("big.bin", &content);
        let chunks: Vec<&[u8]> = body.chunks(1500).collect();
        let (name, data, done) = scan(&chunks);
        assert_eq!(name.as_deref(), Some("big.bin"));
        assert_eq!(data, content);
        assert!(done);
    }

    #[test]
    fn retained_window_stays_bounded() {
        let content: Vec<u8> = vec![b'a'; 100_000];
        let body = body_for("bounded.bin", &content);
        let mut scanner = PartScanner::new(BOUNDARY);
        let mut events = Vec::new();
        for chunk in body.chunks(1500) {
            scanner.feed(chunk, &mut events).expect("feed");
            assert!(scanner.window.len() <= scanner.boundary.len() + 1 + 1500);
        }
    }

    #[test]
    fn trailing_bytes_after_boundary_are_ignored() {
        let mut body = body_for("x.txt", b"hello");
        body.extend_from_slice(b"junk after the closing boundary");
        let (_, data, done) = scan(&[&body]);
        assert_eq!(data, b"hello");
        assert!(done);
    }

    #[test]
    fn missing_filename_yields_no_events() {
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nvalue\r\n--{BOUNDARY}--\r\n"
        );
        let (name, data, done) = scan(&[body.as_bytes()]);
        assert_eq!(name, None);
        assert_eq!(data, b"");
        assert!(!done);
    }

    #[test]
    fn truncated_body_flushes_remainder() {
        let content = b"partial upload that never sees a closing boundary";
        let mut body = body_for("trunc.bin", content);
        body.truncate(body.len() - (BOUNDARY.len() + 8));
        let (name, data, done) = scan(&[&body]);
        assert_eq!(name.as_deref(), Some("trunc.bin"));
        assert!(!done);
        assert_eq!(data, content);
    }

    #[test]
    fn unterminated_filename_is_an_error() {
        let mut scanner = PartScanner::new(BOUNDARY);
        let mut events = Vec::new();
        let mut junk = b"Content-Disposition: form-data; filename=\"".to_vec();
        junk.extend_from_slice(&vec![b'a'; MAX_FILENAME_SCAN + 64]);
        let result = scanner.feed(&junk, &mut events);
        assert!(matches!(result, Err(MultipartError::FilenameTooLong)));
    }

    #[test]
    fn boundary_parameter_extraction() {
        assert_eq!(
            boundary_from_content_type("multipart/form-data; boundary=abc123"),
            Some("abc123".to_string())
        );
        assert_eq!(
            boundary_from_content_type("multipart/form-data; boundary=\"quoted\"; charset=utf-8"),
            Some("quoted".to_string())
        );
        assert_eq!(boundary_from_content_type("multipart/form-data"), None);
        assert_eq!(boundary_from_content_type("text/plain"), None);
    }
}
