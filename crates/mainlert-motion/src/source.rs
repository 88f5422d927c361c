use crate::types::RawSample;
use std::collections::VecDeque;
use thiserror::Error;

/// Longest accepted sample line, in bytes.
pub const MAX_LINE_LEN: usize = 1024;

#[derive(Debug, Error, PartialEq)]
pub enum SourceError {
    #[error("Line {line}: expected 4 fields (timestamp_ms, x, y, z), found {found}")]
    FieldCount { line: usize, found: usize },
    #[error("Line {line}: invalid timestamp {value:?}")]
    BadTimestamp { line: usize, value: String },
    #[error("Line {line}: invalid {axis} value {value:?}")]
    BadAxis {
        line: usize,
        axis: char,
        value: String,
    },
    #[error("Line {line}: not valid UTF-8")]
    NotUtf8 { line: usize },
    #[error("Line {line}: longer than {max} bytes")]
    LineTooLong { line: usize, max: usize },
}

/// Streaming parser for recorded accelerometer logs.
///
/// One sample per line: `timestamp_ms,x,y,z` (commas or whitespace).
/// Blank lines and `#` comments are skipped. Feed raw bytes via `push_data`,
/// then drain samples via `next_sample`. A malformed line yields an error
/// and parsing carries on with the next one.
pub struct SampleParser {
    buffer: VecDeque<u8>,
    /// Bytes at the front of `buffer` already searched for a newline.
    scanned: usize,
    /// Dropping the rest of an over-long line.
    discarding: bool,
    line: usize,
    finished: bool,
}

enum Line {
    Complete(Vec<u8>),
    TooLong,
}

impl SampleParser {
    pub fn new() -> Self {
        Self {
            buffer: VecDeque::with_capacity(8192),
            scanned: 0,
            discarding: false,
            line: 0,
            finished: false,
        }
    }

    /// Append received bytes to the internal buffer.
    pub fn push_data(&mut self, data: &[u8]) {
        self.buffer.extend(data);
    }

    /// Mark the end of input so a final line without a newline is parsed.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    /// Number of lines consumed so far, including skipped ones.
    pub fn lines_read(&self) -> usize {
        self.line
    }

    /// Try to extract the next sample from the buffer.
    /// Returns `None` if no complete line is available yet.
    pub fn next_sample(&mut self) -> Option<Result<RawSample, SourceError>> {
        loop {
            let line = self.take_line()?;
            self.line += 1;

            let raw = match line {
                Line::Complete(raw) => raw,
                Line::TooLong => {
                    return Some(Err(SourceError::LineTooLong {
                        line: self.line,
                        max: MAX_LINE_LEN,
                    }))
                }
            };

            let text = match std::str::from_utf8(&raw) {
                Ok(text) => text.trim(),
                Err(_) => return Some(Err(SourceError::NotUtf8 { line: self.line })),
            };
            if text.is_empty() || text.starts_with('#') {
                continue;
            }

            return Some(parse_line(text, self.line));
        }
    }

    fn take_line(&mut self) -> Option<Line> {
        loop {
            let newline = self
                .buffer
                .range(self.scanned..)
                .position(|&b| b == b'\n')
                .map(|pos| self.scanned + pos);

            let Some(pos) = newline else {
                return self.partial_line();
            };

            self.scanned = 0;
            let line: Vec<u8> = self.buffer.drain(..pos).collect();
            self.buffer.pop_front();

            if self.discarding {
                // Tail of a line already reported as too long.
                self.discarding = false;
                continue;
            }
            if line.len() > MAX_LINE_LEN {
                return Some(Line::TooLong);
            }
            return Some(Line::Complete(line));
        }
    }

    /// Handle a buffer with no newline in it.
    fn partial_line(&mut self) -> Option<Line> {
        if self.discarding {
            self.buffer.clear();
            self.scanned = 0;
            if self.finished {
                self.discarding = false;
            }
            return None;
        }

        if self.buffer.len() > MAX_LINE_LEN {
            self.buffer.clear();
            self.scanned = 0;
            self.discarding = !self.finished;
            return Some(Line::TooLong);
        }

        if self.finished && !self.buffer.is_empty() {
            self.scanned = 0;
            return Some(Line::Complete(self.buffer.drain(..).collect()));
        }

        self.scanned = self.buffer.len();
        None
    }
}

impl Default for SampleParser {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_line(text: &str, line: usize) -> Result<RawSample, SourceError> {
    let fields: Vec<&str> = text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|f| !f.is_empty())
        .collect();

    if fields.len() != 4 {
        return Err(SourceError::FieldCount {
            line,
            found: fields.len(),
        });
    }

    let timestamp_ms = fields[0]
        .parse::<u64>()
        .map_err(|_| SourceError::BadTimestamp {
            line,
            value: fields[0].to_string(),
        })?;

    let axis = |index: usize, name: char| -> Result<f32, SourceError> {
        fields[index].parse::<f32>().map_err(|_| SourceError::BadAxis {
            line,
            axis: name,
            value: fields[index].to_string(),
        })
    };

    Ok(RawSample::new(
        timestamp_ms,
        axis(1, 'x')?,
        axis(2, 'y')?,
        axis(3, 'z')?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_single_line() {
        let mut parser = SampleParser::new();
        parser.push_data(b"1500,0.5,-1.25,9.81\n");

        let sample = parser.next_sample().unwrap().unwrap();
        assert_eq!(sample.timestamp_ms, 1500);
        assert!((sample.accel.x - 0.5).abs() < 1e-6);
        assert!((sample.accel.y + 1.25).abs() < 1e-6);
        assert!((sample.accel.z - 9.81).abs() < 1e-6);

        assert!(parser.next_sample().is_none());
    }

    #[test]
    fn parse_fragmented_data() {
        let data = b"100 1.0 2.0 3.0\n";
        let mid = data.len() / 2;

        let mut parser = SampleParser::new();
        parser.push_data(&data[..mid]);
        assert!(parser.next_sample().is_none());

        parser.push_data(&data[mid..]);
        let sample = parser.next_sample().unwrap().unwrap();
        assert_eq!(sample.timestamp_ms, 100);
        assert!((sample.accel.z - 3.0).abs() < 1e-6);
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let mut parser = SampleParser::new();
        parser.push_data(b"# timestamp_ms,x,y,z\n\n  \r\n10,0,0,1\r\n20,0,0,2\n");

        let first = parser.next_sample().unwrap().unwrap();
        let second = parser.next_sample().unwrap().unwrap();
        assert_eq!(first.timestamp_ms, 10);
        assert_eq!(second.timestamp_ms, 20);
        assert!(parser.next_sample().is_none());
        assert_eq!(parser.lines_read(), 5);
    }

    #[test]
    fn bad_lines_do_not_stop_the_stream() {
        let mut parser = SampleParser::new();
        parser.push_data(b"10,0,0\nabc,0,0,0\n30,0,oops,0\n40,1,1,1\n");

        assert_eq!(
            parser.next_sample().unwrap(),
            Err(SourceError::FieldCount { line: 1, found: 3 })
        );
        assert!(matches!(
            parser.next_sample().unwrap(),
            Err(SourceError::BadTimestamp { line: 2, .. })
        ));
        assert!(matches!(
            parser.next_sample().unwrap(),
            Err(SourceError::BadAxis { line: 3, axis: 'y', .. })
        ));
        assert_eq!(parser.next_sample().unwrap().unwrap().timestamp_ms, 40);
    }

    #[test]
    fn trailing_line_needs_finish() {
        let mut parser = SampleParser::new();
        parser.push_data(b"10,0,0,1\n20,0,0,2");

        assert_eq!(parser.next_sample().unwrap().unwrap().timestamp_ms, 10);
        assert!(parser.next_sample().is_none());

        parser.finish();
        assert_eq!(parser.next_sample().unwrap().unwrap().timestamp_ms, 20);
        assert!(parser.next_sample().is_none());
    }

    #[test]
    fn over_long_line_is_reported_once() {
        let mut parser = SampleParser::new();
        parser.push_data(&[b'1'; MAX_LINE_LEN + 1]);

        assert_eq!(
            parser.next_sample().unwrap(),
            Err(SourceError::LineTooLong {
                line: 1,
                max: MAX_LINE_LEN
            })
        );
        assert!(parser.next_sample().is_none());

        // The rest of that line is dropped without holding on to it.
        parser.push_data(&[b'2'; 4 * MAX_LINE_LEN]);
        assert!(parser.next_sample().is_none());
        assert!(parser.buffer.is_empty());

        parser.push_data(b"9\n10,0,0,1\n");
        assert_eq!(parser.next_sample().unwrap().unwrap().timestamp_ms, 10);
        assert_eq!(parser.lines_read(), 2);
    }

    #[test]
    fn long_line_with_newline_is_reported() {
        let mut data = vec![b' '; MAX_LINE_LEN + 10];
        data.extend_from_slice(b"\n20,0,0,1\n");

        let mut parser = SampleParser::new();
        parser.push_data(&data);
        assert!(matches!(
            parser.next_sample().unwrap(),
            Err(SourceError::LineTooLong { line: 1, .. })
        ));
        assert_eq!(parser.next_sample().unwrap().unwrap().timestamp_ms, 20);
    }

    #[test]
    fn byte_at_a_time_input_resumes_scan() {
        let mut parser = SampleParser::new();
        for &b in b"30,1,2,3" {
            parser.push_data(&[b]);
            assert!(parser.next_sample().is_none());
        }
        assert_eq!(parser.scanned, 8);

        parser.push_data(b"\n");
        let sample = parser.next_sample().unwrap().unwrap();
        assert_eq!(sample.timestamp_ms, 30);
        assert_eq!(parser.scanned, 0);
    }

    #[test]
    fn invalid_utf8_is_reported() {
        let mut parser = SampleParser::new();
        parser.push_data(&[0xff, 0xfe, b'\n']);
        assert_eq!(
            parser.next_sample().unwrap(),
            Err(SourceError::NotUtf8 { line: 1 })
        );
    }
}
