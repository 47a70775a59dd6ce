//! pkt-line framing
//!
//! Every packet is prefixed with its total length as four hex digits;
//! `0000` is a flush packet and `0001` a delimiter.

use super::GitError;

/// Largest payload a single packet may carry
pub const MAX_DATA_LEN: usize = 65516;

/// Append a data packet
pub fn write(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(format!("{:04x}", data.len() + 4).as_bytes());
    out.extend_from_slice(data);
}

/// Append a text packet
pub fn write_str(out: &mut Vec<u8>, line: &str) {
    write(out, line.as_bytes());
}

/// Append a flush packet
pub fn flush(out: &mut Vec<u8>) {
    out.extend_from_slice(b"0000");
}

/// A decoded packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pkt<'a> {
    Flush,
    Delim,
    Data(&'a [u8]),
}

impl<'a> Pkt<'a> {
    /// Payload as text with the trailing newline removed
    pub fn text(&self) -> Option<&'a str> {
        match *self {
            Pkt::Data(data) => std::str::from_utf8(data)
                .ok()
                .map(|s| s.strip_suffix('\n').unwrap_or(s)),
            _ => None,
        }
    }
}

/// Iterator over the packets of a buffer
pub struct PktReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PktReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }
}

impl<'a> Iterator for PktReader<'a> {
    type Item = Result<Pkt<'a>, GitError>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.buf[self.pos..];
        if rest.is_empty() {
            return None;
        }
        if rest.len() < 4 {
            self.pos = self.buf.len();
            return Some(Err(GitError::Malformed("truncated pkt-line header".into())));
        }

        let len = std::str::from_utf8(&rest[..4])
            .ok()
            .and_then(|h| usize::from_str_radix(h, 16).ok());
        let Some(len) = len else {
            self.pos = self.buf.len();
            return Some(Err(GitError::Malformed("invalid pkt-line length".into())));
        };

        let pkt = match len {
            0 => {
                self.pos += 4;
                Pkt::Flush
            }
            1 => {
                self.pos += 4;
                Pkt::Delim
            }
            2..=4 => {
                self.pos = self.buf.len();
                return Some(Err(GitError::Malformed(format!(
                    "invalid pkt-line length {}",
                    len
                ))));
            }
            _ if len > rest.len() => {
                self.pos = self.buf.len();
                return Some(Err(GitError::Malformed("truncated pkt-line".into())));
            }
            _ => {
                self.pos += len;
                Pkt::Data(&rest[4..len])
            }
        };
        Some(Ok(pkt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_read() {
        let mut buf = Vec::new();
        write_str(&mut buf, "# service=git-upload-pack\n");
        flush(&mut buf);
        assert!(buf.starts_with(b"001e# service=git-upload-pack\n0000"));

        let pkts: Vec<_> = PktReader::new(&buf).collect::<Result<_, _>>().unwrap();
        assert_eq!(pkts.len(), 2);
        assert_eq!(pkts[0].text(), Some("# service=git-upload-pack"));
        assert_eq!(pkts[1], Pkt::Flush);
    }

    #[test]
    fn test_truncated_packet_is_an_error() {
        let items: Vec<_> = PktReader::new(b"0032want").collect();
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }
}
