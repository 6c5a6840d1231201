use crate::error::HarnessError;
use regex::bytes::Regex;

/// One segment of a logical response line.
///
/// Literal segments match their bytes exactly (metacharacters escaped);
/// the remaining variants are the wildcard spans callers use for fields
/// the server assigns (tags, received addresses, retransmission counters).
#[derive(Debug, Clone)]
pub enum Seg {
    Lit(String),
    /// Non-greedy span of arbitrary bytes
    Any,
    /// One or more decimal digits
    Digits,
    /// Server-assigned token, e.g. a `To` tag
    Token,
    /// Dotted numeric host address
    HostAddr,
    /// Bounded alternation of literal strings
    OneOf(Vec<String>),
}

impl Seg {
    fn to_regex(&self) -> String {
        match self {
            Seg::Lit(text) => regex::escape(text),
            Seg::Any => ".*?".into(),
            Seg::Digits => r"\d+".into(),
            Seg::Token => r"[A-Za-z0-9.\-]+".into(),
            Seg::HostAddr => r"[\d.]+".into(),
            Seg::OneOf(alternatives) => {
                let alts: Vec<String> = alternatives.iter().map(|a| regex::escape(a)).collect();
                format!("(?:{})", alts.join("|"))
            }
        }
    }
}

pub fn lit(text: impl Into<String>) -> Seg {
    Seg::Lit(text.into())
}

pub fn any() -> Seg {
    Seg::Any
}

pub fn digits() -> Seg {
    Seg::Digits
}

pub fn token() -> Seg {
    Seg::Token
}

pub fn host_addr() -> Seg {
    Seg::HostAddr
}

pub fn one_of<I, S>(alternatives: I) -> Seg
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Seg::OneOf(alternatives.into_iter().map(Into::into).collect())
}

/// Each logical line break in a compiled pattern matches CRLF or a bare LF.
const LINE_BREAK: &str = r"[\r\n]{1,2}";

/// Builder for [`ResponsePattern`]: segments are grouped into logical
/// lines, each line terminated by a tolerant line break. An empty line
/// contributes only the break, which is how the blank line ending a
/// header block is expressed.
#[derive(Debug, Default)]
pub struct PatternBuilder {
    lines: Vec<Vec<Seg>>,
    tail: Vec<Seg>,
}

impl PatternBuilder {
    pub fn line<I>(mut self, segs: I) -> Self
    where
        I: IntoIterator<Item = Seg>,
    {
        self.lines.push(segs.into_iter().collect());
        self
    }

    /// Trailing segments not followed by a line break, for payloads whose
    /// final bytes are content rather than a terminator.
    pub fn tail<I>(mut self, segs: I) -> Self
    where
        I: IntoIterator<Item = Seg>,
    {
        self.tail = segs.into_iter().collect();
        self
    }

    /// A line holding a single literal.
    pub fn lit_line(self, text: impl Into<String>) -> Self {
        self.line([lit(text)])
    }

    pub fn blank_line(self) -> Self {
        self.line([])
    }

    pub fn compile(self) -> eyre::Result<ResponsePattern> {
        // `s` so wildcard spans may cross line breaks, `-u` to match raw
        // bytes from the wire.
        let mut source = String::from(r"(?s-u)\A");
        for line in &self.lines {
            for seg in line {
                source.push_str(&seg.to_regex());
            }
            source.push_str(LINE_BREAK);
        }
        for seg in &self.tail {
            source.push_str(&seg.to_regex());
        }
        source.push_str(r"\z");

        let regex = Regex::new(&source)?;
        Ok(ResponsePattern { regex, source })
    }
}

/// A compiled expected-response pattern, anchored over the full payload.
#[derive(Debug, Clone)]
pub struct ResponsePattern {
    regex: Regex,
    source: String,
}

impl ResponsePattern {
    pub fn builder() -> PatternBuilder {
        PatternBuilder::default()
    }

    pub fn matches(&self, actual: &[u8]) -> bool {
        self.regex.is_match(actual)
    }

    pub fn assert_match(&self, actual: &[u8]) -> Result<(), HarnessError> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(HarnessError::PatternMismatch {
                expected: self.source.clone(),
                actual: actual.to_vec(),
            })
        }
    }

    /// The compiled regex source, for diagnostics.
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Validator for the fixed control-channel response framing.
///
/// The envelope is checked independently of the body so a framing problem
/// is reported as such, not as a body mismatch.
#[derive(Debug, Clone)]
pub struct HttpEnvelope {
    regex: Regex,
}

impl Default for HttpEnvelope {
    fn default() -> Self {
        // The server's HTTP layer spells the length header `Content-length`.
        let source = format!(
            r"(?s-u)\AHTTP/1\.1 200 OK{lb}Server: XMLRPC\+\+ 0\.8{lb}Content-Type: text/xml{lb}Content-length: \d+[\r\n]{{2,4}}",
            lb = LINE_BREAK,
        );
        Self {
            regex: Regex::new(&source).expect("envelope regex is statically valid"),
        }
    }
}

impl HttpEnvelope {
    /// Validates the status line and header block and returns the body
    /// that follows them.
    pub fn strip<'a>(&self, actual: &'a [u8]) -> Result<&'a [u8], HarnessError> {
        match self.regex.find(actual) {
            Some(head) => Ok(&actual[head.end()..]),
            None => Err(HarnessError::EnvelopeMismatch {
                actual: actual.to_vec(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_pattern() -> ResponsePattern {
        ResponsePattern::builder()
            .lit_line("SIP/2.0 200 OK")
            .line([lit("To: <sip:a@b>;tag="), token()])
            .lit_line("Content-Length: 0")
            .blank_line()
            .compile()
            .unwrap()
    }

    #[test]
    fn matches_crlf_and_bare_lf() {
        let p = ok_pattern();
        assert!(p.matches(b"SIP/2.0 200 OK\r\nTo: <sip:a@b>;tag=X9-2\r\nContent-Length: 0\r\n\r\n"));
        assert!(p.matches(b"SIP/2.0 200 OK\nTo: <sip:a@b>;tag=X9-2\nContent-Length: 0\n\n"));
    }

    #[test]
    fn anchored_at_both_ends() {
        let p = ok_pattern();
        assert!(!p.matches(b"junkSIP/2.0 200 OK\r\nTo: <sip:a@b>;tag=X\r\nContent-Length: 0\r\n\r\n"));
        assert!(!p.matches(b"SIP/2.0 200 OK\r\nTo: <sip:a@b>;tag=X\r\nContent-Length: 0\r\n\r\ntrailing"));
    }

    #[test]
    fn literal_metacharacters_are_escaped() {
        let p = ResponsePattern::builder()
            .lit_line("Contact: <sip:127.0.0.1:57715>")
            .compile()
            .unwrap();
        assert!(p.matches(b"Contact: <sip:127.0.0.1:57715>\r\n"));
        // The dots must not act as wildcards.
        assert!(!p.matches(b"Contact: <sip:127X0X0X1:57715>\r\n"));
    }

    #[test]
    fn wildcard_spans() {
        let p = ResponsePattern::builder()
            .line([lit("Via: SIP/2.0/UDP 127.0.0.1;rport="), digits(), lit(";received="), host_addr()])
            .compile()
            .unwrap();
        assert!(p.matches(b"Via: SIP/2.0/UDP 127.0.0.1;rport=12;received=10.0.0.7\r\n"));
        assert!(!p.matches(b"Via: SIP/2.0/UDP 127.0.0.1;rport=;received=10.0.0.7\r\n"));
    }

    #[test]
    fn bounded_alternation() {
        let p = ResponsePattern::builder()
            .line([lit("Contact: <sip:a@b>;expires="), one_of(["4", "5"])])
            .compile()
            .unwrap();
        assert!(p.matches(b"Contact: <sip:a@b>;expires=5\r\n"));
        assert!(p.matches(b"Contact: <sip:a@b>;expires=4\r\n"));
        assert!(!p.matches(b"Contact: <sip:a@b>;expires=3\r\n"));
    }

    #[test]
    fn mismatch_reports_pattern_and_actual() {
        let p = ok_pattern();
        let err = p.assert_match(b"SIP/2.0 404 Not Found\r\n").unwrap_err();
        match err {
            HarnessError::PatternMismatch { expected, actual } => {
                assert!(expected.contains("200 OK"));
                assert_eq!(actual, b"SIP/2.0 404 Not Found\r\n".to_vec());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn envelope_strip_returns_body() {
        let envelope = HttpEnvelope::default();
        let raw = b"HTTP/1.1 200 OK\r\nServer: XMLRPC++ 0.8\r\nContent-Type: text/xml\r\nContent-length: 11\r\n\r\nhello world";
        let body = envelope.strip(raw).unwrap();
        assert_eq!(body, b"hello world");
    }

    #[test]
    fn envelope_mismatch_is_distinct() {
        let envelope = HttpEnvelope::default();
        let raw = b"HTTP/1.1 500 Internal Server Error\r\n\r\n";
        match envelope.strip(raw).unwrap_err() {
            HarnessError::EnvelopeMismatch { actual } => {
                assert!(actual.starts_with(b"HTTP/1.1 500"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
