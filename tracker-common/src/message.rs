use std::sync::Arc;

use mailparse::{MailAddr, ParsedMail};

use crate::error::MessageError;

/// An immutable received message.
///
/// The raw bytes are kept untouched so that forwarded copies carry the
/// original headers and body verbatim; the header block is parsed once on
/// construction for lookups.
#[derive(Debug, Clone)]
pub struct Email {
    raw: Arc<[u8]>,
    headers: Vec<(String, String)>,
    body_offset: usize,
}

impl Email {
    /// Parse the header block of `raw`.
    ///
    /// # Errors
    /// If the header block cannot be parsed or holds no headers at all.
    pub fn parse(raw: impl Into<Vec<u8>>) -> Result<Self, MessageError> {
        let raw: Vec<u8> = raw.into();

        let (headers, body_offset) = {
            let (parsed, offset) = mailparse::parse_headers(&raw)?;
            let headers = parsed
                .iter()
                .map(|header| (header.get_key(), header.get_value()))
                .collect::<Vec<_>>();
            (headers, offset)
        };

        if headers.is_empty() {
            return Err(MessageError::Empty);
        }

        Ok(Self {
            raw: raw.into(),
            headers,
            body_offset,
        })
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn body(&self) -> &[u8] {
        &self.raw[self.body_offset..]
    }

    /// First value of the header `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_values(name).next()
    }

    /// Every value of the header `name`, in message order.
    pub fn header_values<'a, 'n>(
        &'a self,
        name: &'n str,
    ) -> impl Iterator<Item = &'a str> + use<'a, 'n> {
        self.headers
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    /// Whether one of the `X-Loop` headers names `address`.
    pub fn loops_through(&self, address: &str) -> bool {
        self.header_values("X-Loop")
            .any(|value| value.trim().eq_ignore_ascii_case(address))
    }

    pub fn subject(&self) -> Option<&str> {
        self.header("Subject")
    }

    pub fn message_id(&self) -> Option<&str> {
        self.header("Message-ID")
    }

    /// Bare address of the first `From` mailbox.
    pub fn from_address(&self) -> Option<String> {
        let from = self.header("From")?;
        let addresses = mailparse::addrparse(from).ok()?;

        addresses.iter().find_map(|address| match address {
            MailAddr::Single(info) => Some(info.addr.clone()),
            MailAddr::Group(group) => group.addrs.first().map(|info| info.addr.clone()),
        })
    }

    /// Decoded body of the first `text/plain` part, walking the MIME tree
    /// depth first. A message without a content type counts as plain text.
    ///
    /// # Errors
    /// If the MIME structure or the part's transfer encoding is broken.
    pub fn plain_text(&self) -> Result<Option<String>, MessageError> {
        let parsed = mailparse::parse_mail(&self.raw)?;

        first_plain_part(&parsed)
            .map(ParsedMail::get_body)
            .transpose()
            .map_err(MessageError::from)
    }

    /// Render a copy of the message with `extra` headers appended to the end
    /// of the header block. The body is left byte for byte as received.
    pub fn with_headers<K, V>(&self, extra: &[(K, V)]) -> Vec<u8>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let (head, newline) = self.header_block();

        let mut out = Vec::with_capacity(self.raw.len() + extra.len() * 64);
        out.extend_from_slice(head);
        if !head.ends_with(b"\n") {
            out.extend_from_slice(newline);
        }
        for (name, value) in extra {
            out.extend_from_slice(name.as_ref().as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_ref().as_bytes());
            out.extend_from_slice(newline);
        }
        out.extend_from_slice(newline);
        out.extend_from_slice(self.body());

        out
    }

    /// Header lines without the separating blank line, plus the line break
    /// style the message uses.
    fn header_block(&self) -> (&[u8], &'static [u8]) {
        let head = &self.raw[..self.body_offset];
        let newline: &'static [u8] = if head.windows(2).any(|w| w == b"\r\n") {
            b"\r\n"
        } else {
            b"\n"
        };

        let trimmed = head
            .strip_suffix(b"\r\n\r\n")
            .or_else(|| head.strip_suffix(b"\n\n"))
            .map_or(head, |without_blank| {
                &head[..without_blank.len() + newline.len()]
            });

        (trimmed, newline)
    }
}

fn first_plain_part<'p, 'a>(part: &'p ParsedMail<'a>) -> Option<&'p ParsedMail<'a>> {
    if part.subparts.is_empty() {
        return part
            .ctype
            .mimetype
            .eq_ignore_ascii_case("text/plain")
            .then_some(part);
    }

    part.subparts.iter().find_map(first_plain_part)
}
