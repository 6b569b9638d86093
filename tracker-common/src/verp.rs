//! Variable Envelope Return Paths.
//!
//! The recipient of a message is folded into the envelope sender so that a
//! bounce identifies who it bounced for:
//!
//! ```text
//! encode("bounces@tracker.example", "user@mail.example")
//!     == "bounces-user=mail.example@tracker.example"
//! ```
//!
//! Characters that would confuse the decoder (`@ : % ! - [ ] +`) are escaped
//! in the recipient as `+XX`, where `XX` is the uppercase hex code.

use std::fmt::Write;

use crate::error::VerpError;

pub const DEFAULT_SEPARATOR: char = '-';

const ESCAPED: &[u8] = b"@:%!-[]+";

/// Encode `recipient` into the return path of `sender`.
///
/// # Errors
/// Fails if either address has no `@`.
pub fn encode(sender: &str, recipient: &str) -> Result<String, VerpError> {
    encode_with_separator(sender, recipient, DEFAULT_SEPARATOR)
}

pub fn encode_with_separator(
    sender: &str,
    recipient: &str,
    separator: char,
) -> Result<String, VerpError> {
    let (sender_local, sender_domain) = split_address(sender)?;
    let (recipient_local, recipient_domain) = split_address(recipient)?;

    let mut encoded = String::with_capacity(sender.len() + recipient.len() + 8);
    encoded.push_str(sender_local);
    encoded.push(separator);
    escape_into(recipient_local, &mut encoded);
    encoded.push('=');
    escape_into(recipient_domain, &mut encoded);
    encoded.push('@');
    encoded.push_str(sender_domain);

    Ok(encoded)
}

/// Split a VERP address back into `(sender, recipient)`.
///
/// # Errors
/// Fails if the address lacks the `@`, `=` or separator that an encoded
/// address always has.
pub fn decode(address: &str) -> Result<(String, String), VerpError> {
    decode_with_separator(address, DEFAULT_SEPARATOR)
}

pub fn decode_with_separator(
    address: &str,
    separator: char,
) -> Result<(String, String), VerpError> {
    let (local, sender_domain) = split_address(address)?;

    let (local, recipient_domain) = local
        .rsplit_once('=')
        .ok_or_else(|| VerpError::MissingRecipientDomain(address.to_string()))?;

    let (sender_local, recipient_local) =
        local
            .rsplit_once(separator)
            .ok_or_else(|| VerpError::MissingSeparator {
                separator,
                address: address.to_string(),
            })?;

    let sender = format!("{sender_local}@{sender_domain}");
    let recipient = format!(
        "{}@{}",
        unescape(recipient_local),
        unescape(recipient_domain)
    );

    Ok((sender, recipient))
}

fn split_address(address: &str) -> Result<(&str, &str), VerpError> {
    address
        .rsplit_once('@')
        .ok_or_else(|| VerpError::MissingDomain(address.to_string()))
}

fn escape_into(part: &str, out: &mut String) {
    for c in part.chars() {
        if let Ok(byte) = u8::try_from(c)
            && ESCAPED.contains(&byte)
        {
            // Writing to a String cannot fail.
            let _ = write!(out, "+{byte:02X}");
        } else {
            out.push(c);
        }
    }
}

/// Replace every `+XX` (either case) with the character it names. A `+` not
/// followed by two hex digits is kept as is.
fn unescape(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    let mut rest = part;

    while let Some(index) = rest.find('+') {
        out.push_str(&rest[..index]);
        let after = &rest[index + 1..];

        let escaped = after
            .get(..2)
            .filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
            .and_then(|hex| u8::from_str_radix(hex, 16).ok());

        if let Some(byte) = escaped {
            out.push(char::from(byte));
            rest = &after[2..];
        } else {
            out.push('+');
            rest = after;
        }
    }

    out.push_str(rest);
    out
}
