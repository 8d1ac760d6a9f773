//! Raw RFC 5322 message parsing.
//!
//! Converts the bytes returned by the mailbox into [`MessageContent`] using
//! the `mailparse` crate. All text is stripped of NUL bytes before it reaches
//! Postgres. When the `Date` header is missing, unreadable or too far in the
//! future the server's internal date is used instead; a message with neither
//! is rejected.

use chrono::{DateTime, Duration, Utc};
use mailparse::{MailHeaderMap, ParsedMail, parse_mail};
use thiserror::Error;

/// Maximum tolerated clock skew for future-dated messages.
const MAX_FUTURE_SKEW: Duration = Duration::hours(24);

/// Parsed body and headers of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent {
    pub message_id: Option<String>,
    pub subject: String,
    pub from_name: String,
    pub from_address: String,
    pub to_addresses: Vec<String>,
    pub in_reply_to: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub body_text: String,
    pub size_bytes: i64,
}

#[derive(Debug, Error)]
pub enum ParseEmailError {
    #[error("failed to parse MIME structure: {0}")]
    MimeParse(#[from] mailparse::MailParseError),
    #[error("message has no Date header and no server date")]
    MissingDate,
    #[error("invalid Date header `{raw}`: {error}")]
    InvalidDate { raw: String, error: String },
    #[error("future Date header `{raw}`")]
    FutureDate { raw: String },
}

fn sanitize_text(text: &str) -> String {
    text.replace('\0', "").trim().to_string()
}

/// Strip angle brackets and whitespace; empty ids become `None`.
pub fn normalize_message_id(msg_id: Option<String>) -> Option<String> {
    msg_id.and_then(|id| {
        let cleaned = id.trim().trim_matches(&['<', '>'][..]).trim();
        if cleaned.is_empty() {
            None
        } else {
            Some(sanitize_text(cleaned))
        }
    })
}

fn parse_addresses(header_value: &str) -> Vec<(String, String)> {
    let Ok(list) = mailparse::addrparse(header_value) else {
        return Vec::new();
    };

    let mut addresses = Vec::new();
    for addr in list.iter() {
        match addr {
            mailparse::MailAddr::Single(info) => {
                let name = info.display_name.clone().unwrap_or_default();
                addresses.push((sanitize_text(&name), info.addr.to_lowercase()));
            }
            mailparse::MailAddr::Group(group) => {
                for info in &group.addrs {
                    let name = info.display_name.clone().unwrap_or_default();
                    addresses.push((sanitize_text(&name), info.addr.to_lowercase()));
                }
            }
        }
    }
    addresses
}

/// Depth-first search for the first `text/plain` part.
fn find_plain_text(part: &ParsedMail<'_>) -> Option<String> {
    if part.subparts.is_empty() {
        if part.ctype.mimetype.eq_ignore_ascii_case("text/plain") {
            return part.get_body().ok();
        }
        return None;
    }
    part.subparts.iter().find_map(find_plain_text)
}

fn resolve_date(
    raw_header: Option<String>,
    fallback: Option<DateTime<Utc>>,
) -> Result<DateTime<Utc>, ParseEmailError> {
    let raw = raw_header.unwrap_or_default();
    if raw.trim().is_empty() {
        return fallback.ok_or(ParseEmailError::MissingDate);
    }

    match dateparser::parse(&raw) {
        Ok(dt) => {
            let utc = dt.with_timezone(&Utc);
            if utc <= Utc::now() + MAX_FUTURE_SKEW {
                return Ok(utc);
            }
            match fallback {
                Some(date) => {
                    log::warn!(
                        "future Date `{}` (> {} hours ahead), using server date",
                        raw,
                        MAX_FUTURE_SKEW.num_hours()
                    );
                    Ok(date)
                }
                None => Err(ParseEmailError::FutureDate { raw }),
            }
        }
        Err(source) => match fallback {
            Some(date) => {
                log::debug!("unreadable Date `{}`, using server date", raw);
                Ok(date)
            }
            None => Err(ParseEmailError::InvalidDate {
                raw,
                error: source.to_string(),
            }),
        },
    }
}

/// Parse a full message.
///
/// `fallback_date` is normally the IMAP INTERNALDATE of the message.
pub fn parse_message(
    raw: &[u8],
    fallback_date: Option<DateTime<Utc>>,
) -> Result<MessageContent, ParseEmailError> {
    let parsed = parse_mail(raw)?;

    let message_id = normalize_message_id(parsed.headers.get_first_value("Message-ID"));

    let subject = parsed
        .headers
        .get_first_value("Subject")
        .map(|s| sanitize_text(&s))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "(No Subject)".to_string());

    let sent_at = resolve_date(parsed.headers.get_first_value("Date"), fallback_date)?;

    let (from_name, from_address) = parsed
        .headers
        .get_first_value("From")
        .map(|v| parse_addresses(&v))
        .and_then(|addrs| addrs.into_iter().next())
        .unwrap_or_default();

    let to_addresses = parsed
        .headers
        .get_first_value("To")
        .map(|v| parse_addresses(&v))
        .unwrap_or_default()
        .into_iter()
        .map(|(_, email)| email)
        .collect();

    let body = find_plain_text(&parsed)
        .or_else(|| parsed.get_body().ok())
        .unwrap_or_default();

    Ok(MessageContent {
        message_id,
        subject,
        from_name,
        from_address,
        to_addresses,
        in_reply_to: normalize_message_id(parsed.headers.get_first_value("In-Reply-To")),
        sent_at,
        body_text: sanitize_text(&body),
        size_bytes: raw.len() as i64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sanitize_text() {
        assert_eq!(sanitize_text("hello\0world"), "helloworld");
        assert_eq!(sanitize_text("  test  "), "test");
    }

    #[test]
    fn test_normalize_message_id() {
        assert_eq!(
            normalize_message_id(Some("<order-118@shop.example>".to_string())),
            Some("order-118@shop.example".to_string())
        );
        assert_eq!(normalize_message_id(Some("<>".to_string())), None);
        assert_eq!(normalize_message_id(None), None);
    }

    #[test]
    fn parses_simple_message() {
        let raw = concat!(
            "Message-ID: <po-2231@supplier.example>\r\n",
            "Subject: Purchase order 2231\r\n",
            "From: Supplier Desk <Desk@Supplier.example>\r\n",
            "To: orders@shop.example, Ops <ops@shop.example>\r\n",
            "Date: Tue, 4 Mar 2025 09:15:00 +0000\r\n",
            "\r\n",
            "Please confirm delivery.\r\n"
        );

        let content = parse_message(raw.as_bytes(), None).expect("parsed");
        assert_eq!(content.message_id.as_deref(), Some("po-2231@supplier.example"));
        assert_eq!(content.subject, "Purchase order 2231");
        assert_eq!(content.from_name, "Supplier Desk");
        assert_eq!(content.from_address, "desk@supplier.example");
        assert_eq!(
            content.to_addresses,
            vec!["orders@shop.example".to_string(), "ops@shop.example".to_string()]
        );
        assert_eq!(content.body_text, "Please confirm delivery.");
        assert_eq!(
            content.sent_at,
            Utc.with_ymd_and_hms(2025, 3, 4, 9, 15, 0).unwrap()
        );
        assert_eq!(content.size_bytes, raw.len() as i64);
    }

    #[test]
    fn prefers_plain_text_part_in_multipart() {
        let raw = concat!(
            "Message-ID: <multi@test>\r\n",
            "Subject: Invoice\r\n",
            "From: billing@vendor.example\r\n",
            "Date: Tue, 4 Mar 2025 09:15:00 +0000\r\n",
            "Content-Type: multipart/alternative; boundary=\"b1\"\r\n",
            "\r\n",
            "--b1\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<p>html body</p>\r\n",
            "--b1\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "plain body\r\n",
            "--b1--\r\n"
        );

        let content = parse_message(raw.as_bytes(), None).expect("parsed");
        assert_eq!(content.body_text, "plain body");
    }

    #[test]
    fn missing_date_uses_server_date() {
        let raw = concat!(
            "Message-ID: <no-date@test>\r\n",
            "From: tester@example.com\r\n",
            "\r\n",
            "Body\r\n"
        );
        let internal = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();

        let content = parse_message(raw.as_bytes(), Some(internal)).expect("parsed");
        assert_eq!(content.sent_at, internal);
        assert_eq!(content.subject, "(No Subject)");
    }

    #[test]
    fn missing_date_without_fallback_is_rejected() {
        let raw = "Message-ID: <no-date@test>\r\nFrom: tester@example.com\r\n\r\nBody\r\n";
        let err = parse_message(raw.as_bytes(), None).unwrap_err();
        assert!(matches!(err, ParseEmailError::MissingDate));
    }

    #[test]
    fn invalid_date_without_fallback_is_rejected() {
        let raw = concat!(
            "Message-ID: <invalid-date@test>\r\n",
            "From: tester@example.com\r\n",
            "Date: not-a-real-date\r\n",
            "\r\n",
            "Body\r\n"
        );
        let err = parse_message(raw.as_bytes(), None).unwrap_err();
        assert!(matches!(err, ParseEmailError::InvalidDate { .. }));
    }

    #[test]
    fn future_date_falls_back_to_server_date() {
        let future = Utc::now() + Duration::days(10);
        let raw = format!(
            "Message-ID: <future@test>\r\nFrom: tester@example.com\r\nDate: {}\r\n\r\nBody\r\n",
            future.to_rfc2822()
        );
        let internal = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();

        let content = parse_message(raw.as_bytes(), Some(internal)).expect("parsed");
        assert_eq!(content.sent_at, internal);

        let err = parse_message(raw.as_bytes(), None).unwrap_err();
        assert!(matches!(err, ParseEmailError::FutureDate { .. }));
    }

    #[test]
    fn message_without_id_is_still_parsed() {
        let raw = "Subject: hi\r\nDate: Tue, 4 Mar 2025 09:15:00 +0000\r\n\r\nBody\r\n";
        let content = parse_message(raw.as_bytes(), None).expect("parsed");
        assert_eq!(content.message_id, None);
    }
}
