//! Pre-send checks. Everything here runs before any network call.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ValidationError;

const MIN_SUBJECT_CHARS: usize = 2;
const MIN_BODY_CHARS: usize = 10;

static EMAIL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").ok());

pub fn is_valid_email(address: &str) -> bool {
    EMAIL_RE.as_ref().is_some_and(|re| re.is_match(address))
}

/// Check recipient, subject and body of an outbound email.
pub fn validate_email_content(to: &str, subject: &str, html: &str) -> Result<(), ValidationError> {
    if !is_valid_email(to) {
        return Err(ValidationError::Recipient(to.to_string()));
    }
    if subject.trim().chars().count() < MIN_SUBJECT_CHARS {
        return Err(ValidationError::Subject(subject.to_string()));
    }
    if html.trim().chars().count() < MIN_BODY_CHARS {
        return Err(ValidationError::Body(html.chars().count()));
    }
    Ok(())
}

/// Trim a subject and drop wrapping quotes left over from generation.
pub fn clean_subject(subject: &str) -> String {
    subject
        .trim()
        .trim_matches(|ch| ch == '"' || ch == '\'')
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipient_must_be_an_address() {
        assert!(is_valid_email("a@x.com"));
        assert!(is_valid_email("first.last+tag@mail.example.io"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("a@x"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn content_rules() {
        let body = "<p>Hello there, Ada</p>";
        assert!(validate_email_content("a@x.com", "Hi", body).is_ok());
        assert_eq!(
            validate_email_content("not-an-email", "Hi", body),
            Err(ValidationError::Recipient("not-an-email".into()))
        );
        assert!(matches!(
            validate_email_content("a@x.com", " x ", body),
            Err(ValidationError::Subject(_))
        ));
        assert_eq!(
            validate_email_content("a@x.com", "Hi", " short "),
            Err(ValidationError::Body(7))
        );
    }

    #[test]
    fn subject_cleanup() {
        assert_eq!(clean_subject("  \"Quick question, X Corp\" "), "Quick question, X Corp");
        assert_eq!(clean_subject("'Hi'"), "Hi");
        assert_eq!(clean_subject("Plain"), "Plain");
    }
}
