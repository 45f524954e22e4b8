//! Masking transforms for sensitive business fields
//!
//! These functions run exactly once, when a value is placed into an
//! [`AttributeBag`](crate::context::AttributeBag), so the unmasked value is
//! never attached to a span or written to an info-level log line.
//!
//! All functions count characters rather than bytes and never fail: inputs
//! too short to mask come back unchanged. Every transform is idempotent,
//! masking an already-masked value returns it as-is.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::iter;

/// Number of trailing characters left visible on card and phone numbers
pub const VISIBLE_SUFFIX: usize = 4;

/// Number of leading characters of an email local part left visible
pub const EMAIL_VISIBLE_PREFIX: usize = 2;

const MASK_CHAR: char = '*';

/// Kind of sensitive value being masked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaskKind {
    /// Payment card number (PAN)
    CardNumber,
    /// Customer email address
    Email,
    /// Customer mobile/phone number
    Phone,
}

/// Mask `raw` according to the rule for `kind`
///
/// # Examples
///
/// ```rust
/// use bizctx::utils::masking::{mask, MaskKind};
///
/// assert_eq!(mask(MaskKind::CardNumber, "4111111111111111"), "************1111");
/// assert_eq!(mask(MaskKind::Email, "johndoe@example.com"), "jo*****@example.com");
/// assert_eq!(mask(MaskKind::Phone, "42"), "42");
/// ```
pub fn mask(kind: MaskKind, raw: &str) -> String {
    match kind {
        MaskKind::CardNumber => mask_card_number(raw),
        MaskKind::Email => mask_email(raw),
        MaskKind::Phone => mask_phone(raw),
    }
}

/// Replace all but the last four characters of a card number with `*`
pub fn mask_card_number(raw: &str) -> String {
    mask_all_but_suffix(raw, VISIBLE_SUFFIX)
}

/// Replace all but the last four characters of a phone number with `*`
pub fn mask_phone(raw: &str) -> String {
    mask_all_but_suffix(raw, VISIBLE_SUFFIX)
}

/// Keep the first two characters of the local part and the whole domain
///
/// Values without `@`, or whose local part is two characters or shorter,
/// are returned unchanged.
pub fn mask_email(raw: &str) -> String {
    let Some((local, domain)) = raw.split_once('@') else {
        return raw.to_string();
    };

    let local_len = local.chars().count();
    if local_len <= EMAIL_VISIBLE_PREFIX {
        return raw.to_string();
    }

    let mut masked = String::with_capacity(raw.len());
    masked.extend(local.chars().take(EMAIL_VISIBLE_PREFIX));
    masked.extend(iter::repeat(MASK_CHAR).take(local_len - EMAIL_VISIBLE_PREFIX));
    masked.push('@');
    masked.push_str(domain);
    masked
}

fn mask_all_but_suffix(raw: &str, visible: usize) -> String {
    let char_count = raw.chars().count();
    if char_count <= visible {
        return raw.to_string();
    }

    let hidden = char_count - visible;
    let mut masked = String::with_capacity(raw.len());
    masked.extend(iter::repeat(MASK_CHAR).take(hidden));
    masked.extend(raw.chars().skip(hidden));
    masked
}

/// Safely truncates a string to a maximum number of characters, respecting UTF-8 boundaries
///
/// Used to bound free-text values such as error messages before they are
/// attached to a span.
///
/// ```rust
/// use bizctx::utils::masking::truncate_string;
///
/// assert_eq!(truncate_string("Hello World", 5), "Hello");
/// assert_eq!(truncate_string("Short", 100), "Short");
/// ```
pub fn truncate_string(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Email addresses inside free text; the domain stops at trailing punctuation
static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+*\-]+@[A-Za-z0-9\-]+(?:\.[A-Za-z0-9\-]+)+")
        .expect("email pattern is valid")
});

/// Digit runs, optionally `+`-prefixed and `-`-separated, not touching other word characters
static DIGIT_RUN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\+?\b\d(?:[\d\-]*\d)?\b").expect("digit run pattern is valid"));

/// Digit counts treated as a card number
const CARD_DIGITS: std::ops::RangeInclusive<usize> = 12..=19;

/// Digit counts treated as a phone number
const PHONE_DIGITS: std::ops::RangeInclusive<usize> = 7..=15;

/// Masks email addresses, card numbers and phone numbers inside free text
///
/// Error messages produced by services sometimes echo the offending input
/// back, quoted or followed by punctuation. This pass runs before such a
/// message is attached to a span. Runs of fewer than seven digits, such as
/// amounts and loan numbers, are left alone.
pub fn sanitize_message(input: &str) -> String {
    let emails_masked =
        EMAIL_PATTERN.replace_all(input, |caps: &Captures<'_>| mask_email(&caps[0]));

    DIGIT_RUN_PATTERN
        .replace_all(&emails_masked, |caps: &Captures<'_>| {
            let run = &caps[0];
            let digits = run.chars().filter(char::is_ascii_digit).count();
            if CARD_DIGITS.contains(&digits) {
                mask_card_number(run)
            } else if PHONE_DIGITS.contains(&digits) {
                mask_phone(run)
            } else {
                run.to_string()
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_number_masking() {
        assert_eq!(mask_card_number("4111111111111111"), "************1111");
        assert_eq!(mask_card_number("42"), "42");
        assert_eq!(mask_card_number("1234"), "1234");
        assert_eq!(mask_card_number("12345"), "*2345");
        assert_eq!(mask_card_number(""), "");
    }

    #[test]
    fn test_email_masking() {
        assert_eq!(mask_email("jd@example.com"), "jd@example.com");
        assert_eq!(mask_email("johndoe@example.com"), "jo*****@example.com");
        assert_eq!(mask_email("abc@bank.io"), "ab*@bank.io");
        assert_eq!(mask_email("not-an-email"), "not-an-email");
        assert_eq!(mask_email("@example.com"), "@example.com");
        assert_eq!(mask_email(""), "");
    }

    #[test]
    fn test_phone_masking() {
        assert_eq!(mask_phone("+4915112345678"), "**********5678");
        assert_eq!(mask_phone("911"), "911");
    }

    #[test]
    fn test_masking_is_idempotent() {
        for (kind, raw) in [
            (MaskKind::CardNumber, "4111111111111111"),
            (MaskKind::CardNumber, "42"),
            (MaskKind::Email, "johndoe@example.com"),
            (MaskKind::Email, "jd@example.com"),
            (MaskKind::Phone, "5551234567"),
        ] {
            let once = mask(kind, raw);
            assert_eq!(mask(kind, &once), once, "{kind:?} mask of {raw} not idempotent");
        }
    }

    #[test]
    fn test_masking_multibyte_input() {
        assert_eq!(mask_card_number("äöüß1234"), "****1234");
        assert_eq!(mask_email("jürgen@bank.de"), "jü****@bank.de");
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("Hello World", 5), "Hello");
        assert_eq!(truncate_string("日本語テキスト", 3), "日本語");
        assert_eq!(truncate_string("", 10), "");
    }

    #[test]
    fn test_sanitize_message() {
        let input = "card 4111111111111111 owned by johndoe@example.com was blocked";
        let sanitized = sanitize_message(input);
        assert_eq!(
            sanitized,
            "card ************1111 owned by jo*****@example.com was blocked"
        );
        assert_eq!(sanitize_message("loan L-1001 not found"), "loan L-1001 not found");
    }

    #[test]
    fn test_sanitize_quoted_and_punctuated_values() {
        let not_found = "Card not found with the given input data cardNumber : '4111111111111111'";
        assert_eq!(
            sanitize_message(not_found),
            "Card not found with the given input data cardNumber : '************1111'"
        );
        assert_eq!(
            sanitize_message("card 4111111111111111, owner C-42"),
            "card ************1111, owner C-42"
        );
        assert_eq!(
            sanitize_message("Customer not found with mobileNumber : '5551234567'"),
            "Customer not found with mobileNumber : '******4567'"
        );
        assert_eq!(
            sanitize_message("no account for (johndoe@example.com)."),
            "no account for (jo*****@example.com)."
        );
        assert_eq!(
            sanitize_message("call +4915112345678 failed"),
            "call **********5678 failed"
        );
        assert_eq!(
            sanitize_message("card=4111-1111-1111-1111;"),
            "card=***************1111;"
        );
    }

    #[test]
    fn test_sanitize_leaves_short_numbers_and_words() {
        for message in [
            "amount 250000 exceeds limit",
            "account DE-1 has 3 holds",
            "ref A4111111111111111 unknown",
            "retry after 30s",
        ] {
            assert_eq!(sanitize_message(message), message);
        }
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let once = sanitize_message(
            "card '4111111111111111' mobile 5551234567 mail johndoe@example.com.",
        );
        assert_eq!(sanitize_message(&once), once);
        assert!(!once.contains("4111111111111111"));
        assert!(!once.contains("5551234567"));
        assert!(!once.contains("johndoe"));
    }
}
