//! ISBN-10 to ISBN-13 conversion
//!
//! Only the EAN-13 check digit is computed. The ISBN-10 check digit is never
//! validated, so an invalid ISBN-10 yields a well-formed but meaningless
//! ISBN-13.

/// Bookland prefix prepended to ISBN-10 bodies
pub const BOOKLAND_PREFIX: &str = "978";

/// Placeholder stored when an ISBN-10 has the wrong length
pub const PLACEHOLDER_ISBN10: &str = "0000000000";

/// Check digit for the first twelve digits of an ISBN-13
///
/// Accepts a full ISBN-13 or just its first twelve characters. Returns `None`
/// when fewer than twelve characters are given or any of them is not an ASCII
/// digit.
pub fn isbn13_check_digit(isbn: &str) -> Option<u8> {
    let body = isbn.as_bytes().get(..12)?;

    let mut sum = 0u32;
    for (i, &b) in body.iter().enumerate() {
        if !b.is_ascii_digit() {
            return None;
        }
        let weight = if i % 2 == 0 { 1 } else { 3 };
        sum += weight * u32::from(b - b'0');
    }

    Some(((10 - sum % 10) % 10) as u8)
}

/// Derive an ISBN-13 from an ISBN-10
///
/// An ISBN-10 that is not exactly ten characters long is first replaced by
/// [`PLACEHOLDER_ISBN10`]; the normalised value is returned alongside the
/// ISBN-13 so callers can keep the two consistent.
pub fn isbn10_to_isbn13(isbn10: &str) -> (String, Option<String>) {
    let normalised = if isbn10.len() == 10 && isbn10.is_ascii() {
        isbn10.to_string()
    } else {
        PLACEHOLDER_ISBN10.to_string()
    };

    let mut twelve = String::with_capacity(13);
    twelve.push_str(BOOKLAND_PREFIX);
    twelve.push_str(&normalised[..9]);

    let isbn13 = isbn13_check_digit(&twelve).map(|digit| {
        twelve.push(char::from(b'0' + digit));
        twelve
    });

    (normalised, isbn13)
}
