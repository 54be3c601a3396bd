//! License plate canonicalization.
//!
//! A plate is stored as up to 3 uppercase letters followed by up to 3 digits,
//! with no separator ("ABC123"). The display form puts a single space between
//! the segments ("ABC 123"), but only once the letters segment is full and at
//! least one digit exists. Every input surface (the add-car form, the search
//! box, the search API) goes through [`normalize`] so that what the user
//! types and what the matcher compares can never drift apart.

pub const MAX_LETTERS: usize = 3;
pub const MAX_DIGITS: usize = 3;

/// Canonicalizes arbitrary input: uppercased, non-alphanumerics dropped,
/// first up to 3 letters then first up to 3 digits, in scan order.
///
/// Never fails; anything unusable simply yields a shorter (possibly empty)
/// string.
pub fn normalize(raw: &str) -> String {
    let mut letters = String::new();
    let mut digits = String::new();

    for c in raw.chars() {
        let c = c.to_ascii_uppercase();
        if c.is_ascii_uppercase() && letters.len() < MAX_LETTERS {
            letters.push(c);
        } else if c.is_ascii_digit() && digits.len() < MAX_DIGITS {
            digits.push(c);
        }
    }

    letters + &digits
}

/// Display form of a canonical plate: "ABC 123" once all 3 letters are there
/// and digits follow, the bare canonical string otherwise.
pub fn format(canonical: &str) -> String {
    let split = canonical
        .chars()
        .take_while(|c| c.is_ascii_uppercase())
        .count();
    let (letters, digits) = canonical.split_at(split);

    if letters.len() == MAX_LETTERS && !digits.is_empty() {
        format!("{letters} {digits}")
    } else {
        canonical.to_owned()
    }
}

/// Formats in-flight input from a live text field, keeping the cursor where
/// the user left it. `cursor` and the returned offset are character
/// positions, not byte indices, matching what a text widget reports. The
/// offset counts the significant characters typed before the old cursor,
/// bumped past the separator when the auto-inserted space lands at or
/// before it.
pub fn format_live(raw: &str, cursor: usize) -> (String, usize) {
    let formatted = format(&normalize(raw));

    let mut letters = 0;
    let mut digits = 0;
    for c in raw.chars().take(cursor) {
        let c = c.to_ascii_uppercase();
        if c.is_ascii_uppercase() && letters < MAX_LETTERS {
            letters += 1;
        } else if c.is_ascii_digit() && digits < MAX_DIGITS {
            digits += 1;
        }
    }

    let mut offset = letters + digits;
    if formatted.contains(' ') && offset >= MAX_LETTERS {
        offset += 1;
    }

    let offset = offset.min(formatted.len());
    (formatted, offset)
}

/// A validated, canonical plate number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlateNumber(String);

impl PlateNumber {
    /// Canonicalizes `raw`; `None` when nothing usable remains.
    pub fn parse(raw: &str) -> Option<Self> {
        let canonical = normalize(raw);
        if canonical.is_empty() {
            None
        } else {
            Some(Self(canonical))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The spaced display form.
    pub fn display(&self) -> String {
        format(&self.0)
    }
}

impl std::fmt::Display for PlateNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display())
    }
}
