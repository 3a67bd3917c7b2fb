//! Keyword screening for statements submitted to `/execute`.
//!
//! The check is purely textual: the statement is uppercased and trimmed,
//! statements opening with [`READ_ONLY_KEYWORD`] pass untouched, and any
//! other statement is rejected if one of [`MUTATING_KEYWORDS`] appears
//! anywhere in it as a substring. There is no tokenization, so string
//! literals and identifiers are scanned too.

pub const READ_ONLY_KEYWORD: &str = "SELECT";

/// Scanned in this order; the first hit is the one reported.
pub const MUTATING_KEYWORDS: [&str; 7] = [
    "DROP", "DELETE", "TRUNCATE", "ALTER", "CREATE", "INSERT", "UPDATE",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Rejected(&'static str),
}

pub fn validate(statement: &str) -> Verdict {
    let normalized = statement.to_uppercase();
    let normalized = normalized.trim();

    if normalized.starts_with(READ_ONLY_KEYWORD) {
        return Verdict::Allowed;
    }

    MUTATING_KEYWORDS
        .iter()
        .copied()
        .find(|keyword| normalized.contains(keyword))
        .map_or(Verdict::Allowed, Verdict::Rejected)
}

/// Lexical read/write classification shared by the gateway.
pub fn is_read_only(statement: &str) -> bool {
    statement
        .trim()
        .to_uppercase()
        .starts_with(READ_ONLY_KEYWORD)
}
