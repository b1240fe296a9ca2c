//! The "is this actually a SQL file" heuristic (§4.4): name-based rejection
//! of dotfiles/temp files plus a content sniff for SQL keywords.

const SQL_KEYWORDS: [&str; 10] = [
    "SELECT", "INSERT", "UPDATE", "DELETE", "CREATE", "DROP", "ALTER", "SHOW", "DESCRIBE", "USE",
];

/// Rejects dotfiles, AppleDouble (`._`) siblings, and editor temp files by
/// name alone, before any content is read.
pub fn has_rejected_name(file_name: &str) -> bool {
    file_name.starts_with("._")
        || file_name.starts_with('.')
        || file_name.starts_with('~')
        || file_name.ends_with('~')
}

/// Decides whether `sample` (expected to be the first ~1 KiB of a file,
/// already decoded to text by the caller's encoding policy) looks like SQL:
/// non-empty, no embedded NUL, and containing at least one SQL keyword.
pub fn looks_like_sql(sample: &str) -> bool {
    if sample.is_empty() || sample.contains('\0') {
        return false;
    }
    let upper = sample.to_uppercase();
    SQL_KEYWORDS.iter().any(|kw| upper.contains(kw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_apple_double_and_dotfiles() {
        assert!(has_rejected_name("._report.sql"));
        assert!(has_rejected_name(".hidden.sql"));
        assert!(has_rejected_name("~tempfile.sql"));
        assert!(has_rejected_name("backup.sql~"));
        assert!(!has_rejected_name("report.sql"));
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        assert!(looks_like_sql("select * from orders;"));
        assert!(looks_like_sql("  CREATE TABLE foo (id int);"));
        assert!(!looks_like_sql("just some prose, no query here"));
    }

    #[test]
    fn empty_or_binary_looking_sample_is_rejected() {
        assert!(!looks_like_sql(""));
        assert!(!looks_like_sql("abc\0def SELECT"));
    }
}
