use std::borrow::Cow;

use crate::types::DatabaseType;

/// Target placeholder style for parameter-binding translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// PostgreSQL-style placeholders like `$1`.
    Postgres,
    /// SQLite-style placeholders like `?1`.
    Sqlite,
    /// Bare positional placeholders (`?`), used by MySQL and Db2.
    Bare,
}

/// The binding style a given engine expects.
#[must_use]
pub fn placeholder_style(engine: DatabaseType) -> PlaceholderStyle {
    match engine {
        #[cfg(feature = "postgres")]
        DatabaseType::Postgres => PlaceholderStyle::Postgres,
        #[cfg(feature = "sqlite")]
        DatabaseType::Sqlite => PlaceholderStyle::Sqlite,
        #[cfg(feature = "mysql")]
        DatabaseType::MySql => PlaceholderStyle::Bare,
        #[cfg(feature = "db2")]
        DatabaseType::Db2 => PlaceholderStyle::Bare,
    }
}

#[derive(Debug)]
enum ScanState {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment(u32),
    DollarQuoted(String),
}

/// Translate numbered placeholders (`$N` or `?N`) into the target style.
///
/// Quoted strings, comments, and dollar-quoted blocks are skipped via a
/// lightweight state machine; it may still miss edge cases in complex SQL.
/// The `Bare` target drops the ordinal, so parameters must already be bound
/// in ordinal order — templates written `$1, $2, ...` left to right satisfy
/// this. For dialect-specific SQL bodies, prefer backend-specific templates
/// over relying on translation.
///
/// Returns a borrowed `Cow` when no changes are needed.
#[must_use]
pub fn translate_placeholders(sql: &str, target: PlaceholderStyle, enabled: bool) -> Cow<'_, str> {
    if !enabled {
        return Cow::Borrowed(sql);
    }

    let bytes = sql.as_bytes();
    let mut out: Option<String> = None;
    // Start of the span not yet copied into `out`; placeholders only occur at
    // ASCII bytes so flush boundaries always land on char boundaries.
    let mut flushed = 0;
    let mut state = ScanState::Normal;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            ScanState::Normal => match b {
                b'\'' => state = ScanState::SingleQuoted,
                b'"' => state = ScanState::DoubleQuoted,
                b'-' if bytes.get(idx + 1) == Some(&b'-') => state = ScanState::LineComment,
                b'/' if bytes.get(idx + 1) == Some(&b'*') => {
                    state = ScanState::BlockComment(1);
                    idx += 1;
                }
                b'$' => {
                    if let Some((delim, end)) = scan_dollar_tag(sql, idx) {
                        state = ScanState::DollarQuoted(delim);
                        idx = end - 1;
                    } else if !matches!(target, PlaceholderStyle::Postgres)
                        && let Some((digits_end, digits)) = scan_digits(sql, idx + 1)
                    {
                        emit(&mut out, &mut flushed, sql, idx, digits_end, digits, target);
                        idx = digits_end - 1;
                    }
                }
                b'?' => {
                    if !matches!(target, PlaceholderStyle::Sqlite)
                        && let Some((digits_end, digits)) = scan_digits(sql, idx + 1)
                    {
                        emit(&mut out, &mut flushed, sql, idx, digits_end, digits, target);
                        idx = digits_end - 1;
                    }
                }
                _ => {}
            },
            ScanState::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1; // skip escaped quote
                    } else {
                        state = ScanState::Normal;
                    }
                }
            }
            ScanState::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        idx += 1; // skip escaped quote
                    } else {
                        state = ScanState::Normal;
                    }
                }
            }
            ScanState::LineComment => {
                if b == b'\n' {
                    state = ScanState::Normal;
                }
            }
            ScanState::BlockComment(depth) => {
                if b == b'/' && bytes.get(idx + 1) == Some(&b'*') {
                    state = ScanState::BlockComment(depth + 1);
                    idx += 1;
                } else if b == b'*' && bytes.get(idx + 1) == Some(&b'/') {
                    idx += 1;
                    state = if depth == 1 {
                        ScanState::Normal
                    } else {
                        ScanState::BlockComment(depth - 1)
                    };
                }
            }
            ScanState::DollarQuoted(ref delim) => {
                if b == b'$' && sql[idx..].starts_with(delim.as_str()) {
                    idx += delim.len() - 1;
                    state = ScanState::Normal;
                }
            }
        }
        idx += 1;
    }

    match out {
        Some(mut buf) => {
            buf.push_str(&sql[flushed..]);
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(sql),
    }
}

/// Copy everything up to `start`, then the placeholder rendered in `target`
/// style, and advance the flush cursor past the original placeholder.
fn emit(
    out: &mut Option<String>,
    flushed: &mut usize,
    sql: &str,
    start: usize,
    end: usize,
    digits: &str,
    target: PlaceholderStyle,
) {
    let buf = out.get_or_insert_with(|| String::with_capacity(sql.len()));
    buf.push_str(&sql[*flushed..start]);
    match target {
        PlaceholderStyle::Postgres => {
            buf.push('$');
            buf.push_str(digits);
        }
        PlaceholderStyle::Sqlite => {
            buf.push('?');
            buf.push_str(digits);
        }
        PlaceholderStyle::Bare => buf.push('?'),
    }
    *flushed = end;
}

/// Scan a run of ASCII digits starting at `start`; returns (end, digits).
fn scan_digits(sql: &str, start: usize) -> Option<(usize, &str)> {
    let bytes = sql.as_bytes();
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end > start {
        Some((end, &sql[start..end]))
    } else {
        None
    }
}

/// Detect a dollar-quote opener (`$$` or `$tag$`) at `start`; returns the
/// full delimiter and the index just past it.
fn scan_dollar_tag(sql: &str, start: usize) -> Option<(String, usize)> {
    let bytes = sql.as_bytes();
    let mut end = start + 1;
    while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'$' {
        // A tag starting with a digit would be a placeholder, not a quote
        if end > start + 1 && bytes[start + 1].is_ascii_digit() {
            return None;
        }
        Some((sql[start..=end].to_string(), end + 1))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_sqlite_to_postgres() {
        let sql = "select * from t where a = ?1 and b = ?2";
        let res = translate_placeholders(sql, PlaceholderStyle::Postgres, true);
        assert_eq!(res, "select * from t where a = $1 and b = $2");
    }

    #[test]
    fn translates_postgres_to_sqlite() {
        let sql = "insert into t values($1, $2)";
        let res = translate_placeholders(sql, PlaceholderStyle::Sqlite, true);
        assert_eq!(res, "insert into t values(?1, ?2)");
    }

    #[test]
    fn translates_numbered_to_bare() {
        let sql = "update t set a = $1, b = ?2 where c = $3";
        let res = translate_placeholders(sql, PlaceholderStyle::Bare, true);
        assert_eq!(res, "update t set a = ?, b = ? where c = ?");
    }

    #[test]
    fn skips_inside_literals_and_comments() {
        let sql = "select '?1', $1 -- $2\n/* ?3 */ from t where a = $1";
        let res = translate_placeholders(sql, PlaceholderStyle::Sqlite, true);
        assert_eq!(res, "select '?1', ?1 -- $2\n/* ?3 */ from t where a = ?1");
    }

    #[test]
    fn skips_dollar_quoted_blocks() {
        let sql = "$foo$ select $1 from t $foo$ where a = $1";
        let res = translate_placeholders(sql, PlaceholderStyle::Sqlite, true);
        assert_eq!(res, "$foo$ select $1 from t $foo$ where a = ?1");
    }

    #[test]
    fn bare_question_marks_pass_through() {
        let sql = "select * from t where a = ? and b = ?";
        let res = translate_placeholders(sql, PlaceholderStyle::Bare, true);
        assert!(matches!(res, Cow::Borrowed(_)));
    }

    #[test]
    fn respects_disabled_flag() {
        let sql = "select * from t where a = ?1";
        let res = translate_placeholders(sql, PlaceholderStyle::Postgres, false);
        assert!(matches!(res, Cow::Borrowed(_)));
        assert_eq!(res, sql);
    }

    #[test]
    fn nested_block_comments() {
        let sql = "/* outer /* $1 */ still comment */ select $2";
        let res = translate_placeholders(sql, PlaceholderStyle::Sqlite, true);
        assert_eq!(res, "/* outer /* $1 */ still comment */ select ?2");
    }
}
