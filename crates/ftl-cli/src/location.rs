/// 1-based line and column of a byte offset, for human-facing messages.
///
/// Columns count characters, not bytes. Returns `None` when `offset` is past
/// the end of `source` or not on a character boundary.
pub fn line_col(source: &str, offset: usize) -> Option<(usize, usize)> {
    let before = source.get(..offset)?;
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    let column = before[line_start..].chars().count() + 1;
    Some((line, column))
}
