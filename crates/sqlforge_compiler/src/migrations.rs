//! Rollback section stripping for migration files.
//!
//! Migration tools keep the "down" half of a migration in the same file as
//! the "up" half. Only the up half describes the schema.

/// Line prefixes that start a rollback section
const ROLLBACK_MARKERS: &[&str] = &[
    "-- +goose Down",
    "-- +migrate Down",
    "-- migrate:down",
    "---- create above / drop below ----",
];

/// Return the part of `contents` before the first rollback marker.
///
/// The result is a prefix of the input, so byte offsets into it are also
/// valid offsets into the original text.
#[must_use]
pub fn remove_rollback_statements(contents: &str) -> &str {
    let mut offset = 0;
    for line in contents.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if ROLLBACK_MARKERS.iter().any(|m| trimmed.starts_with(m)) {
            return &contents[..offset];
        }
        offset += line.len();
    }
    contents
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_goose() {
        let text = "-- +goose Up\nCREATE TABLE a (id int);\n-- +goose Down\nDROP TABLE a;\n";
        assert_eq!(
            remove_rollback_statements(text),
            "-- +goose Up\nCREATE TABLE a (id int);\n"
        );
    }

    #[test]
    fn test_other_markers() {
        for marker in ["-- +migrate Down", "-- migrate:down", "---- create above / drop below ----"] {
            let text = format!("CREATE TABLE a (id int);\n{}\nDROP TABLE a;", marker);
            assert_eq!(remove_rollback_statements(&text), "CREATE TABLE a (id int);\n");
        }
    }

    #[test]
    fn test_no_marker() {
        let text = "CREATE TABLE a (id int);";
        assert_eq!(remove_rollback_statements(text), text);
    }
}
