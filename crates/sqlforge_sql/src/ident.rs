//! Identifier folding.
//!
//! PostgreSQL folds unquoted identifiers to lower case and keeps quoted ones
//! verbatim. Names are compared after folding.

use sqlparser::ast::{Ident, ObjectName};

/// Fold a single identifier as written in SQL (`Foo` -> `foo`, `"Foo"` -> `Foo`)
#[must_use]
pub fn fold(raw: &str) -> String {
    let raw = raw.trim();
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        raw[1..raw.len() - 1].replace("\"\"", "\"")
    } else {
        raw.to_lowercase()
    }
}

/// Fold a parsed identifier
#[must_use]
pub fn fold_ident(ident: &Ident) -> String {
    if ident.quote_style.is_some() {
        ident.value.clone()
    } else {
        ident.value.to_lowercase()
    }
}

/// Split a possibly qualified name into folded parts
#[must_use]
pub fn fold_parts(raw: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for ch in raw.chars() {
        match ch {
            '"' => {
                quoted = !quoted;
                current.push(ch);
            }
            '.' if !quoted => parts.push(fold(&std::mem::take(&mut current))),
            _ => current.push(ch),
        }
    }
    parts.push(fold(&current));
    parts
}

/// Fold an object name into `(schema, name)`
#[must_use]
pub fn fold_object_name(name: &ObjectName) -> (Option<String>, String) {
    let mut parts = fold_parts(&name.to_string());
    let last = parts.pop().unwrap_or_default();
    (parts.pop(), last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold() {
        assert_eq!(fold("Authors"), "authors");
        assert_eq!(fold("\"Authors\""), "Authors");
        assert_eq!(fold("\"a\"\"b\""), "a\"b");
    }

    #[test]
    fn test_fold_parts() {
        assert_eq!(fold_parts("public.Authors"), vec!["public", "authors"]);
        assert_eq!(fold_parts("\"my.schema\".t"), vec!["my.schema", "t"]);
    }

    #[test]
    fn test_fold_ident() {
        assert_eq!(fold_ident(&Ident::new("ID")), "id");
        assert_eq!(fold_ident(&Ident::with_quote('"', "ID")), "ID");
    }
}
