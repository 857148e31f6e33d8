//! Entity key normalization (uppercase, Polish diacritics folded).

use super::EntityKind;

/// Fold an uppercase Polish letter to its ASCII base letter.
fn fold_char(c: char) -> char {
    match c {
        'Ą' => 'A',
        'Ć' => 'C',
        'Ę' => 'E',
        'Ł' => 'L',
        'Ń' => 'N',
        'Ó' => 'O',
        'Ś' => 'S',
        'Ź' | 'Ż' => 'Z',
        other => other,
    }
}

fn fold_upper(raw: &str) -> String {
    raw.to_uppercase().chars().map(fold_char).collect()
}

/// Normalize a raw name into the key used for frontier bookkeeping.
///
/// People keep only their first whitespace-delimited token; places keep the
/// full (trimmed) name. Empty input yields an empty key, which callers must
/// not enqueue.
pub fn normalize(raw: &str, kind: EntityKind) -> String {
    match kind {
        EntityKind::Person => raw
            .split_whitespace()
            .next()
            .map(fold_upper)
            .unwrap_or_default(),
        EntityKind::Place => fold_upper(raw.trim()),
    }
}

/// Shorthand for `normalize(raw, EntityKind::Person)`.
pub fn normalize_person(raw: &str) -> String {
    normalize(raw, EntityKind::Person)
}

/// Shorthand for `normalize(raw, EntityKind::Place)`.
pub fn normalize_place(raw: &str) -> String {
    normalize(raw, EntityKind::Place)
}
