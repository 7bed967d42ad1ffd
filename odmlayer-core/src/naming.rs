//! Naming rules for schemas and collections.
//!
//! A schema without an explicit alias publishes its collection under the
//! lowercased English plural of its name: `User` becomes `users`, `Category`
//! becomes `categories`, `user_profile` becomes `users_profile`.

use crate::error::SchemaError;

const UNCHANGED: &[&str] = &[
    "deer", "sheep", "swine", "trout", "cod", "grouse", "craft", "counsel", "works", "means",
    "bellows", "series", "mews", "species", "barracks", "headquarters", "gallows", "kennels",
    "fish", "information", "advice", "money", "news", "success", "furniture", "work", "fruit",
    "cream", "ink", "clothes", "goods", "contents", "sweepings", "odds", "greens", "shorts",
    "trousers", "jeans", "scissors", "pyjamas", "spectacles", "tights", "data", "media", "honey",
];

// Checked in order, as suffixes.
const IRREGULAR: &[(&str, &str)] = &[
    ("woman", "women"),
    ("ox", "oxen"),
    ("louse", "lice"),
    ("tooth", "teeth"),
    ("goose", "geese"),
    ("child", "children"),
    ("foot", "feet"),
    ("mouse", "mice"),
    ("man", "men"),
];

const O_TAKES_S: &[&str] = &["piano", "photo", "kilo"];
const F_TAKES_VES: &[&str] = &[
    "calf", "half", "knife", "leaf", "life", "loaf", "self", "sheaf", "shelf", "thief", "wife",
    "wolf",
];

fn is_vowel(c: char) -> bool {
    matches!(c, 'a' | 'e' | 'i' | 'o' | 'u')
}

/// Returns the lowercased plural form of `word`.
///
/// Only the first alphabetic run is pluralized when the word contains
/// underscores or digits.
pub fn plural(word: &str) -> String {
    let word = word.to_lowercase();

    if word.contains(|c: char| c == '_' || c.is_ascii_digit()) {
        let head = word
            .split(|c: char| c == '_' || c.is_ascii_digit())
            .find(|part| !part.is_empty())
            .unwrap_or_default();
        if head.is_empty() {
            return word;
        }
        return word.replacen(head, &plural(head), 1);
    }

    if UNCHANGED.contains(&word.as_str()) {
        return word;
    }

    for (singular, plural) in IRREGULAR {
        if let Some(stem) = word.strip_suffix(singular) {
            return format!("{stem}{plural}");
        }
    }

    let chars: Vec<char> = word.chars().collect();
    let last = chars.last().copied();
    let before = chars.len().checked_sub(2).map(|i| chars[i]);

    match (before, last) {
        (_, Some('s' | 'x' | 'z')) => format!("{word}es"),
        (Some(b), Some('h')) if !"aeioudgkprt".contains(b) => format!("{word}es"),
        (Some(b), Some('y')) if !is_vowel(b) || word.ends_with("quy") => {
            format!("{}ies", &word[..word.len() - 1])
        }
        (Some(b), Some('o')) if !is_vowel(b) && !O_TAKES_S.contains(&word.as_str()) => {
            format!("{word}es")
        }
        _ if word.ends_with('f') || word.ends_with("fe") => {
            if F_TAKES_VES.contains(&word.as_str()) {
                let stem = word.strip_suffix("fe").or_else(|| word.strip_suffix('f'));
                format!("{}ves", stem.unwrap_or(&word))
            } else {
                format!("{word}s")
            }
        }
        _ => format!("{word}s"),
    }
}

/// Field names can not contain a double underscore.
pub(crate) fn check_field_name(field: &str, schema: &str) -> Result<(), SchemaError> {
    if field.contains("__") {
        return Err(SchemaError::field_naming(field, schema));
    }
    Ok(())
}

/// Collection aliases can not start with an underscore.
pub(crate) fn check_alias(alias: &str, schema: &str) -> Result<(), SchemaError> {
    if alias.starts_with('_') {
        return Err(SchemaError::metadata_naming("Alias", alias, schema));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regular_plurals() {
        assert_eq!(plural("User"), "users");
        assert_eq!(plural("fax"), "faxes");
        // Suffix exceptions are checked before the regular rules.
        assert_eq!(plural("box"), "boxen");
        assert_eq!(plural("Church"), "churches");
        assert_eq!(plural("category"), "categories");
        assert_eq!(plural("day"), "days");
        assert_eq!(plural("hero"), "heroes");
        assert_eq!(plural("photo"), "photos");
        assert_eq!(plural("roof"), "roofs");
        assert_eq!(plural("knife"), "knives");
        assert_eq!(plural("wolf"), "wolves");
    }

    #[test]
    fn test_irregular_and_unchanged() {
        assert_eq!(plural("Woman"), "women");
        assert_eq!(plural("child"), "children");
        assert_eq!(plural("sheep"), "sheep");
        assert_eq!(plural("data"), "data");
    }

    #[test]
    fn test_only_first_run_is_pluralized() {
        assert_eq!(plural("user_profile"), "users_profile");
        assert_eq!(plural("item2"), "items2");
    }

    #[test]
    fn test_name_checks() {
        assert!(check_field_name("first_name", "User").is_ok());
        assert!(matches!(
            check_field_name("first__name", "User"),
            Err(SchemaError::FieldNaming { .. })
        ));
        assert!(check_alias("people", "User").is_ok());
        assert!(matches!(
            check_alias("_people", "User"),
            Err(SchemaError::MetadataNaming { .. })
        ));
    }
}
