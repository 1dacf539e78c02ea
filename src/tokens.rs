use unic_ucd_category::GeneralCategory;

pub fn tokens_iter(s: &str) -> impl Iterator<Item = &str> {
    s.split(|c| !is_token_character(c)).filter(|t| !t.is_empty())
}

pub fn is_token_character(c: char) -> bool {
    let category = GeneralCategory::of(c);
    category.is_number() || category.is_letter() || category == GeneralCategory::PrivateUse
}

/// Whether `token` occurs in `text` as a whole word, ignoring case.
pub fn has_token(text: &str, token: &str) -> bool {
    tokens_iter(text).any(|t| t.to_lowercase() == token.to_lowercase())
}
