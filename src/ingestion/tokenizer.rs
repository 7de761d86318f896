//! Row Tokenizer - splits one CSV line into raw fields

/// Split a single line on commas that are not inside double quotes.
///
/// Quotes only toggle the in-quotes state and are dropped from the output;
/// doubled quotes are not treated as escapes. An unterminated quote keeps the
/// rest of the line in one field. Always returns at least one field.
pub fn tokenize_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in line.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    fields.push(current);

    fields
}
