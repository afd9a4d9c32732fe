use std::collections::BTreeMap;

/// Substitute `{placeholder}` tokens in a prompt template. Placeholders are
/// declared by the template itself: any `{lower_snake_case}` run is treated
/// as one, and an unresolvable placeholder is an error naming it. Brace
/// runs that do not match the token shape (JSON examples, quoted keys)
/// pass through untouched.
pub fn render_template(
    template: &str,
    values: &BTreeMap<String, String>,
) -> Result<String, String> {
    let mut rendered = String::with_capacity(template.len());
    let mut cursor = template;

    while let Some(start) = cursor.find('{') {
        rendered.push_str(&cursor[..start]);
        let after_open = &cursor[start + 1..];
        match after_open.find('}') {
            Some(close) if is_placeholder_token(&after_open[..close]) => {
                let token = &after_open[..close];
                match values.get(token) {
                    Some(value) => rendered.push_str(value),
                    None => return Err(token.to_string()),
                }
                cursor = &after_open[close + 1..];
            }
            _ => {
                rendered.push('{');
                cursor = after_open;
            }
        }
    }

    rendered.push_str(cursor);
    Ok(rendered)
}

fn is_placeholder_token(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() || first == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_')
}
