//! Display-name derivation for tables and fields without stored labels.

/// Convert a single identifier from camelCase to snake_case.
/// e.g. "userId" -> "user_id", "createdAt" -> "created_at"
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Human label from an identifier: "first_name" -> "First Name", "orderItem" -> "Order Item".
pub fn to_label(s: &str) -> String {
    to_snake_case(s)
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// English plural of the last word of a label.
pub fn pluralize(label: &str) -> String {
    let lower = label.to_lowercase();
    if lower.is_empty() {
        return String::new();
    }
    if lower.ends_with('s') || lower.ends_with('x') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", label)
    } else if lower.ends_with('y')
        && !matches!(lower.chars().rev().nth(1), Some('a' | 'e' | 'i' | 'o' | 'u'))
    {
        format!("{}ies", &label[..label.len() - 1])
    } else {
        format!("{}s", label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_from_identifiers() {
        assert_eq!(to_label("first_name"), "First Name");
        assert_eq!(to_label("orderItem"), "Order Item");
        assert_eq!(to_label("id"), "Id");
        assert_eq!(to_label("_sys__x"), "Sys X");
    }

    #[test]
    fn plurals() {
        assert_eq!(pluralize("Todo"), "Todos");
        assert_eq!(pluralize("Category"), "Categories");
        assert_eq!(pluralize("Day"), "Days");
        assert_eq!(pluralize("Address"), "Addresses");
        assert_eq!(pluralize("Box"), "Boxes");
    }
}
