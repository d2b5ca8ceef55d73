//! String-case conversion between the identifier styles that show up at
//! config/wire boundaries (slot and param names are typically `PascalCase`
//! or `camelCase`; cache bucket keys and file names favour `snake_case`).
//!
//! No case-conversion crate appears anywhere in this framework's dependency
//! stack, so this is implemented directly rather than pulled in.

/// Converts `PascalCase`/`camelCase`/`kebab-case` into `snake_case`.
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    let mut prev_lower = false;
    for ch in s.chars() {
        if ch == '-' || ch == ' ' {
            out.push('_');
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
            prev_lower = false;
        } else {
            out.push(ch);
            prev_lower = ch.is_alphanumeric();
        }
    }
    out
}

/// Converts `snake_case`/`kebab-case` into `PascalCase`.
pub fn to_pascal_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut capitalize_next = true;
    for ch in s.chars() {
        if ch == '_' || ch == '-' {
            capitalize_next = true;
            continue;
        }
        if capitalize_next {
            out.extend(ch.to_uppercase());
            capitalize_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Converts `snake_case`/`PascalCase`/`kebab-case` into `camelCase`.
pub fn to_camel_case(s: &str) -> String {
    let pascal = to_pascal_case(s);
    let mut chars = pascal.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pascal_to_snake() {
        assert_eq!(to_snake_case("UserLoginSlot"), "user_login_slot");
    }

    #[test]
    fn camel_to_snake() {
        assert_eq!(to_snake_case("userLoginSlot"), "user_login_slot");
    }

    #[test]
    fn snake_to_pascal() {
        assert_eq!(to_pascal_case("user_login_slot"), "UserLoginSlot");
    }

    #[test]
    fn kebab_to_camel() {
        assert_eq!(to_camel_case("user-login-slot"), "userLoginSlot");
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(to_snake_case(""), "");
        assert_eq!(to_pascal_case(""), "");
        assert_eq!(to_camel_case(""), "");
    }
}
