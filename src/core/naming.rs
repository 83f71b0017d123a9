//! Naming conventions mapping path words to operation names

/// Uppercase the first character
pub fn ucfirst(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Lowercase the first character
pub fn lcfirst(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Join space separated words in camel case: `get friend list` → `getFriendList`
pub fn camel_case(words: &str) -> String {
    let mut parts = words.split_whitespace();
    let mut out = parts.next().map(lcfirst).unwrap_or_default();
    for part in parts {
        out.push_str(&ucfirst(part));
    }
    out
}

/// `friend-list` / `friend_list` → `getFriendList`
pub fn getter_name(word: &str) -> String {
    camel_case(&format!("get {}", word.replace(['-', '_'], " ")))
}

/// `prefixed("create", "session")` → `createSession`
pub fn prefixed(prefix: &str, word: &str) -> String {
    format!("{}{}", prefix, ucfirst(word))
}

/// `status` → `setStatusSpecifications`
pub fn specifications_setter_name(word: &str) -> String {
    format!("set{}Specifications", ucfirst(word))
}
