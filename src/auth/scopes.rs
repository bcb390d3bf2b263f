//! OAuth2-style scopes: `read_<family>` and `write_<family>`.

/// Split a space-separated scope string, dropping blanks and repeats.
pub fn parse_scopes(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for s in raw.split_whitespace() {
        if !out.iter().any(|o| o == s) {
            out.push(s.to_string());
        }
    }
    out
}

/// Requested scopes the account is permitted to hold, in request order.
/// Anything else is dropped silently.
pub fn mask_scopes(requested: &[String], permitted: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for s in requested {
        if permitted.contains(s) && !out.contains(s) {
            out.push(s.clone());
        }
    }
    out
}
