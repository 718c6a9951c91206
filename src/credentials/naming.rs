//! Deterministic credential-name derivation.
//!
//! Names key the `[oauth.*]` sections of the secrets file, so they must be
//! valid bare TOML keys and stable across runs for the same provider and
//! identifier.

/// Sanitizes an identifier for use as part of a TOML key.
///
/// Every character outside `[A-Za-z0-9_-]` becomes `_`, runs of `_`
/// collapse to one, leading/trailing `_` are stripped, and the result is
/// lowercased. Pure and total; applying it twice is a no-op.
pub fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        let ch = if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            ch.to_ascii_lowercase()
        } else {
            '_'
        };
        if ch == '_' && out.ends_with('_') {
            continue;
        }
        out.push(ch);
    }
    out.trim_matches('_').to_string()
}

/// Derives the storage key for a credential from its provider tag and
/// provider-scoped identifier, e.g.
/// `generate_name("google", "alice@example.com") == "google_alice_example_com"`.
///
/// A degenerate (empty) identifier yields `"<provider>_"`; avoiding
/// collisions on such inputs is the caller's concern.
pub fn generate_name(provider: &str, identifier: &str) -> String {
    format!("{}_{}", provider, sanitize(identifier))
}
