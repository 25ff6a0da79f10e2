//! Token estimation for usage accounting.

/// Rough token estimate from raw text: 1 token ≈ 4 characters of English
/// prose, plus a small fixed per-call overhead.
///
/// This is an approximate cost proxy for the usage counter, never a
/// billing-accurate figure; exact counts come from the provider's
/// reported usage when available.
pub fn estimate_tokens(text: &str) -> u64 {
    if text.is_empty() {
        return 0;
    }
    let chars = text.chars().count() as u64;
    chars.div_ceil(4) + 5
}
