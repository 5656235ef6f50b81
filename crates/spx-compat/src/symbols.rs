/// Caller-facing routine name: trimmed, lower-case, without the `_c` export suffix.
pub fn canonical_symbol(name: &str) -> String {
    let sanitized = sanitize_symbol(name).to_ascii_lowercase();
    match sanitized.strip_suffix("_c") {
        Some(base) if !base.is_empty() => base.to_string(),
        _ => sanitized,
    }
}

/// Exported name of a routine in the native library.
pub fn native_symbol(name: &str) -> String {
    format!("{}_c", canonical_symbol(name))
}

fn sanitize_symbol(name: &str) -> String {
    name.trim()
        .trim_end_matches('\0')
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
        .collect()
}
