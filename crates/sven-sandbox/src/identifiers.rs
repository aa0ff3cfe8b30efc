// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Identifier and description sanitization for synthesized workspace source.

/// Turn an arbitrary server or tool name into a valid, camelCase identifier
/// segment: lowercase, strip everything but `[a-z0-9_]`, capitalize the
/// letter following each dropped run, and prefix an underscore if the
/// result would otherwise start with a digit.
pub fn sanitize_identifier(raw: &str) -> String {
    let mut out = String::new();
    let mut capitalize_next = false;
    for ch in raw.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            if capitalize_next {
                out.extend(ch.to_uppercase());
                capitalize_next = false;
            } else {
                out.push(ch);
            }
        } else {
            capitalize_next = true;
        }
    }
    if out.is_empty() {
        out.push('_');
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Strip everything outside the 7-bit ASCII range from a tool/parameter
/// description before it is embedded in generated source.
pub fn sanitize_ascii(raw: &str) -> String {
    raw.chars().filter(char::is_ascii).collect()
}
