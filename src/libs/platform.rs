//! Host platform naming used in metadata queries, asset matching and the
//! HTTP user agent.

use std::env::consts::{ARCH, OS};
use sysinfo::System;

/// Operating system name sent to metadata endpoints.
pub fn os_name() -> &'static str {
    match OS {
        "windows" => "win",
        "macos" => "macos",
        _ => "linux",
    }
}

/// Architecture name sent to metadata endpoints.
pub fn arch_name() -> &'static str {
    match ARCH {
        "x86_64" => "x86_64",
        "aarch64" => "aarch64",
        other => other,
    }
}

/// Accepted spellings of an OS inside release asset names.
pub fn os_aliases(os: &str) -> &'static [&'static str] {
    match os {
        "windows" | "win" => &["windows", "win64", "win32", "win"],
        "macos" | "darwin" => &["macos", "darwin", "osx", "mac"],
        _ => &["linux"],
    }
}

/// Accepted spellings of an architecture inside release asset names.
pub fn arch_aliases(arch: &str) -> &'static [&'static str] {
    match arch {
        "x86_64" | "amd64" | "x64" => &["x86_64", "x64", "amd64"],
        "aarch64" | "arm64" => &["aarch64", "arm64"],
        "x86" | "i686" => &["x86", "i686", "386"],
        _ => &[],
    }
}

/// Lowercase tokens of an asset name, split on `-`, `_`, `.` and spaces.
///
/// `x86` directly followed by `64` is kept as the single token `x86_64`, so the
/// 32-bit alias never matches a 64-bit build.
pub fn name_tokens(name: &str) -> Vec<String> {
    let parts: Vec<String> = name
        .to_lowercase()
        .split(['-', '_', '.', ' '])
        .filter(|part| !part.is_empty())
        .map(str::to_owned)
        .collect();

    let mut tokens = Vec::with_capacity(parts.len());
    let mut iter = parts.into_iter().peekable();
    while let Some(part) = iter.next() {
        if part == "x86" && iter.peek().map(String::as_str) == Some("64") {
            iter.next();
            tokens.push("x86_64".to_owned());
        } else {
            tokens.push(part);
        }
    }
    tokens
}

/// `true` when one of `aliases` is a whole token of `tokens`.
pub fn has_alias_token(tokens: &[String], aliases: &[&str]) -> bool {
    tokens.iter().any(|token| aliases.contains(&token.as_str()))
}

/// Candidate artifact extensions for the direct-download template, in probing order.
pub fn artifact_extensions(os: &str) -> &'static [&'static str] {
    match os {
        "windows" | "win" => &[".zip", ".exe"],
        "macos" | "darwin" => &[".tar.gz", ".zip", ".dmg"],
        _ => &[".tar.gz", ".zip", ".AppImage"],
    }
}

/// Artifacts that are platform installers rather than archives.
pub fn is_installer_executable(file_name: &str) -> bool {
    let lower = file_name.to_ascii_lowercase();
    [".exe", ".msi", ".dmg", ".pkg"].iter().any(|ext| lower.ends_with(ext))
}

/// `upkit/<version> (<os>; <os version>; <arch>)`.
pub fn build_user_agent(app_name: &str, version: &str) -> String {
    let os_version = System::long_os_version().unwrap_or_else(|| OS.to_string());
    format!("{}/{} ({}; {}; {})", app_name, version, OS, os_version, ARCH)
}
