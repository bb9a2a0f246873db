//! Collection policy: pruned directories and flagged code points.

/// Directories never walked: version control, editor and host metadata,
/// and build output.
pub const EXCLUDED_DIRS: &[&str] = &[
    ".git", ".svn", ".hg", ".obsidian", ".trash", ".vscode", ".idea", "dist", "build", "out",
    ".cache",
];

/// Directory that holds third-party packages.
pub const DEPENDENCY_DIR: &str = "node_modules";

/// Directories pruned once the walk is inside [`DEPENDENCY_DIR`].
pub const DEPENDENCY_EXCLUDED_DIRS: &[&str] = &[
    "test",
    "tests",
    "__tests__",
    "docs",
    "doc",
    "example",
    "examples",
    "benchmark",
    "benchmarks",
    ".github",
    "coverage",
];

/// Returns `true` if a directory named `name` is pruned.
#[must_use]
pub fn is_excluded_dir(name: &str, inside_dependency: bool) -> bool {
    EXCLUDED_DIRS.contains(&name) || (inside_dependency && DEPENDENCY_EXCLUDED_DIRS.contains(&name))
}

/// Returns `true` for invisible and bidirectional control code points.
#[must_use]
pub const fn is_flagged_char(c: char) -> bool {
    matches!(
        c,
        '\u{00AD}'
            | '\u{200B}'..='\u{200D}'
            | '\u{2060}'
            | '\u{FEFF}'
            | '\u{202A}'..='\u{202E}'
            | '\u{2066}'..='\u{2069}'
    )
}

/// Flagged code points in `text`, deduplicated in order of first
/// appearance. A leading byte order mark is allowed.
///
/// # Examples
///
/// ```
/// use vaultbuild_vfs::policy::flagged_code_points;
///
/// assert!(flagged_code_points("\u{FEFF}const a = 1;").is_empty());
/// assert_eq!(flagged_code_points("a\u{200B}b\u{200B}"), vec![0x200B]);
/// ```
#[must_use]
pub fn flagged_code_points(text: &str) -> Vec<u32> {
    let body = text.strip_prefix('\u{FEFF}').unwrap_or(text);
    let mut found = Vec::new();
    for c in body.chars().filter(|c| is_flagged_char(*c)) {
        let cp = u32::from(c);
        if !found.contains(&cp) {
            found.push(cp);
        }
    }
    found
}
