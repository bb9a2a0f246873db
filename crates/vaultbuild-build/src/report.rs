//! Diagnostic reports for failed builds.

use crate::context::BuildContext;
use crate::resolver::TraceEntry;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use vaultbuild_core::{BuildInitiator, BuildPhase, Error, ProjectDescriptor, Result};

/// Longest user-facing failure message, in characters.
pub const SHORT_MESSAGE_LIMIT: usize = 200;

const FULL_REPORT_HINT: &str = "(copy full diagnostics for details)";

/// Collected file as recorded in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDigest {
    /// Project-relative path
    pub path: String,
    /// Hash taken at collection
    pub hash: String,
    /// Size in bytes
    pub size: u64,
    /// Read failure, if the file could not be read
    pub read_error: Option<String>,
}

/// Dependency as recorded in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyDigest {
    /// Declared name
    pub name: String,
    /// Source URL
    pub url: String,
    /// Fetched size, if it was fetched
    pub bytes: Option<usize>,
}

/// Everything known about a failed build.
///
/// Reports are kept per project and replaced by the next failure.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    /// Build id
    pub build_id: String,
    /// Project settings at build time
    pub project: ProjectDescriptor,
    /// Who started the build
    pub initiator: BuildInitiator,
    /// Phase the build failed in
    pub phase: BuildPhase,
    /// When the build started
    pub created_at: DateTime<Utc>,
    /// Final error
    pub error: String,
    /// Final error followed by its causes
    pub cause_chain: Vec<String>,
    /// Collected files sorted by path
    pub files: Vec<FileDigest>,
    /// Declared dependencies
    pub dependencies: Vec<DependencyDigest>,
    /// Collection warnings
    pub collection_warnings: Vec<String>,
    /// Rendered engine errors
    pub engine_errors: Vec<String>,
    /// Rendered engine warnings
    pub engine_warnings: Vec<String>,
    /// Recorded resolver decisions
    pub resolution_trace: Vec<TraceEntry>,
}

impl DiagnosticReport {
    /// Captures `context` at the moment `error` ended the build.
    #[must_use]
    pub fn capture(context: &BuildContext, error: &Error) -> Self {
        let files = context
            .files()
            .sorted()
            .into_iter()
            .map(|asset| FileDigest {
                path: asset.path().to_string(),
                hash: asset.content_hash().to_string(),
                size: asset.size(),
                read_error: asset.read_error().map(str::to_string),
            })
            .collect();

        let dependencies = context
            .resolver()
            .map_or_else(|| context.dependencies().clone(), |resolver| resolver.dependencies());
        let dependencies = dependencies
            .names()
            .map(|(name, url)| DependencyDigest {
                name: name.to_string(),
                url: url.to_string(),
                bytes: dependencies.content(url).map(str::len),
            })
            .collect();

        Self {
            build_id: context.build_id().to_string(),
            project: context.project().clone(),
            initiator: context.initiator(),
            phase: context.phase(),
            created_at: context.created_at(),
            error: error.to_string(),
            cause_chain: error.cause_chain(),
            files,
            dependencies,
            collection_warnings: context
                .collection_warnings()
                .iter()
                .map(ToString::to_string)
                .collect(),
            engine_errors: context.engine_errors().to_vec(),
            engine_warnings: context.engine_warnings().to_vec(),
            resolution_trace: context.resolution_trace(),
        }
    }

    /// The failure cut to [`SHORT_MESSAGE_LIMIT`] characters, followed by a
    /// pointer to the full report.
    #[must_use]
    pub fn short_message(&self) -> String {
        truncate_message(&self.error)
    }

    /// Copyable plain-text form.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::from("vaultbuild diagnostic report\n");
        out.push_str(&format!("Build:     {}\n", self.build_id));
        out.push_str(&format!("Project:   {} ({})\n", self.project.id, self.project.name));
        out.push_str(&format!("Initiator: {}\n", self.initiator));
        out.push_str(&format!("Phase:     {}\n", self.phase));
        out.push_str(&format!(
            "Started:   {}\n",
            self.created_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));

        section(&mut out, "Error", self.cause_chain.iter().enumerate().map(|(depth, cause)| {
            if depth == 0 {
                cause.clone()
            } else {
                format!("caused by: {cause}")
            }
        }));
        let settings = serde_json::to_string_pretty(&self.project)
            .unwrap_or_else(|_| format!("{:#?}", self.project));
        section(&mut out, "Project settings", settings.lines().map(str::to_string));
        section(
            &mut out,
            &format!("Files ({})", self.files.len()),
            self.files.iter().map(|file| match &file.read_error {
                Some(err) => format!("{:<10} {} (unreadable: {err})", "-", file.path),
                None => format!("{:<10} {} {}", file.size, file.path, file.hash),
            }),
        );
        section(
            &mut out,
            &format!("Dependencies ({})", self.dependencies.len()),
            self.dependencies.iter().map(|dep| match dep.bytes {
                Some(bytes) => format!("{} = {} ({bytes} bytes)", dep.name, dep.url),
                None => format!("{} = {} (not fetched)", dep.name, dep.url),
            }),
        );
        section(&mut out, "Collection warnings", self.collection_warnings.iter().cloned());
        section(&mut out, "Engine errors", self.engine_errors.iter().cloned());
        section(&mut out, "Engine warnings", self.engine_warnings.iter().cloned());
        section(
            &mut out,
            "Resolution trace",
            self.resolution_trace.iter().map(ToString::to_string),
        );
        out
    }

    /// Pretty JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the report cannot be encoded.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Cuts `message` to its first line and [`SHORT_MESSAGE_LIMIT`] characters.
///
/// # Examples
///
/// ```
/// use vaultbuild_build::report::truncate_message;
///
/// let short = truncate_message(&"x".repeat(500));
/// assert!(short.len() < 300);
/// assert!(short.ends_with("(copy full diagnostics for details)"));
/// ```
#[must_use]
pub fn truncate_message(message: &str) -> String {
    let first_line = message.lines().next().unwrap_or_default();
    let mut short: String = first_line.chars().take(SHORT_MESSAGE_LIMIT).collect();
    if first_line.chars().count() > SHORT_MESSAGE_LIMIT {
        short.push_str("...");
    }
    format!("{short} {FULL_REPORT_HINT}")
}

fn section(out: &mut String, title: &str, lines: impl Iterator<Item = String>) {
    out.push('\n');
    out.push_str(title);
    out.push('\n');
    out.push_str(&"-".repeat(title.len()));
    out.push('\n');
    let mut empty = true;
    for line in lines {
        empty = false;
        out.push_str(&line);
        if !line.ends_with('\n') {
            out.push('\n');
        }
    }
    if empty {
        out.push_str("(none)\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultbuild_bridge::DependencySet;
    use vaultbuild_core::CancellationToken;
    use vaultbuild_vfs::{CollectionOutcome, CollectionWarning, VirtualFileAsset, VirtualFileMap};

    fn failed_context() -> BuildContext {
        let project = ProjectDescriptor::new("demo", "plugins/demo", "main.ts", "main.js")
            .with_dependency("preact", "https://cdn.test/preact.js");
        let mut context = BuildContext::new(project, BuildInitiator::User, CancellationToken::new());
        let mut files = VirtualFileMap::new();
        files.insert(VirtualFileAsset::new("main.ts", "x".into(), "blake3:abc".into()));
        files.insert(VirtualFileAsset::unreadable("locked.ts", "denied"));
        context.set_collection(CollectionOutcome {
            files,
            warnings: vec![CollectionWarning::ReadFailed {
                path: "locked.ts".into(),
                message: "denied".into(),
            }],
            total_bytes: 1,
        });
        let mut dependencies = DependencySet::default();
        dependencies.insert_name("preact", "https://cdn.test/preact.js");
        dependencies.insert_content("https://cdn.test/preact.js", "export {}");
        context.set_dependencies(dependencies);
        context.record_error("[ERROR] Could not resolve './x'\n".into());
        context
    }

    #[test]
    fn test_capture_records_context() {
        let context = failed_context();
        let inner = std::io::Error::other("disk full");
        let report = DiagnosticReport::capture(&context, &Error::io("plugins/demo/main.js", inner));

        assert_eq!(report.build_id, context.build_id().to_string());
        assert_eq!(report.files.len(), 2);
        assert_eq!(report.files[0].path, "locked.ts");
        assert_eq!(report.files[0].read_error.as_deref(), Some("denied"));
        assert_eq!(report.files[1].hash, "blake3:abc");
        assert_eq!(report.dependencies[0].bytes, Some(9));
        assert_eq!(report.cause_chain.len(), 2);
        assert_eq!(report.engine_errors.len(), 1);
    }

    #[test]
    fn test_render_has_every_section() {
        let report = DiagnosticReport::capture(&failed_context(), &Error::build("Engine produced no output"));
        let text = report.render();
        for heading in [
            "Error\n-----",
            "Project settings",
            "Files (2)",
            "Dependencies (1)",
            "Collection warnings",
            "Engine errors",
            "Engine warnings\n---------------\n(none)",
            "Resolution trace",
        ] {
            assert!(text.contains(heading), "missing {heading}");
        }
        assert!(text.contains("Build failed: Engine produced no output"));
        assert!(text.contains("preact = https://cdn.test/preact.js (9 bytes)"));
        assert!(text.contains("\"entry\": \"main.ts\""));
        assert!(report.to_json().unwrap().contains("\"phase\": \"preparing\""));
    }

    #[test]
    fn test_short_message_is_truncated() {
        let report = DiagnosticReport::capture(&failed_context(), &Error::build("y".repeat(400)));
        let short = report.short_message();
        assert!(short.chars().count() <= SHORT_MESSAGE_LIMIT + 3 + 1 + FULL_REPORT_HINT.len());
        assert!(short.ends_with(FULL_REPORT_HINT));
        assert!(short.contains("..."));

        let brief = truncate_message("first line\nsecond line");
        assert_eq!(brief, format!("first line {FULL_REPORT_HINT}"));
    }
}
