//! Bundle persistence.

use std::fmt;
use std::sync::Arc;
use vaultbuild_core::{Error, HostStorage, ProjectDescriptor, Result, path};

const MAP_COMMENT: &str = "//# sourceMappingURL=";

/// Paths written by one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenOutput {
    /// Storage path of the bundle
    pub output_path: String,
    /// Storage path of the external source map, if one was written
    pub map_path: Option<String>,
}

/// Writes a bundle, and optionally its source map, into host storage.
///
/// The output path must stay inside the project root. A project rooted at
/// the storage root may write anywhere below it.
pub struct OutputWriter {
    storage: Arc<dyn HostStorage>,
}

impl OutputWriter {
    /// Creates a writer.
    #[must_use]
    pub fn new(storage: Arc<dyn HostStorage>) -> Self {
        Self { storage }
    }

    /// Writes `code` to the project's output path.
    ///
    /// With a `source_map` the map is written next to the bundle as
    /// `<output>.map` and the bundle's trailing `sourceMappingURL` comment
    /// is pointed at it.
    ///
    /// # Errors
    ///
    /// - [`Error::SecurityViolation`] if the output escapes the project root
    /// - [`Error::FileSystem`] if a write fails
    pub async fn write(
        &self,
        project: &ProjectDescriptor,
        code: &str,
        source_map: Option<&str>,
    ) -> Result<WrittenOutput> {
        let output_path = contained_output(project)?;

        let Some(map) = source_map else {
            self.storage.write(&output_path, code).await?;
            tracing::info!(project = %project.id, path = %output_path, bytes = code.len(), "Bundle written");
            return Ok(WrittenOutput {
                output_path,
                map_path: None,
            });
        };

        let map_path = format!("{output_path}.map");
        let code = point_at_map(code, &format!("{}.map", path::file_name(&output_path)));
        self.storage.write(&map_path, map).await?;
        self.storage.write(&output_path, &code).await?;
        tracing::info!(project = %project.id, path = %output_path, map = %map_path, bytes = code.len(), "Bundle and source map written");
        Ok(WrittenOutput {
            output_path,
            map_path: Some(map_path),
        })
    }
}

impl fmt::Debug for OutputWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputWriter").finish_non_exhaustive()
    }
}

/// Storage path of the project's output, checked against its root.
fn contained_output(project: &ProjectDescriptor) -> Result<String> {
    let root = project.root_path();
    let output = project.output_path();
    if path::is_absolute_like(&project.output)
        || path::is_absolute_like(&project.root)
        || !path::is_within(&root, &output)
    {
        tracing::warn!(project = %project.id, root = %root, output = %output, "Output path escapes the project root");
        return Err(Error::SecurityViolation {
            reason: format!(
                "Output '{}' resolves to '{output}', outside project root '{root}'",
                project.output
            ),
        });
    }
    Ok(output)
}

/// Replaces the last `sourceMappingURL` comment, or appends one.
fn point_at_map(code: &str, map_name: &str) -> String {
    let comment = format!("{MAP_COMMENT}{map_name}");
    let mut lines: Vec<&str> = code.lines().collect();
    if let Some(index) = lines
        .iter()
        .rposition(|line| line.trim_start().starts_with(MAP_COMMENT))
    {
        lines[index] = &comment;
        let mut rewritten = lines.join("\n");
        if code.ends_with('\n') {
            rewritten.push('\n');
        }
        return rewritten;
    }
    let separator = if code.is_empty() || code.ends_with('\n') {
        ""
    } else {
        "\n"
    };
    format!("{code}{separator}{comment}\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultbuild_core::MemoryStorage;

    fn writer() -> (Arc<MemoryStorage>, OutputWriter) {
        let storage = Arc::new(MemoryStorage::new());
        (storage.clone(), OutputWriter::new(storage))
    }

    /// Skips `ProjectDescriptor::validate` so escaping paths reach the writer.
    fn project(root: &str, output: &str) -> ProjectDescriptor {
        let mut project = ProjectDescriptor::new("p", root, "main.ts", "main.js");
        project.output = output.to_string();
        project
    }

    #[tokio::test]
    async fn test_writes_bundle_inside_root() {
        let (storage, writer) = writer();
        let written = writer
            .write(&project("plugins/demo", "dist/main.js"), "code", None)
            .await
            .unwrap();
        assert_eq!(written.output_path, "plugins/demo/dist/main.js");
        assert!(written.map_path.is_none());
        assert_eq!(storage.read("plugins/demo/dist/main.js").await.unwrap(), "code");
    }

    #[tokio::test]
    async fn test_escaping_outputs_are_security_errors() {
        let (storage, writer) = writer();
        for output in [
            "../main.js",
            "dist/../../main.js",
            "./../../x/main.js",
            "/etc/main.js",
            "C:/main.js",
            "\\\\server\\share\\main.js",
        ] {
            let err = writer
                .write(&project("plugins/demo", output), "code", None)
                .await
                .unwrap_err();
            assert!(err.is_security_error(), "{output} was accepted");
        }
        assert_eq!(storage.file_count(), 0);
    }

    #[tokio::test]
    async fn test_root_project_cannot_climb_out() {
        let (_, writer) = writer();
        assert!(writer.write(&project(".", "out/main.js"), "c", None).await.is_ok());
        let err = writer
            .write(&project(".", "../main.js"), "c", None)
            .await
            .unwrap_err();
        assert!(err.is_security_error());
    }

    #[tokio::test]
    async fn test_external_map_written_next_to_bundle() {
        let (storage, writer) = writer();
        let code = "let a;\n//# sourceMappingURL=stale.js.map\n";
        let written = writer
            .write(&project("p", "main.js"), code, Some("{\"version\":3}"))
            .await
            .unwrap();
        assert_eq!(written.map_path.as_deref(), Some("p/main.js.map"));
        assert_eq!(
            storage.read("p/main.js").await.unwrap(),
            "let a;\n//# sourceMappingURL=main.js.map\n"
        );
        assert_eq!(storage.read("p/main.js.map").await.unwrap(), "{\"version\":3}");
    }

    #[test]
    fn test_map_comment_appended_when_missing() {
        assert_eq!(
            point_at_map("let a;", "main.js.map"),
            "let a;\n//# sourceMappingURL=main.js.map\n"
        );
        assert_eq!(
            point_at_map("let a;\n", "main.js.map"),
            "let a;\n//# sourceMappingURL=main.js.map\n"
        );
    }
}
