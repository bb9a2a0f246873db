//! Project asset collection.
//!
//! Walks a project root breadth-first, reads every file whose extension the
//! project resolves, and captures it into a [`VirtualFileMap`] together with
//! its digest.

use crate::policy::{self, DEPENDENCY_DIR};
use crate::types::{CollectionWarning, VirtualFileAsset, VirtualFileMap};
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use vaultbuild_core::{
    BuildSettings, CancellationToken, ContentHasher, Error, HostStorage, ProjectDescriptor,
    Result, path,
};

/// Size limits applied during collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionLimits {
    /// Files above this size produce a warning
    pub max_file_size: u64,
    /// Collection fails once the running total exceeds this
    pub max_total_size: u64,
}

impl Default for CollectionLimits {
    fn default() -> Self {
        Self::from(&BuildSettings::default())
    }
}

impl From<&BuildSettings> for CollectionLimits {
    fn from(settings: &BuildSettings) -> Self {
        Self {
            max_file_size: settings.max_file_size,
            max_total_size: settings.max_total_size,
        }
    }
}

/// Result of a collection run.
#[derive(Debug, Clone, Default)]
pub struct CollectionOutcome {
    /// Collected files
    pub files: VirtualFileMap,
    /// Non-fatal findings
    pub warnings: Vec<CollectionWarning>,
    /// Bytes read
    pub total_bytes: u64,
}

/// Reads a project's files from host storage into memory.
pub struct AssetCollector {
    storage: Arc<dyn HostStorage>,
    hasher: Arc<ContentHasher>,
    limits: CollectionLimits,
}

impl AssetCollector {
    /// Creates a collector.
    #[must_use]
    pub fn new(
        storage: Arc<dyn HostStorage>,
        hasher: Arc<ContentHasher>,
        limits: CollectionLimits,
    ) -> Self {
        Self {
            storage,
            hasher,
            limits,
        }
    }

    /// Collects the project's files.
    ///
    /// The three project paths are validated before storage is touched.
    /// Unreadable files are recorded with their error and a warning, except
    /// the entry point, whose failure aborts collection.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if a project path is unsafe
    /// - [`Error::BuildProcess`] if the entry point cannot be read or the
    ///   total size cap is exceeded
    /// - [`Error::FileSystem`] if a directory cannot be listed
    /// - [`Error::BuildCancelled`] if `cancel` is set between reads
    pub async fn collect(
        &self,
        project: &ProjectDescriptor,
        cancel: &CancellationToken,
    ) -> Result<CollectionOutcome> {
        project.validate()?;

        let root = project.root_path();
        let entry = path::normalize(&project.entry);
        let extensions = project.compiler.collected_extensions();

        let mut candidates = self.walk(&root, &extensions, cancel).await?;
        if !candidates.iter().any(|candidate| *candidate == entry) {
            candidates.push(entry.clone());
        }

        let mut outcome = CollectionOutcome::default();
        for relative in candidates {
            cancel.check()?;
            let storage_path = path::join(&root, &relative);
            let content = match self.storage.read(&storage_path).await {
                Ok(content) => content,
                Err(err) if relative == entry => {
                    return Err(Error::BuildProcess {
                        message: format!("Failed to read entry point '{storage_path}'"),
                        source: Some(Box::new(err)),
                    });
                }
                Err(err) => {
                    tracing::warn!(path = %storage_path, error = %err, "Skipping unreadable file");
                    outcome.warnings.push(CollectionWarning::ReadFailed {
                        path: relative.clone(),
                        message: err.to_string(),
                    });
                    outcome
                        .files
                        .insert(VirtualFileAsset::unreadable(relative, err.to_string()));
                    continue;
                }
            };

            let size = content.len() as u64;
            outcome.total_bytes += size;
            if outcome.total_bytes > self.limits.max_total_size {
                return Err(Error::build(format!(
                    "Project '{}' exceeds the {} byte size limit",
                    project.id, self.limits.max_total_size
                )));
            }
            if size > self.limits.max_file_size {
                outcome.warnings.push(CollectionWarning::OversizeFile {
                    path: relative.clone(),
                    size,
                    limit: self.limits.max_file_size,
                });
            }
            let flagged = policy::flagged_code_points(&content);
            if !flagged.is_empty() {
                outcome.warnings.push(CollectionWarning::SuspiciousCharacters {
                    path: relative.clone(),
                    code_points: flagged,
                });
            }

            let digest = self.hasher.hash_str(&content);
            outcome
                .files
                .insert(VirtualFileAsset::new(relative, content, digest));
        }

        for warning in &outcome.warnings {
            tracing::warn!(project = %project.id, "{warning}");
        }
        tracing::debug!(
            project = %project.id,
            files = outcome.files.len(),
            bytes = outcome.total_bytes,
            "Collected project assets"
        );
        Ok(outcome)
    }

    /// Breadth-first walk returning project-relative file paths in visit
    /// order.
    async fn walk(
        &self,
        root: &str,
        extensions: &BTreeSet<String>,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let mut files = Vec::new();
        let mut pending = VecDeque::from([(path::ROOT.to_string(), false)]);

        while let Some((relative_dir, inside_dependency)) = pending.pop_front() {
            cancel.check()?;
            let entries = self.storage.list(&path::join(root, &relative_dir)).await?;
            for entry in entries {
                let relative = path::join(&relative_dir, &entry.name);
                if entry.is_dir {
                    if policy::is_excluded_dir(&entry.name, inside_dependency) {
                        tracing::trace!(path = %relative, "Pruned directory");
                        continue;
                    }
                    pending.push_back((relative, inside_dependency || entry.name == DEPENDENCY_DIR));
                } else if path::extension(&entry.name).is_some_and(|ext| extensions.contains(&ext)) {
                    files.push(relative);
                }
            }
        }
        Ok(files)
    }
}

impl fmt::Debug for AssetCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetCollector")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}
