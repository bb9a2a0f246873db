//! Registered projects.
//!
//! Mutations run one at a time on a [`SerializedQueue`] so that concurrent
//! add/update/remove calls and their persistence never interleave.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, PoisonError};
use vaultbuild_core::{Error, ProjectDescriptor, ProjectId, Result, SerializedQueue, SettingsStore};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredProjects {
    #[serde(default)]
    projects: Vec<ProjectDescriptor>,
}

type ProjectMap = Arc<RwLock<BTreeMap<ProjectId, ProjectDescriptor>>>;

/// Project list, optionally persisted through a [`SettingsStore`].
///
/// # Examples
///
/// ```
/// use vaultbuild_build::ProjectRegistry;
/// use vaultbuild_core::{ProjectDescriptor, ProjectId};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> vaultbuild_core::Result<()> {
/// let registry = ProjectRegistry::new();
/// registry.add(ProjectDescriptor::new("demo", "demo", "main.ts", "main.js")).await?;
/// assert!(registry.get(&ProjectId::new("demo")).is_some());
/// # Ok(())
/// # }
/// ```
pub struct ProjectRegistry {
    projects: ProjectMap,
    queue: SerializedQueue<bool>,
    store: Option<Arc<dyn SettingsStore>>,
}

impl ProjectRegistry {
    /// An empty, unpersisted registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            projects: Arc::default(),
            queue: SerializedQueue::new("projects", 1),
            store: None,
        }
    }

    /// A registry loaded from `store` and saved back after every mutation.
    ///
    /// Stored projects that no longer validate are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or its value is not a
    /// project list.
    pub async fn load(store: Arc<dyn SettingsStore>) -> Result<Self> {
        let stored: StoredProjects = match store.load().await? {
            Some(value) => serde_json::from_value(value)?,
            None => StoredProjects::default(),
        };
        let mut projects = BTreeMap::new();
        for project in stored.projects {
            if let Err(err) = project.validate() {
                tracing::warn!(project = %project.id, error = %err, "Skipping invalid stored project");
                continue;
            }
            projects.insert(project.id.clone(), project);
        }
        tracing::debug!(count = projects.len(), "Projects loaded");
        Ok(Self {
            projects: Arc::new(RwLock::new(projects)),
            store: Some(store),
            ..Self::new()
        })
    }

    /// Looks up a project.
    #[must_use]
    pub fn get(&self, id: &ProjectId) -> Option<ProjectDescriptor> {
        read(&self.projects).get(id).cloned()
    }

    /// All projects, sorted by id.
    #[must_use]
    pub fn list(&self) -> Vec<ProjectDescriptor> {
        read(&self.projects).values().cloned().collect()
    }

    /// Number of projects.
    #[must_use]
    pub fn len(&self) -> usize {
        read(&self.projects).len()
    }

    /// Whether no project is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        read(&self.projects).is_empty()
    }

    /// Registers a new project.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if the project is invalid or its id is taken
    /// - the store's error if persisting fails; the registry is unchanged
    pub async fn add(&self, project: ProjectDescriptor) -> Result<()> {
        project.validate()?;
        self.mutate(move |projects| {
            if projects.contains_key(&project.id) {
                return Err(Error::Validation {
                    field: "id".to_string(),
                    reason: format!("Project '{}' already exists", project.id),
                });
            }
            projects.insert(project.id.clone(), project);
            Ok(true)
        })
        .await
        .map(drop)
    }

    /// Replaces an existing project.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if the project is invalid or unknown
    /// - the store's error if persisting fails; the registry is unchanged
    pub async fn update(&self, project: ProjectDescriptor) -> Result<()> {
        project.validate()?;
        self.mutate(move |projects| {
            let Some(slot) = projects.get_mut(&project.id) else {
                return Err(unknown(&project.id));
            };
            *slot = project;
            Ok(true)
        })
        .await
        .map(drop)
    }

    /// Removes a project, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns the store's error if persisting fails.
    pub async fn remove(&self, id: &ProjectId) -> Result<bool> {
        let id = id.clone();
        self.mutate(move |projects| Ok(projects.remove(&id).is_some()))
            .await
    }

    /// Rejects further mutations.
    pub async fn shutdown(&self) {
        self.queue.shutdown();
        self.queue.wait_idle().await;
    }

    /// Applies `change` to a copy of the map, persists the copy when it
    /// changed, then publishes it.
    async fn mutate<F>(&self, change: F) -> Result<bool>
    where
        F: FnOnce(&mut BTreeMap<ProjectId, ProjectDescriptor>) -> Result<bool> + Send + 'static,
    {
        let projects = Arc::clone(&self.projects);
        let store = self.store.clone();
        self.queue
            .enqueue(move || async move {
                let mut next = read(&projects).clone();
                let changed = change(&mut next)?;
                if !changed {
                    return Ok(false);
                }
                if let Some(store) = store {
                    let stored = StoredProjects {
                        projects: next.values().cloned().collect(),
                    };
                    store.save(serde_json::to_value(&stored)?).await?;
                }
                *write(&projects) = next;
                Ok(true)
            })
            .await
    }
}

impl Default for ProjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProjectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectRegistry")
            .field("projects", &self.len())
            .field("persisted", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

/// Error for an id with no registered project.
#[must_use]
pub fn unknown(id: &ProjectId) -> Error {
    Error::Validation {
        field: "project".to_string(),
        reason: format!("Unknown project '{id}'"),
    }
}

fn read(
    projects: &RwLock<BTreeMap<ProjectId, ProjectDescriptor>>,
) -> RwLockReadGuard<'_, BTreeMap<ProjectId, ProjectDescriptor>> {
    projects.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(
    projects: &RwLock<BTreeMap<ProjectId, ProjectDescriptor>>,
) -> RwLockWriteGuard<'_, BTreeMap<ProjectId, ProjectDescriptor>> {
    projects.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use vaultbuild_core::MemorySettings;

    fn project(id: &str) -> ProjectDescriptor {
        ProjectDescriptor::new(id, id, "main.ts", "main.js")
    }

    struct BrokenStore;

    #[async_trait]
    impl SettingsStore for BrokenStore {
        async fn load(&self) -> Result<Option<serde_json::Value>> {
            Ok(None)
        }

        async fn save(&self, _value: serde_json::Value) -> Result<()> {
            Err(Error::io("settings.json", std::io::Error::other("read-only")))
        }
    }

    #[tokio::test]
    async fn test_add_rejects_duplicates_and_invalid_projects() {
        let registry = ProjectRegistry::new();
        registry.add(project("a")).await.unwrap();
        let err = registry.add(project("a")).await.unwrap_err();
        assert!(err.is_validation_error());
        assert!(err.to_string().contains("already exists"));

        let mut bad = project("b");
        bad.entry = "../escape.ts".into();
        assert!(registry.add(bad).await.unwrap_err().is_validation_error());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_update_and_remove() {
        let registry = ProjectRegistry::new();
        assert!(registry.update(project("a")).await.unwrap_err().is_validation_error());

        registry.add(project("a")).await.unwrap();
        let mut renamed = project("a");
        renamed.name = "Renamed".into();
        registry.update(renamed).await.unwrap();
        assert_eq!(registry.get(&ProjectId::new("a")).unwrap().name, "Renamed");

        assert!(registry.remove(&ProjectId::new("a")).await.unwrap());
        assert!(!registry.remove(&ProjectId::new("a")).await.unwrap());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_mutations_persist_and_reload() {
        let store = Arc::new(MemorySettings::new());
        let registry = ProjectRegistry::load(store.clone()).await.unwrap();
        registry.add(project("b")).await.unwrap();
        registry.add(project("a")).await.unwrap();

        let reloaded = ProjectRegistry::load(store).await.unwrap();
        let ids: Vec<String> = reloaded
            .list()
            .into_iter()
            .map(|p| p.id.as_str().to_string())
            .collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[tokio::test]
    async fn test_failed_save_leaves_registry_unchanged() {
        let registry = ProjectRegistry::load(Arc::new(BrokenStore)).await.unwrap();
        let err = registry.add(project("a")).await.unwrap_err();
        assert!(err.is_file_system_error());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_adds_are_serialized() {
        let registry = Arc::new(ProjectRegistry::load(Arc::new(MemorySettings::new())).await.unwrap());
        let tasks: Vec<_> = (0..8)
            .map(|index| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.add(project(&format!("p{index}"))).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(registry.len(), 8);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_mutations() {
        let registry = ProjectRegistry::new();
        registry.shutdown().await;
        assert!(registry.add(project("a")).await.unwrap_err().is_shutting_down());
    }
}
