use std::{
    collections::HashMap,
    path::PathBuf,
    sync::Arc,
};

use crate::config::{AgentConfig, DriftDefinition};
use crate::facet::DriftDetectionFacet;

use super::DetectionError;

/// Resolves where a resource's files live and how to reach them.
pub trait ResourceLocator: Send + Sync {
    /// Absolute base directory of a definition on a resource.
    fn base_directory(
        &self,
        resource_id: i32,
        definition: &DriftDefinition,
    ) -> Result<PathBuf, DetectionError>;

    /// Facet exposed by the resource's component, if it has one.
    fn facet(&self, resource_id: i32) -> Option<Arc<dyn DriftDetectionFacet>>;
}

/// Locator over a fixed set of resource roots.
///
/// A definition's `base_dir` is joined onto the resource root, so absolute
/// base directories are used as-is.
#[derive(Default, Clone)]
pub struct StaticResourceLocator {
    roots: HashMap<i32, PathBuf>,
    facets: HashMap<i32, Arc<dyn DriftDetectionFacet>>,
}

impl StaticResourceLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        let mut locator = Self::new();
        for resource in &config.resources {
            locator.roots.insert(resource.id, resource.root.clone());
        }
        locator
    }

    pub fn with_root(mut self, resource_id: i32, root: impl Into<PathBuf>) -> Self {
        self.roots.insert(resource_id, root.into());
        self
    }

    pub fn with_facet(mut self, resource_id: i32, facet: Arc<dyn DriftDetectionFacet>) -> Self {
        self.facets.insert(resource_id, facet);
        self
    }
}

impl ResourceLocator for StaticResourceLocator {
    fn base_directory(
        &self,
        resource_id: i32,
        definition: &DriftDefinition,
    ) -> Result<PathBuf, DetectionError> {
        let root = self
            .roots
            .get(&resource_id)
            .ok_or(DetectionError::UnknownResource(resource_id))?;
        Ok(root.join(&definition.base_dir))
    }

    fn facet(&self, resource_id: i32) -> Option<Arc<dyn DriftDetectionFacet>> {
        self.facets.get(&resource_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceConfig;

    #[test]
    fn base_directory_joins_the_resource_root() {
        let config = AgentConfig {
            resources: vec![ResourceConfig {
                id: 5,
                root: "/srv/app".into(),
                definitions: Vec::new(),
            }],
            ..AgentConfig::default()
        };
        let locator = StaticResourceLocator::from_config(&config);
        let relative = DriftDefinition::new(1, "conf", "conf");
        assert_eq!(
            locator.base_directory(5, &relative).unwrap(),
            PathBuf::from("/srv/app/conf")
        );
        let absolute = DriftDefinition::new(2, "etc", "/etc/app");
        assert_eq!(
            locator.base_directory(5, &absolute).unwrap(),
            PathBuf::from("/etc/app")
        );
        assert!(matches!(
            locator.base_directory(6, &relative),
            Err(DetectionError::UnknownResource(6))
        ));
        assert!(locator.facet(5).is_none());
    }
}
