use std::collections::HashMap;

use crate::ContentId;

pub mod error;
pub use error::CatalogError;

/// A loadable segment known to every peer of the session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentInfo {
    pub content: ContentId,
    pub name: String,
}

/// Registry of every segment that may be loaded during a session. All peers
/// must build the same catalog; content ids are derived from segment names.
#[derive(Default, Clone)]
pub struct SegmentCatalog {
    segments: HashMap<ContentId, SegmentInfo>,
    names: HashMap<String, ContentId>,
    locked: bool,
}

impl SegmentCatalog {
    pub fn builder() -> Self {
        Self::default()
    }

    /// Registers a segment by name
    ///
    /// # Panics
    ///
    /// Panics if the catalog is locked or the name is already registered.
    /// Consider using `try_add_segment` for non-panicking error handling.
    pub fn add_segment(&mut self, name: &str) -> &mut Self {
        self.try_add_segment(name)
            .expect("SegmentCatalog::add_segment failed");
        self
    }

    pub fn try_add_segment(&mut self, name: &str) -> Result<&mut Self, CatalogError> {
        self.try_check_lock()?;

        if self.names.contains_key(name) {
            return Err(CatalogError::DuplicateSegment {
                name: name.to_string(),
            });
        }

        let content = ContentId::from_name(name);
        if let Some(existing) = self.segments.get(&content) {
            return Err(CatalogError::ContentIdCollision {
                name: name.to_string(),
                existing: existing.name.clone(),
                content,
            });
        }

        self.names.insert(name.to_string(), content);
        self.segments.insert(
            content,
            SegmentInfo {
                content,
                name: name.to_string(),
            },
        );

        Ok(self)
    }

    pub fn get(&self, content: &ContentId) -> Option<&SegmentInfo> {
        self.segments.get(content)
    }

    pub fn content_id(&self, name: &str) -> Option<ContentId> {
        self.names.get(name).copied()
    }

    pub fn contains(&self, content: &ContentId) -> bool {
        self.segments.contains_key(content)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn try_lock(&mut self) -> Result<(), CatalogError> {
        self.try_check_lock()?;
        self.locked = true;
        Ok(())
    }

    pub fn lock(&mut self) {
        self.check_lock();
        self.locked = true;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Returns Err if the catalog is locked
    pub fn try_check_lock(&self) -> Result<(), CatalogError> {
        if self.locked {
            Err(CatalogError::AlreadyLocked)
        } else {
            Ok(())
        }
    }

    /// Checks if catalog is locked, panics if it is
    pub fn check_lock(&self) {
        if self.locked {
            panic!("SegmentCatalog already locked!");
        }
    }

    pub fn build(&mut self) -> Self {
        std::mem::take(self)
    }
}
