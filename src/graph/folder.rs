use std::collections::BTreeMap;

use crate::error::{EngineError, Result};
use crate::models::ids::{FolderId, IdCounter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    pub id: FolderId,
    pub name: String,
    /// `None` only for the root.
    pub parent: Option<FolderId>,
}

/// Folder tree. The root folder always exists and cannot be removed.
#[derive(Debug, Clone)]
pub struct Folders {
    folders: BTreeMap<FolderId, Folder>,
    ids: IdCounter,
}

impl Default for Folders {
    fn default() -> Self {
        let mut folders = BTreeMap::new();
        folders.insert(
            FolderId::ROOT,
            Folder {
                id: FolderId::ROOT,
                name: String::new(),
                parent: None,
            },
        );
        Self {
            folders,
            ids: IdCounter::starting_at(FolderId::ROOT.0 + 1),
        }
    }
}

impl Folders {
    pub fn get(&self, id: FolderId) -> Option<&Folder> {
        self.folders.get(&id)
    }

    pub fn contains(&self, id: FolderId) -> bool {
        self.folders.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Folder> {
        self.folders.values()
    }

    pub fn len(&self) -> usize {
        self.folders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }

    pub fn children(&self, parent: FolderId) -> impl Iterator<Item = &Folder> {
        self.folders
            .values()
            .filter(move |f| f.parent == Some(parent))
    }

    pub(crate) fn add(&mut self, name: &str, parent: FolderId) -> Result<FolderId> {
        if !self.contains(parent) {
            return Err(EngineError::UnknownFolder(parent));
        }
        let id = FolderId(self.ids.next()?);
        self.folders.insert(
            id,
            Folder {
                id,
                name: name.to_string(),
                parent: Some(parent),
            },
        );
        Ok(id)
    }

    /// Inserts a folder under a known id. The parent may arrive later;
    /// [`Folders::validate`] checks the finished tree.
    pub(crate) fn insert(&mut self, id: FolderId, name: &str, parent: FolderId) -> Result<()> {
        if self.folders.contains_key(&id) {
            return Err(EngineError::InvalidEdit(format!("{} already exists", id)));
        }
        self.ids.observe(id.0)?;
        self.folders.insert(
            id,
            Folder {
                id,
                name: name.to_string(),
                parent: Some(parent),
            },
        );
        Ok(())
    }

    /// Every folder must reach the root through known parents.
    pub(crate) fn validate(&self) -> Result<()> {
        for folder in self.folders.values() {
            let mut current = folder;
            let mut hops = 0;
            while let Some(parent) = current.parent {
                current = self
                    .folders
                    .get(&parent)
                    .ok_or(EngineError::UnknownFolder(parent))?;
                hops += 1;
                if hops > self.folders.len() {
                    return Err(EngineError::InvalidEdit(format!(
                        "folder '{}' is its own ancestor",
                        folder.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// `id` and all folders below it, parents before children.
    pub fn subtree(&self, id: FolderId) -> Vec<FolderId> {
        let mut out = Vec::new();
        if !self.contains(id) {
            return out;
        }
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).map(|f| f.id));
        }
        out
    }

    pub(crate) fn remove_subtree(&mut self, id: FolderId) -> Result<Vec<FolderId>> {
        if id == FolderId::ROOT {
            return Err(EngineError::InvalidEdit("the root folder cannot be removed".into()));
        }
        if !self.contains(id) {
            return Err(EngineError::UnknownFolder(id));
        }
        let removed = self.subtree(id);
        for folder in &removed {
            self.folders.remove(folder);
        }
        Ok(removed)
    }

    /// Slash-separated names from below the root, e.g. `"stage/left"`.
    pub fn path(&self, id: FolderId) -> Option<String> {
        let mut names = Vec::new();
        let mut current = self.folders.get(&id)?;
        while let Some(parent) = current.parent {
            names.push(current.name.as_str());
            current = self.folders.get(&parent)?;
        }
        names.reverse();
        Some(names.join("/"))
    }

    /// Resolves a slash-separated path; the empty path is the root.
    pub fn find(&self, path: &str) -> Option<FolderId> {
        let mut current = FolderId::ROOT;
        for name in path.split('/').filter(|s| !s.is_empty()) {
            current = self.children(current).find(|f| f.name == name)?.id;
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_paths_and_finds_them() {
        let mut folders = Folders::default();
        let stage = folders.add("stage", FolderId::ROOT).expect("add stage");
        let left = folders.add("left", stage).expect("add left");

        assert_eq!(folders.path(left).as_deref(), Some("stage/left"));
        assert_eq!(folders.path(FolderId::ROOT).as_deref(), Some(""));
        assert_eq!(folders.find("stage/left"), Some(left));
        assert_eq!(folders.find(""), Some(FolderId::ROOT));
        assert_eq!(folders.find("stage/right"), None);
    }

    #[test]
    fn removing_a_folder_removes_its_subtree() {
        let mut folders = Folders::default();
        let a = folders.add("a", FolderId::ROOT).expect("add a");
        let b = folders.add("b", a).expect("add b");
        let c = folders.add("c", b).expect("add c");
        let other = folders.add("other", FolderId::ROOT).expect("add other");

        let removed = folders.remove_subtree(a).expect("remove a");
        assert_eq!(removed.len(), 3);
        assert!(removed.contains(&c));
        assert!(folders.contains(other));
        assert_eq!(folders.len(), 2);
    }

    #[test]
    fn root_cannot_be_removed() {
        let mut folders = Folders::default();
        assert!(matches!(
            folders.remove_subtree(FolderId::ROOT),
            Err(EngineError::InvalidEdit(_))
        ));
        assert!(matches!(
            folders.add("x", FolderId(42)),
            Err(EngineError::UnknownFolder(FolderId(42)))
        ));
    }

    #[test]
    fn validate_rejects_orphans() {
        let mut folders = Folders::default();
        folders.insert(FolderId(5), "late", FolderId(9)).expect("insert");
        assert!(folders.validate().is_err());
        folders.insert(FolderId(9), "parent", FolderId::ROOT).expect("insert");
        assert!(folders.validate().is_ok());
    }
}
