//! Project resolution: where playbooks come from.
//!
//! Project-layout handling (role directories, includes, collections) is an
//! upstream concern; by the time the executor runs, a project only has to
//! hand over the resolved playbook tree.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::pipeline::Pipeline;
use crate::playbook::Playbook;

/// A source of resolved playbooks.
pub trait Project: Send + Sync {
    /// Return the structured playbook tree to execute.
    fn marshal_playbook(&self) -> Result<Playbook>;
}

/// A project backed by a playbook file on disk.
pub struct LocalProject {
    playbook_path: PathBuf,
}

impl LocalProject {
    /// Create a project for one playbook file.
    pub fn new<P: AsRef<Path>>(playbook_path: P) -> Self {
        Self {
            playbook_path: playbook_path.as_ref().to_path_buf(),
        }
    }

    /// Create a project from the playbook path in a pipeline spec.
    pub fn from_pipeline(pipeline: &Pipeline) -> Self {
        Self::new(&pipeline.spec.playbook)
    }
}

impl Project for LocalProject {
    fn marshal_playbook(&self) -> Result<Playbook> {
        Playbook::load(&self.playbook_path).map_err(|err| match err {
            Error::Project(msg) => Error::Project(msg),
            other => Error::Project(format!(
                "parse playbook '{}': {}",
                self.playbook_path.display(),
                other
            )),
        })
    }
}

/// A project holding an already-resolved playbook.
pub struct StaticProject {
    playbook: Playbook,
}

impl StaticProject {
    /// Wrap a resolved playbook.
    pub fn new(playbook: Playbook) -> Self {
        Self { playbook }
    }
}

impl Project for StaticProject {
    fn marshal_playbook(&self) -> Result<Playbook> {
        Ok(self.playbook.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn local_project_loads_playbook() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
- name: sample
  hosts: [web1]
  tasks:
    - name: hi
      debug:
        msg: "hi"
"#
        )
        .unwrap();
        let project = LocalProject::new(file.path());
        let playbook = project.marshal_playbook().unwrap();
        assert_eq!(playbook.plays.len(), 1);
    }

    #[test]
    fn missing_playbook_is_a_project_error() {
        let project = LocalProject::new("/nonexistent/playbook.yml");
        assert!(matches!(
            project.marshal_playbook(),
            Err(Error::Project(_))
        ));
    }

    #[test]
    fn static_project_returns_clone() {
        let playbook = Playbook::parse("- hosts: [a]\n").unwrap();
        let project = StaticProject::new(playbook);
        assert_eq!(project.marshal_playbook().unwrap().plays.len(), 1);
    }
}
