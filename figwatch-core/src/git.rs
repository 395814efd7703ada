use std::path::{Path, PathBuf};

/// The closest directory at or above `path` that holds a `.git` entry.
///
/// A `.git` file (worktrees, submodules) counts as well as a directory.
/// Returns `None` when no ancestor is a repository root.
pub fn find_git_root(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn finds_root_from_nested_directory() {
        let repo = TempDir::new().expect("repo");
        fs::create_dir(repo.path().join(".git")).expect("mkdir .git");
        let nested = repo.path().join("chapters").join("figures");
        fs::create_dir_all(&nested).expect("mkdir nested");

        assert_eq!(find_git_root(&nested), Some(repo.path().to_path_buf()));
        assert_eq!(find_git_root(repo.path()), Some(repo.path().to_path_buf()));
    }

    #[test]
    fn accepts_git_file_for_worktrees() {
        let repo = TempDir::new().expect("repo");
        fs::write(repo.path().join(".git"), "gitdir: /elsewhere").expect("write .git");

        assert_eq!(find_git_root(repo.path()), Some(repo.path().to_path_buf()));
    }
}
