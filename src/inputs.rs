//! Input argument expansion.
//!
//! Shells normally expand `*_keypoints.json` before we see it, but not all
//! do (and very long globs are often quoted to dodge argument limits), so
//! arguments that look like patterns are expanded here too.

use std::path::PathBuf;

fn looks_like_glob(arg: &str) -> bool {
    arg.contains(['*', '?', '['])
}

/// Turn command line arguments into the list of files to process.
///
/// An argument naming an existing path is used verbatim. An argument with
/// glob metacharacters that names nothing is expanded (matches come back in
/// lexical order). Anything else is passed through so it is reported as a
/// skipped file later on. With `sort` the final list is sorted.
pub fn expand_inputs(args: &[PathBuf], sort: bool) -> Vec<PathBuf> {
    let mut files = Vec::with_capacity(args.len());

    for arg in args {
        let pattern = match arg.to_str() {
            Some(s) if looks_like_glob(s) && !arg.exists() => s,
            _ => {
                files.push(arg.clone());
                continue;
            }
        };

        let paths = match glob::glob(pattern) {
            Ok(paths) => paths,
            Err(e) => {
                tracing::warn!(pattern, error = %e, "invalid glob pattern, using it as a literal path");
                files.push(arg.clone());
                continue;
            }
        };

        let before = files.len();
        for entry in paths {
            match entry {
                Ok(path) => files.push(path),
                Err(e) => tracing::warn!(error = %e, "unreadable path while expanding glob"),
            }
        }
        if files.len() == before {
            tracing::warn!(pattern, "glob pattern matched no files");
        } else {
            tracing::debug!(pattern, matches = files.len() - before, "expanded glob pattern");
        }
    }

    if sort {
        files.sort();
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, "{}").unwrap();
        path
    }

    #[test]
    fn plain_paths_keep_their_order() {
        let dir = TempDir::new().unwrap();
        let b = touch(&dir, "b.json");
        let a = touch(&dir, "a.json");

        let files = expand_inputs(&[b.clone(), a.clone()], false);

        assert_eq!(files, vec![b, a]);
    }

    #[test]
    fn sort_orders_everything() {
        let dir = TempDir::new().unwrap();
        let b = touch(&dir, "b.json");
        let a = touch(&dir, "a.json");

        let files = expand_inputs(&[b.clone(), a.clone()], true);

        assert_eq!(files, vec![a, b]);
    }

    #[test]
    fn glob_arguments_are_expanded() {
        let dir = TempDir::new().unwrap();
        let f1 = touch(&dir, "S_a_1x1_1_keypoints.json");
        let f0 = touch(&dir, "S_a_1x1_0_keypoints.json");
        touch(&dir, "notes.txt");

        let pattern = dir.path().join("*_keypoints.json");
        let files = expand_inputs(&[pattern], false);

        assert_eq!(files, vec![f0, f1]);
    }

    #[test]
    fn missing_plain_path_is_passed_through() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("gone.json");

        assert_eq!(expand_inputs(&[missing.clone()], false), vec![missing]);
    }

    #[test]
    fn glob_without_matches_yields_nothing() {
        let dir = TempDir::new().unwrap();
        let pattern = dir.path().join("*.json");

        assert!(expand_inputs(&[pattern], false).is_empty());
    }

    #[test]
    fn existing_file_with_metacharacters_is_literal() {
        let dir = TempDir::new().unwrap();
        let odd = touch(&dir, "weird[1].json");

        assert_eq!(expand_inputs(&[odd.clone()], false), vec![odd]);
    }
}
