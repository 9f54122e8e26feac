//! Driver-agnostic depth-first walk.
//!
//! A full recursive walk over any [`StorageDriver`], implemented iteratively (an
//! explicit stack rather than recursive `async fn`) to sidestep the self-referential
//! lifetime that a `Box::pin`'d recursive walk would otherwise need around the visitor
//! reference.
//!
//! A backend with a native "list with delimiter" primitive (S3 and friends) can
//! specialize this traversal internally; the contract it must honor is identical to
//! this walk's visitor call sequence.

use super::{FileInfo, StorageDriver};
use crate::error::{StorageError, WalkError};

/// Called once per visited entry, in lexicographic order. Returning `Err(SkipDir)` on a
/// directory skips its children; on a file it stops the whole walk (preserved
/// oddity, see [`WalkError::SkipDir`]). Returning `Err(FilledBuffer)` stops the whole
/// walk without surfacing an error to [`walk`]'s caller.
pub type Visitor<'v> = dyn FnMut(&FileInfo) -> Result<(), WalkError> + 'v;

enum Outcome {
    Descend,
    SkipChildren,
    Stop,
}

fn invoke(info: &FileInfo, visitor: &mut Visitor<'_>) -> Result<Outcome, StorageError> {
    match visitor(info) {
        Ok(()) => Ok(Outcome::Descend),
        Err(WalkError::SkipDir) => {
            if info.is_dir {
                Ok(Outcome::SkipChildren)
            } else {
                Ok(Outcome::Stop)
            }
        }
        Err(WalkError::FilledBuffer) => Ok(Outcome::Stop),
        Err(WalkError::Storage(e)) => Err(e),
    }
}

fn is_before_hint(path: &str, start_after: Option<&str>) -> bool {
    start_after.is_some_and(|hint| path <= hint)
}

async fn push_children(
    driver: &dyn StorageDriver,
    path: &str,
    stack: &mut Vec<String>,
) -> Result<(), StorageError> {
    let mut children = driver.list(path).await?;
    children.sort();
    children.reverse();
    stack.extend(children);
    Ok(())
}

/// Walk `from` depth-first in lexicographic order, calling `visitor` once per
/// descendant (never on `from` itself unless `from` names a file, per step 1 of the
/// algorithm). `start_after`, if given, skips every entry whose path is
/// lexicographically `<=` the hint, still descending into directories that might
/// contain entries past it.
pub async fn walk(
    driver: &dyn StorageDriver,
    from: &str,
    start_after: Option<&str>,
    visitor: &mut Visitor<'_>,
) -> Result<(), StorageError> {
    let root = driver.stat(from).await?;
    if !root.is_dir {
        if !is_before_hint(from, start_after) {
            invoke(&root, visitor)?;
        }
        return Ok(());
    }

    let mut stack = Vec::new();
    push_children(driver, from, &mut stack).await?;

    while let Some(path) = stack.pop() {
        let info = driver.stat(&path).await?;
        if is_before_hint(&path, start_after) {
            if info.is_dir {
                push_children(driver, &path, &mut stack).await?;
            }
            continue;
        }
        match invoke(&info, visitor)? {
            Outcome::Stop => return Ok(()),
            Outcome::SkipChildren => continue,
            Outcome::Descend => {
                if info.is_dir {
                    push_children(driver, &path, &mut stack).await?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryDriver;

    async fn seeded() -> InMemoryDriver {
        let d = InMemoryDriver::new();
        d.put_content("/a/1", b"1").await.unwrap();
        d.put_content("/a/2", b"2").await.unwrap();
        d.put_content("/b/1", b"3").await.unwrap();
        d
    }

    #[tokio::test]
    async fn skip_dir_on_directory_skips_its_children() {
        let d = seeded().await;
        let mut seen = Vec::new();
        walk(&d, "/", None, &mut |info| {
            seen.push(info.path.clone());
            if info.path == "/a" {
                Err(WalkError::SkipDir)
            } else {
                Ok(())
            }
        })
        .await
        .unwrap();
        assert_eq!(seen, vec!["/a", "/b", "/b/1"]);
    }

    #[tokio::test]
    async fn filled_buffer_stops_without_error() {
        let d = seeded().await;
        let mut seen = Vec::new();
        let result = walk(&d, "/", None, &mut |info| {
            seen.push(info.path.clone());
            if info.path == "/b" {
                Err(WalkError::FilledBuffer)
            } else {
                Ok(())
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(seen, vec!["/a", "/a/1", "/a/2", "/b"]);
    }

    #[tokio::test]
    async fn start_after_hint_equal_to_last_path_visits_nothing() {
        let d = seeded().await;
        let mut seen = Vec::new();
        walk(&d, "/", Some("/b/1"), &mut |info| {
            seen.push(info.path.clone());
            Ok(())
        })
        .await
        .unwrap();
        assert!(seen.is_empty());
    }

    #[tokio::test]
    async fn start_after_hint_skips_earlier_entries_only() {
        let d = seeded().await;
        let mut seen = Vec::new();
        walk(&d, "/", Some("/a/2"), &mut |info| {
            seen.push(info.path.clone());
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(seen, vec!["/b", "/b/1"]);
    }
}
