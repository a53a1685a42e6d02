//! Commit history walks over a [`BackingStore`].
//!
//! Commits form a DAG through their parent links. These helpers find common
//! ancestors and the first-parent chain of a branch since it diverged.

use std::collections::{HashMap, HashSet, VecDeque};

use ontovc_store::{BackingStore, CommitInfo};
use ontovc_types::{CommitHash, Snapshot};

use crate::error::{DiffError, DiffResult};

async fn load_commit(store: &dyn BackingStore, db: &str, hash: &CommitHash) -> DiffResult<CommitInfo> {
    store
        .get_commit(db, hash)
        .await?
        .ok_or(DiffError::CommitNotFound(*hash))
}

/// Every ancestor of `head`, including `head` itself.
pub async fn ancestors(
    store: &dyn BackingStore,
    db: &str,
    head: CommitHash,
) -> DiffResult<HashMap<CommitHash, CommitInfo>> {
    let mut visited = HashMap::new();
    let mut queue = VecDeque::new();
    queue.push_back(head);

    while let Some(current) = queue.pop_front() {
        if visited.contains_key(&current) {
            continue;
        }
        let info = load_commit(store, db, &current).await?;
        for parent in &info.parents {
            if !visited.contains_key(parent) {
                queue.push_back(*parent);
            }
        }
        visited.insert(current, info);
    }

    Ok(visited)
}

/// Returns `true` if `ancestor` is reachable from `descendant` (or equal).
pub async fn is_ancestor(
    store: &dyn BackingStore,
    db: &str,
    ancestor: CommitHash,
    descendant: CommitHash,
) -> DiffResult<bool> {
    if ancestor == descendant {
        return Ok(true);
    }
    Ok(ancestors(store, db, descendant).await?.contains_key(&ancestor))
}

/// The best common ancestor of `a` and `b`, if their histories meet.
///
/// Among all common ancestors the ones that are ancestors of another common
/// ancestor are discarded; remaining ties go to the newest commit, then the
/// smallest hash, so the result does not depend on argument order.
pub async fn merge_base(
    store: &dyn BackingStore,
    db: &str,
    a: CommitHash,
    b: CommitHash,
) -> DiffResult<Option<CommitHash>> {
    if a == b {
        return Ok(Some(a));
    }

    let ancestors_a = ancestors(store, db, a).await?;
    let ancestors_b = ancestors(store, db, b).await?;

    let common: HashSet<CommitHash> = ancestors_a
        .keys()
        .filter(|hash| ancestors_b.contains_key(*hash))
        .copied()
        .collect();
    if common.is_empty() {
        return Ok(None);
    }

    // A common ancestor reachable from another common ancestor is redundant.
    let mut redundant = HashSet::new();
    for hash in &common {
        let mut queue: VecDeque<CommitHash> = ancestors_a[hash].parents.iter().copied().collect();
        while let Some(current) = queue.pop_front() {
            if redundant.insert(current) {
                if let Some(info) = ancestors_a.get(&current) {
                    queue.extend(info.parents.iter().copied());
                }
            }
        }
    }

    Ok(common
        .iter()
        .filter(|hash| !redundant.contains(*hash))
        .max_by(|x, y| {
            let tx = ancestors_a[*x].timestamp;
            let ty = ancestors_a[*y].timestamp;
            tx.cmp(&ty).then_with(|| y.cmp(x))
        })
        .copied())
}

/// Commits on the first-parent chain of `head` that are not ancestors of
/// `upstream`, oldest first.
///
/// These are the commits a rebase of `head` onto `upstream` replays.
pub async fn commits_since(
    store: &dyn BackingStore,
    db: &str,
    head: CommitHash,
    upstream: CommitHash,
) -> DiffResult<Vec<CommitInfo>> {
    let upstream_history = ancestors(store, db, upstream).await?;
    let mut chain = Vec::new();
    let mut current = Some(head);

    while let Some(hash) = current {
        if upstream_history.contains_key(&hash) {
            break;
        }
        let info = load_commit(store, db, &hash).await?;
        current = info.first_parent();
        chain.push(info);
    }

    chain.reverse();
    Ok(chain)
}

/// The schema snapshot recorded by a commit.
pub async fn snapshot_at(store: &dyn BackingStore, db: &str, hash: &CommitHash) -> DiffResult<Snapshot> {
    let documents = store.commit_documents(db, hash).await?;
    Ok(Snapshot::from_documents(&documents)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ontovc_store::{InMemoryBackingStore, NewCommit};

    const DB: &str = "db";

    async fn commit(store: &InMemoryBackingStore, parents: Vec<CommitHash>, msg: &str) -> CommitHash {
        store
            .write_commit(DB, NewCommit::new(parents, Vec::new(), msg, "test"))
            .await
            .unwrap()
    }

    /// root -> a -> b (first chain), root -> c (second chain), d = merge(b, c)
    async fn diamond() -> (InMemoryBackingStore, [CommitHash; 5]) {
        let store = InMemoryBackingStore::new();
        let root = commit(&store, vec![], "root").await;
        let a = commit(&store, vec![root], "a").await;
        let b = commit(&store, vec![a], "b").await;
        let c = commit(&store, vec![root], "c").await;
        let d = commit(&store, vec![b, c], "d").await;
        (store, [root, a, b, c, d])
    }

    #[tokio::test]
    async fn merge_base_of_divergent_chains() {
        let (store, [root, _a, b, c, _d]) = diamond().await;
        assert_eq!(merge_base(&store, DB, b, c).await.unwrap(), Some(root));
        assert_eq!(merge_base(&store, DB, c, b).await.unwrap(), Some(root));
    }

    #[tokio::test]
    async fn merge_base_when_one_contains_the_other() {
        let (store, [_root, a, b, _c, d]) = diamond().await;
        assert_eq!(merge_base(&store, DB, a, b).await.unwrap(), Some(a));
        assert_eq!(merge_base(&store, DB, d, b).await.unwrap(), Some(b));
    }

    #[tokio::test]
    async fn unrelated_histories_have_no_base() {
        let store = InMemoryBackingStore::new();
        let x = commit(&store, vec![], "x").await;
        let y = commit(&store, vec![], "y").await;
        assert_eq!(merge_base(&store, DB, x, y).await.unwrap(), None);
    }

    #[tokio::test]
    async fn ancestry_checks() {
        let (store, [root, a, _b, c, d]) = diamond().await;
        assert!(is_ancestor(&store, DB, root, d).await.unwrap());
        assert!(is_ancestor(&store, DB, c, d).await.unwrap());
        assert!(!is_ancestor(&store, DB, c, a).await.unwrap());
    }

    #[tokio::test]
    async fn commits_since_follows_first_parent() {
        let (store, [_root, a, b, c, _d]) = diamond().await;
        let chain = commits_since(&store, DB, b, c).await.unwrap();
        let hashes: Vec<CommitHash> = chain.iter().map(|c| c.hash).collect();
        assert_eq!(hashes, vec![a, b]);
        assert!(commits_since(&store, DB, c, b).await.unwrap().len() == 1);
        assert!(commits_since(&store, DB, a, b).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_commit_is_reported() {
        let store = InMemoryBackingStore::new();
        let ghost = CommitHash::digest(b"ghost");
        let err = ancestors(&store, DB, ghost).await.unwrap_err();
        assert!(matches!(err, DiffError::CommitNotFound(h) if h == ghost));
    }
}
