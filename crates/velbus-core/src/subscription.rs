// ── Path subscription trie ──
//
// Observers registered against state paths, indexed by path component so
// a change at one path only walks the branches it can have affected.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// Callback invoked with the substate rooted at its registration path.
///
/// `None` means the path does not exist in the tree after the change.
pub type Observer = Arc<dyn Fn(Option<&Value>) + Send + Sync>;

/// Wrap a closure as an [`Observer`].
pub fn observer<F>(f: F) -> Observer
where
    F: Fn(Option<&Value>) + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Default)]
struct SubscriptionNode {
    observers: Vec<Observer>,
    children: BTreeMap<String, SubscriptionNode>,
}

/// Observers that must be told about a change, grouped by the path they
/// registered at.
#[derive(Clone)]
pub struct NotifyTarget {
    pub path: Vec<String>,
    pub observers: Vec<Observer>,
}

impl fmt::Debug for NotifyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifyTarget")
            .field("path", &self.path)
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// Tree of observer lists keyed by the same components as the state tree.
///
/// The root corresponds to the empty path and sees every change.
/// Registrations are permanent.
#[derive(Default)]
pub struct SubscriptionTrie {
    root: SubscriptionNode,
}

impl SubscriptionTrie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `observer` at `path`, creating intermediate nodes as needed.
    pub fn register(&mut self, path: &[String], observer: Observer) {
        let node = path.iter().fold(&mut self.root, |node, component| {
            node.children.entry(component.clone()).or_default()
        });
        node.observers.push(observer);
    }

    /// First path components that have at least one registration below them.
    pub fn top_level_keys(&self) -> Vec<String> {
        self.root.children.keys().cloned().collect()
    }

    pub fn observer_count(&self) -> usize {
        fn count(node: &SubscriptionNode) -> usize {
            node.observers.len() + node.children.values().map(count).sum::<usize>()
        }
        count(&self.root)
    }

    pub fn is_empty(&self) -> bool {
        self.root.observers.is_empty() && self.root.children.is_empty()
    }

    /// Everyone affected by a change at `change_path`, outermost first.
    ///
    /// Observers on the route from the root to the changed node are
    /// included, as is every observer anywhere below the changed node.
    /// Branches that diverge from the route before reaching it are skipped.
    pub fn targets(&self, change_path: &[String]) -> Vec<NotifyTarget> {
        let mut out = Vec::new();
        let mut path = Vec::with_capacity(change_path.len());
        collect(&self.root, &mut path, change_path, &mut out);
        out
    }
}

fn collect(
    node: &SubscriptionNode,
    path: &mut Vec<String>,
    remaining: &[String],
    out: &mut Vec<NotifyTarget>,
) {
    if !node.observers.is_empty() {
        out.push(NotifyTarget {
            path: path.clone(),
            observers: node.observers.clone(),
        });
    }

    for (key, child) in &node.children {
        let rest: &[String] = match remaining.split_first() {
            Some((next, _)) if next != key => continue,
            Some((_, rest)) => rest,
            None => &[],
        };
        path.push(key.clone());
        collect(child, path, rest, out);
        path.pop();
    }
}

impl fmt::Debug for SubscriptionTrie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionTrie")
            .field("top_level_keys", &self.top_level_keys())
            .field("observers", &self.observer_count())
            .finish()
    }
}
