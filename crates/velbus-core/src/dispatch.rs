// ── Dispatch engine ──
//
// Applies one patch operation to the mirrored tree and tells every
// affected observer about it. The state lock is held from `apply` until
// the last observer returns, so each operation's apply+notify is atomic
// with respect to other operations dispatched concurrently.

use std::sync::{PoisonError, RwLock, RwLockReadGuard};

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{trace, warn};

use crate::patch::{PatchError, PatchOperation};
use crate::state::StateTree;
use crate::subscription::{Observer, SubscriptionTrie};

/// Owns the mirrored state tree and the subscription trie.
///
/// Shared behind an `Arc` by the connection manager and its dispatch tasks.
#[derive(Debug, Default)]
pub struct Dispatcher {
    state: Mutex<StateTree>,
    trie: RwLock<SubscriptionTrie>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Register `observer` at `path`. Permanent for the dispatcher's lifetime.
    ///
    /// Safe to call from inside an observer: the trie lock is never held
    /// while observers run.
    pub fn register(&self, path: &[String], observer: Observer) {
        self.trie
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register(path, observer);
    }

    pub fn top_level_keys(&self) -> Vec<String> {
        self.read_trie().top_level_keys()
    }

    pub fn observer_count(&self) -> usize {
        self.read_trie().observer_count()
    }

    fn read_trie(&self) -> RwLockReadGuard<'_, SubscriptionTrie> {
        self.trie.read().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Dispatch ─────────────────────────────────────────────────────

    /// Decode a raw operation object and dispatch it.
    pub async fn dispatch_value(&self, raw: Value) -> Result<usize, PatchError> {
        let op = PatchOperation::from_value(raw).inspect_err(|e| {
            warn!(error = %e, "skipping undecodable patch operation");
        })?;
        self.dispatch(&op).await
    }

    /// Apply `op`, then notify every observer on or below its path.
    ///
    /// Returns the number of observer invocations. A failed operation is
    /// logged, leaves the tree untouched and notifies nobody.
    pub async fn dispatch(&self, op: &PatchOperation) -> Result<usize, PatchError> {
        let mut state = self.state.lock().await;

        if let Err(e) = state.apply(op) {
            warn!(op = op.name(), path = %op.path(), error = %e, "skipping patch operation");
            return Err(e);
        }

        let targets = self.read_trie().targets(op.path().components());

        let mut notified = 0;
        for target in &targets {
            let substate = state.get(&target.path);
            for observer in &target.observers {
                observer(substate);
                notified += 1;
            }
        }

        trace!(op = op.name(), path = %op.path(), notified, "patch operation dispatched");
        Ok(notified)
    }

    // ── State ────────────────────────────────────────────────────────

    /// Forget the mirrored state.
    pub async fn reset_state(&self) {
        self.state.lock().await.reset();
    }

    /// Copy of the whole mirrored tree.
    pub async fn snapshot(&self) -> Value {
        self.state.lock().await.as_value().clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::subscription::observer;

    type Calls = Arc<std::sync::Mutex<Vec<Option<Value>>>>;

    fn path(components: &[&str]) -> Vec<String> {
        components.iter().map(ToString::to_string).collect()
    }

    fn recorder() -> (Observer, Calls) {
        let calls: Calls = Arc::default();
        let sink = Arc::clone(&calls);
        let obs = observer(move |substate| {
            sink.lock().unwrap().push(substate.cloned());
        });
        (obs, calls)
    }

    fn calls(calls: &Calls) -> Vec<Option<Value>> {
        calls.lock().unwrap().clone()
    }

    async fn dispatch(dispatcher: &Dispatcher, raw: Value) -> Result<usize, PatchError> {
        dispatcher.dispatch_value(raw).await
    }

    #[tokio::test]
    async fn root_observer_receives_full_tree_once() {
        let dispatcher = Dispatcher::new();
        let (root, root_calls) = recorder();
        dispatcher.register(&[], root);

        dispatch(&dispatcher, json!({"op": "add", "path": "/0b", "value": {"1": {"relay": true}}}))
            .await
            .unwrap();

        assert_eq!(calls(&root_calls), [Some(json!({"0b": {"1": {"relay": true}}}))]);
    }

    #[tokio::test]
    async fn scoped_observers_get_their_own_substate() {
        let dispatcher = Dispatcher::new();
        let (ab, ab_calls) = recorder();
        let (abc, abc_calls) = recorder();
        let (ax, ax_calls) = recorder();
        dispatcher.register(&path(&["a", "b"]), ab);
        dispatcher.register(&path(&["a", "b", "c"]), abc);
        dispatcher.register(&path(&["a", "x"]), ax);

        dispatch(&dispatcher, json!({"op": "add", "path": "/a", "value": {"b": {"d": 1}}}))
            .await
            .unwrap();
        dispatch(&dispatcher, json!({"op": "add", "path": "/a/b/c", "value": 5}))
            .await
            .unwrap();

        assert_eq!(
            calls(&ab_calls),
            [Some(json!({"d": 1})), Some(json!({"c": 5, "d": 1}))]
        );
        assert_eq!(calls(&abc_calls), [None, Some(json!(5))]);
        // "/a" itself changed on the first op, so "/a/x" hears about it once
        // (absent), but the "/a/b/c" change never reaches it.
        assert_eq!(calls(&ax_calls), [None]);
    }

    #[tokio::test]
    async fn replace_reaches_observers_below_new_subtree() {
        let dispatcher = Dispatcher::new();
        let (abc, abc_calls) = recorder();
        dispatcher.register(&path(&["a", "b", "c"]), abc);

        dispatch(&dispatcher, json!({"op": "add", "path": "/a", "value": {}}))
            .await
            .unwrap();
        dispatch(&dispatcher, json!({"op": "replace", "path": "/a", "value": {"b": {"c": 1}}}))
            .await
            .unwrap();

        assert_eq!(calls(&abc_calls), [None, Some(json!(1))]);
    }

    #[tokio::test]
    async fn removed_path_is_reported_absent() {
        let dispatcher = Dispatcher::new();
        let (relay, relay_calls) = recorder();
        dispatcher.register(&path(&["0b", "1", "relay"]), relay);

        dispatch(&dispatcher, json!({"op": "add", "path": "/0b", "value": {"1": {"relay": false}}}))
            .await
            .unwrap();
        dispatch(&dispatcher, json!({"op": "remove", "path": "/0b/1"}))
            .await
            .unwrap();

        assert_eq!(calls(&relay_calls), [Some(json!(false)), None]);
    }

    #[tokio::test]
    async fn failed_operation_notifies_nobody_and_is_skipped() {
        let dispatcher = Dispatcher::new();
        let (root, root_calls) = recorder();
        dispatcher.register(&[], root);

        let bad = dispatch(&dispatcher, json!({"op": "remove", "path": "/nope"})).await;
        assert_eq!(bad.unwrap_err(), PatchError::NotFound("/nope".into()));

        let unknown = dispatch(&dispatcher, json!({"op": "frobnicate", "path": "/a"})).await;
        assert!(matches!(unknown, Err(PatchError::InvalidOperation(_))));

        assert!(calls(&root_calls).is_empty());

        dispatch(&dispatcher, json!({"op": "add", "path": "/a", "value": 1}))
            .await
            .unwrap();
        assert_eq!(calls(&root_calls), [Some(json!({"a": 1}))]);
    }

    #[tokio::test]
    async fn dispatch_counts_invocations() {
        let dispatcher = Dispatcher::new();
        dispatcher.register(&[], observer(|_| {}));
        dispatcher.register(&path(&["a"]), observer(|_| {}));
        dispatcher.register(&path(&["a"]), observer(|_| {}));
        dispatcher.register(&path(&["b"]), observer(|_| {}));

        let notified = dispatch(&dispatcher, json!({"op": "add", "path": "/a", "value": 1}))
            .await
            .unwrap();
        assert_eq!(notified, 3);
        assert_eq!(dispatcher.observer_count(), 4);
        assert_eq!(dispatcher.top_level_keys(), ["a", "b"]);
    }

    #[tokio::test]
    async fn observer_may_register_from_callback() {
        let dispatcher = Arc::new(Dispatcher::new());
        let inner = Arc::clone(&dispatcher);
        dispatcher.register(
            &path(&["a"]),
            observer(move |_| inner.register(&["late".to_owned()], observer(|_| {}))),
        );

        dispatch(&dispatcher, json!({"op": "add", "path": "/a", "value": 1}))
            .await
            .unwrap();

        assert_eq!(dispatcher.top_level_keys(), ["a", "late"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_operations_are_applied_atomically() {
        let dispatcher = Arc::new(Dispatcher::new());
        let (root, root_calls) = recorder();
        dispatcher.register(&[], root);

        let ops = [
            json!({"op": "add", "path": "/a", "value": {"x": 1, "y": 1}}),
            json!({"op": "add", "path": "/b", "value": {"x": 2, "y": 2}}),
        ];
        let handles: Vec<_> = ops
            .into_iter()
            .map(|raw| {
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move { dispatcher.dispatch_value(raw).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let seen = calls(&root_calls);
        assert_eq!(seen.len(), 2);

        // Each notification sees complete operations only: the first one
        // holds exactly one fully-applied subtree, the second holds both.
        let first = seen[0].as_ref().unwrap().as_object().unwrap();
        assert_eq!(first.len(), 1);
        let (key, subtree) = first.iter().next().unwrap();
        let n = if key == "a" { 1 } else { 2 };
        assert_eq!(subtree, &json!({"x": n, "y": n}));

        assert_eq!(
            seen[1],
            Some(json!({"a": {"x": 1, "y": 1}, "b": {"x": 2, "y": 2}}))
        );
        assert_eq!(
            dispatcher.snapshot().await,
            json!({"a": {"x": 1, "y": 1}, "b": {"x": 2, "y": 2}})
        );
    }

    #[tokio::test]
    async fn reset_state_empties_tree_but_keeps_observers() {
        let dispatcher = Dispatcher::new();
        dispatcher.register(&path(&["a"]), observer(|_| {}));
        dispatch(&dispatcher, json!({"op": "add", "path": "/a", "value": 1}))
            .await
            .unwrap();

        dispatcher.reset_state().await;

        assert_eq!(dispatcher.snapshot().await, json!({}));
        assert_eq!(dispatcher.observer_count(), 1);
    }
}
