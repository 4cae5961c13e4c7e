// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Directory-watch multiplexer
//!
//! One OS-level notification source for the whole process, fanned out to N
//! subscribers per path. Paths are added to the watcher lazily on first
//! subscription and released on last unsubscription. The registry is the
//! single owner of watch state: a path appears in it iff the OS watch for
//! that path is active.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::thread;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

use hostfs_core::{entry, FsError, FsResult};
use hostfs_proto::{ChangeEvent, ChangeKind};

use crate::transport::{ClientLink, RemoteCallback};

/// Watch-path control messages for the loop that owns the watcher.
///
/// `Watch` carries a rendezvous sender so the subscriber synchronizes with
/// the outcome of the OS add; `Unwatch` failures are logged, not surfaced.
enum Control {
    Watch(PathBuf, SyncSender<Result<(), String>>),
    Unwatch(PathBuf),
}

struct Subscription {
    callback: Arc<dyn RemoteCallback>,
}

/// Process-wide watch multiplexer.
///
/// Construct one at startup with [`WatchHub::new`] and pass it to the
/// dispatcher; the underlying watcher and its threads start lazily on the
/// first subscription and run for the life of the process.
pub struct WatchHub {
    self_ref: Weak<WatchHub>,
    // path -> caller identity -> subscription
    registry: Mutex<HashMap<PathBuf, HashMap<String, Subscription>>>,
    control: OnceLock<SyncSender<Control>>,
    start_lock: Mutex<()>,
}

/// Teardown handle for one (path, identity) subscription.
///
/// Both the explicit `stopWatching` callback and the client-disconnect hook
/// converge here; calling [`StopHandle::stop`] more than once is a no-op.
#[derive(Clone, Debug)]
pub struct StopHandle {
    hub: Weak<WatchHub>,
    path: PathBuf,
    identity: String,
}

impl StopHandle {
    pub fn stop(&self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(&self.path, &self.identity);
        }
    }
}

impl WatchHub {
    pub fn new() -> Arc<WatchHub> {
        Arc::new_cyclic(|self_ref| WatchHub {
            self_ref: self_ref.clone(),
            registry: Mutex::new(HashMap::new()),
            control: OnceLock::new(),
            start_lock: Mutex::new(()),
        })
    }

    /// Register `callback` for change events under `path`, keyed by the
    /// caller identity.
    ///
    /// The first subscription for a path asks the OS layer to watch it; the
    /// registry is only updated once that add succeeds. A repeat subscribe
    /// for the same (path, identity) replaces the callback in place and does
    /// not bind a second disconnect hook.
    pub fn subscribe(
        &self,
        path: &Path,
        identity: &str,
        callback: Arc<dyn RemoteCallback>,
        client: Arc<dyn ClientLink>,
    ) -> FsResult<StopHandle> {
        let control = self.ensure_started()?;
        let path = path.to_path_buf();

        let replaced = {
            let mut registry = self.registry.lock().unwrap();
            if !registry.contains_key(&path) {
                let (ack_tx, ack_rx) = mpsc::sync_channel(0);
                control
                    .send(Control::Watch(path.clone(), ack_tx))
                    .map_err(|_| FsError::WatchFailed("watch loop is gone".to_string()))?;
                match ack_rx.recv() {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => return Err(FsError::WatchFailed(err)),
                    Err(_) => return Err(FsError::WatchFailed("watch loop is gone".to_string())),
                }
            }
            registry
                .entry(path.clone())
                .or_default()
                .insert(identity.to_string(), Subscription { callback })
                .is_some()
        };

        debug!(path = %path.display(), identity, replaced, "subscribed to directory changes");

        let stop = StopHandle {
            hub: self.self_ref.clone(),
            path,
            identity: identity.to_string(),
        };

        if !replaced {
            let hook = stop.clone();
            client.on_disconnect(Box::new(move || hook.stop()));
        }

        Ok(stop)
    }

    /// Paths currently carrying at least one subscriber.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.registry.lock().unwrap().keys().cloned().collect()
    }

    /// Number of live subscribers for `path`.
    pub fn subscriber_count(&self, path: &Path) -> usize {
        self.registry.lock().unwrap().get(path).map_or(0, |subscribers| subscribers.len())
    }

    fn unsubscribe(&self, path: &Path, identity: &str) {
        let Some(control) = self.control.get() else {
            return;
        };

        let mut registry = self.registry.lock().unwrap();
        let Some(subscribers) = registry.get_mut(path) else {
            return;
        };
        if subscribers.remove(identity).is_none() {
            return;
        }
        debug!(path = %path.display(), identity, "unsubscribed from directory changes");

        if subscribers.is_empty() {
            // The release must happen under the same lock acquisition as the
            // removal above; a concurrent subscribe could otherwise observe
            // the empty map and double-add the path.
            registry.remove(path);
            if control.send(Control::Unwatch(path.to_path_buf())).is_err() {
                warn!(path = %path.display(), "watch loop is gone, cannot release watch");
            }
        }
    }

    fn ensure_started(&self) -> FsResult<SyncSender<Control>> {
        if let Some(control) = self.control.get() {
            return Ok(control.clone());
        }

        let _guard = self.start_lock.lock().unwrap();
        if let Some(control) = self.control.get() {
            return Ok(control.clone());
        }

        let (event_tx, event_rx) = mpsc::channel();
        let watcher = notify::recommended_watcher(event_tx)
            .map_err(|err| FsError::WatchFailed(err.to_string()))?;

        let (control_tx, control_rx) = mpsc::sync_channel(0);
        thread::Builder::new()
            .name("hostfs-watch-control".to_string())
            .spawn(move || run_control_loop(watcher, control_rx))
            .map_err(FsError::Io)?;

        let hub = self.self_ref.clone();
        thread::Builder::new()
            .name("hostfs-watch-events".to_string())
            .spawn(move || run_event_loop(hub, event_rx))
            .map_err(FsError::Io)?;

        let _ = self.control.set(control_tx.clone());
        Ok(control_tx)
    }

    fn dispatch(&self, event: notify::Event) {
        use notify::event::{EventKind, ModifyKind, RenameMode};

        let mut changes: Vec<(ChangeKind, PathBuf)> = Vec::new();
        match event.kind {
            EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                changes.extend(event.paths.iter().map(|p| (ChangeKind::Added, p.clone())));
            }
            EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                changes.extend(event.paths.iter().map(|p| (ChangeKind::Removed, p.clone())));
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                let mut paths = event.paths.iter();
                if let Some(from) = paths.next() {
                    changes.push((ChangeKind::Removed, from.clone()));
                }
                if let Some(to) = paths.next() {
                    changes.push((ChangeKind::Added, to.clone()));
                }
            }
            // in-place writes and metadata changes produce no emission
            _ => return,
        }

        for (kind, path) in changes {
            self.deliver(kind, &path);
        }
    }

    /// Deliver one classified change to the subscribers of the containing
    /// directory.
    fn deliver(&self, kind: ChangeKind, path: &Path) {
        let Some(parent) = path.parent() else {
            return;
        };

        let callbacks: Vec<Arc<dyn RemoteCallback>> = {
            let registry = self.registry.lock().unwrap();
            match registry.get(parent) {
                Some(subscribers) => subscribers.values().map(|s| s.callback.clone()).collect(),
                // late event for a path nobody watches anymore
                None => return,
            }
        };

        let file = match kind {
            ChangeKind::Added => match entry::stat_entry(path) {
                Ok(entry) => entry,
                // the entry vanished again before we could stat it
                Err(_) => return,
            },
            ChangeKind::Removed => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                entry::removed_entry(&name, path)
            }
        };

        let payload = match serde_json::to_value(ChangeEvent { event: kind, file }) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "failed to encode change event");
                return;
            }
        };

        for callback in callbacks {
            callback.call(payload.clone());
        }
    }
}

fn run_control_loop(mut watcher: RecommendedWatcher, control: Receiver<Control>) {
    while let Ok(message) = control.recv() {
        match message {
            Control::Watch(path, ack) => {
                let result = watcher.watch(&path, RecursiveMode::NonRecursive);
                if let Err(err) = &result {
                    warn!(path = %path.display(), error = %err, "adding watch path failed");
                }
                let _ = ack.send(result.map_err(|err| err.to_string()));
            }
            Control::Unwatch(path) => {
                if let Err(err) = watcher.unwatch(&path) {
                    warn!(path = %path.display(), error = %err, "removing watch path failed");
                }
            }
        }
    }
}

fn run_event_loop(hub: Weak<WatchHub>, events: Receiver<notify::Result<notify::Event>>) {
    while let Ok(result) = events.recv() {
        let event = match result {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, "watcher error");
                continue;
            }
        };
        let Some(hub) = hub.upgrade() else {
            break;
        };
        hub.dispatch(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::fs;
    use std::sync::mpsc::Sender;
    use std::time::{Duration, Instant};

    struct TestCallback(Sender<Value>);

    impl RemoteCallback for TestCallback {
        fn call(&self, value: Value) {
            let _ = self.0.send(value);
        }
    }

    #[derive(Default)]
    struct TestClient {
        hooks: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
    }

    impl ClientLink for TestClient {
        fn on_disconnect(&self, hook: Box<dyn FnOnce() + Send>) {
            self.hooks.lock().unwrap().push(hook);
        }
    }

    impl TestClient {
        fn disconnect(&self) {
            let hooks: Vec<_> = self.hooks.lock().unwrap().drain(..).collect();
            for hook in hooks {
                hook();
            }
        }
    }

    fn channel_callback() -> (Arc<TestCallback>, mpsc::Receiver<Value>) {
        let (tx, rx) = mpsc::channel();
        (Arc::new(TestCallback(tx)), rx)
    }

    /// Wait for an event of the given kind and file name, skipping unrelated
    /// deliveries (e.g. editor temp files the OS reports in between).
    fn expect_event(rx: &mpsc::Receiver<Value>, kind: &str, name: &str) -> Value {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .unwrap_or_else(|| panic!("timed out waiting for {kind} event for {name}"));
            let value = rx
                .recv_timeout(remaining)
                .unwrap_or_else(|_| panic!("timed out waiting for {kind} event for {name}"));
            if value["event"] == kind && value["file"]["name"] == name {
                return value;
            }
        }
    }

    #[test]
    fn subscribe_tracks_path_until_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let hub = WatchHub::new();
        let (callback, _rx) = channel_callback();

        let stop = hub
            .subscribe(dir.path(), "alice", callback, Arc::new(TestClient::default()))
            .unwrap();
        assert_eq!(hub.watched_paths(), vec![dir.path().to_path_buf()]);
        assert_eq!(hub.subscriber_count(dir.path()), 1);

        stop.stop();
        assert!(hub.watched_paths().is_empty());

        // double teardown is a no-op
        stop.stop();
    }

    #[test]
    fn last_unsubscribe_releases_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let hub = WatchHub::new();

        let (cb_a, _rx_a) = channel_callback();
        let client_a = Arc::new(TestClient::default());
        hub.subscribe(dir.path(), "alice", cb_a, client_a.clone()).unwrap();

        let (cb_b, _rx_b) = channel_callback();
        let stop_b = hub
            .subscribe(dir.path(), "bob", cb_b, Arc::new(TestClient::default()))
            .unwrap();
        assert_eq!(hub.subscriber_count(dir.path()), 2);

        // client A disconnects; B keeps the path alive
        client_a.disconnect();
        assert_eq!(hub.watched_paths(), vec![dir.path().to_path_buf()]);
        assert_eq!(hub.subscriber_count(dir.path()), 1);

        // B stops explicitly; the path and its OS watch go away
        stop_b.stop();
        assert!(hub.watched_paths().is_empty());
    }

    #[test]
    fn repeat_subscribe_replaces_the_callback() {
        let dir = tempfile::tempdir().unwrap();
        let hub = WatchHub::new();
        let client = Arc::new(TestClient::default());

        let (cb_old, rx_old) = channel_callback();
        hub.subscribe(dir.path(), "alice", cb_old, client.clone()).unwrap();

        let (cb_new, rx_new) = channel_callback();
        hub.subscribe(dir.path(), "alice", cb_new, client.clone()).unwrap();
        assert_eq!(hub.subscriber_count(dir.path()), 1);

        fs::write(dir.path().join("f"), b"x").unwrap();

        expect_event(&rx_new, "added", "f");
        assert!(rx_old.recv_timeout(Duration::from_millis(300)).is_err());
    }

    #[test]
    fn delivers_added_and_removed_events() {
        let dir = tempfile::tempdir().unwrap();
        let hub = WatchHub::new();
        let (callback, rx) = channel_callback();

        hub.subscribe(dir.path(), "alice", callback, Arc::new(TestClient::default())).unwrap();

        let file = dir.path().join("f");
        fs::write(&file, b"x").unwrap();
        let added = expect_event(&rx, "added", "f");
        assert_eq!(added["file"]["fullPath"], file.to_string_lossy().as_ref());

        fs::remove_file(&file).unwrap();
        let removed = expect_event(&rx, "removed", "f");
        assert_eq!(removed["file"]["fullPath"], file.to_string_lossy().as_ref());
        assert_eq!(removed["file"]["size"], 0);
    }

    #[test]
    fn disconnect_purges_all_subscriptions_of_the_client() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let hub = WatchHub::new();
        let client = Arc::new(TestClient::default());

        let (cb1, _rx1) = channel_callback();
        let (cb2, _rx2) = channel_callback();
        hub.subscribe(dir_a.path(), "alice", cb1, client.clone()).unwrap();
        hub.subscribe(dir_b.path(), "alice", cb2, client.clone()).unwrap();
        assert_eq!(hub.watched_paths().len(), 2);

        client.disconnect();
        assert!(hub.watched_paths().is_empty());
    }

    #[test]
    fn failed_watch_leaves_no_registry_entry() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let hub = WatchHub::new();
        let (callback, _rx) = channel_callback();

        let err = hub
            .subscribe(&missing, "alice", callback, Arc::new(TestClient::default()))
            .unwrap_err();
        assert!(matches!(err, FsError::WatchFailed(_)));
        assert!(hub.watched_paths().is_empty());
    }
}
