// store.rs
//
// The synchronization core. `SyncStore` owns the authoritative in-memory
// list/task state and is the only place that mutates it; every committed
// change notifies the registered observers synchronously, so the sidebar
// and the detail pane always render the same truth.
//
// Network results are only ever applied through ticket-guarded commits: a
// call that was superseded (navigation, a newer sweep) hands in a stale
// ticket and its result is dropped on the floor, success and failure alike.
// Worker threads never touch the store directly; they send raw results back
// to the owning thread, which commits them (see app.rs).

use crate::api::ApiClient;
use crate::error::{SyncError, SyncResult};
use crate::model::{ListDraft, ListRef, Task, TaskDraft, TodoList};
use crate::views::{self, CategoryBucket, Counters};
use log::warn;
use serde_json::{Value, json};
use std::collections::HashMap;

#[derive(Clone, Debug)]
pub struct ListState {
    pub list: TodoList,
    pub tasks: Vec<Task>,
}

impl ListState {
    /// The list with its live task set embedded, the shape carried by
    /// navigation and handed to counters consumers.
    pub fn merged_list(&self) -> TodoList {
        let mut l = self.list.clone();
        l.tasks = Some(self.tasks.clone());
        l
    }
}

/// What the detail observers see. `None` (nothing selected, or the active
/// list was just deleted) is deliberately distinct from `Loading` and
/// `Failed`.
#[derive(Clone, Debug, Default)]
pub enum ActiveView {
    #[default]
    None,
    Loading,
    Failed(String),
    Ready(ListState),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LoadTicket(u64);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ListsTicket(u64);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SweepTicket(u64);

type ObserverFn = Box<dyn Fn(&SyncStore)>;

pub struct SyncStore {
    api: ApiClient,
    lists: Vec<TodoList>,
    lists_error: Option<String>,
    counts: HashMap<String, Counters>,
    active: ActiveView,
    load_gen: u64,
    lists_gen: u64,
    sweep_gen: u64,
    observers: Vec<ObserverFn>,
}

impl SyncStore {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            lists: Vec::new(),
            lists_error: None,
            counts: HashMap::new(),
            active: ActiveView::None,
            load_gen: 0,
            lists_gen: 0,
            sweep_gen: 0,
            observers: Vec::new(),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn subscribe(&mut self, f: impl Fn(&SyncStore) + 'static) {
        self.observers.push(Box::new(f));
    }

    fn notify(&self) {
        for obs in &self.observers {
            obs(self);
        }
    }

    // ---- read side ----

    pub fn lists(&self) -> &[TodoList] {
        &self.lists
    }

    pub fn lists_error(&self) -> Option<&str> {
        self.lists_error.as_deref()
    }

    /// Summary ordering: priority ascending, then name.
    pub fn sorted_lists(&self) -> Vec<&TodoList> {
        let mut out: Vec<&TodoList> = self.lists.iter().collect();
        out.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        out
    }

    pub fn active(&self) -> &ActiveView {
        &self.active
    }

    pub fn active_state(&self) -> Option<&ListState> {
        match &self.active {
            ActiveView::Ready(s) => Some(s),
            _ => None,
        }
    }

    pub fn active_counters(&self) -> Option<Counters> {
        self.active_state().map(|s| views::counters(&s.tasks))
    }

    pub fn active_buckets(&self) -> Vec<CategoryBucket<'_>> {
        match &self.active {
            ActiveView::Ready(s) => views::group_by_categories(&s.tasks, &s.list),
            _ => Vec::new(),
        }
    }

    /// Counters for a summary row: the refresh cache first, else whatever
    /// the collection entry happens to embed.
    pub fn counters_for(&self, key: &str) -> Option<Counters> {
        if let Some(c) = self.counts.get(key) {
            return Some(*c);
        }
        self.lists
            .iter()
            .find(|l| l.key().as_deref() == Some(key))
            .and_then(|l| l.tasks.as_deref())
            .map(views::counters)
    }

    fn put_counts(&mut self, key: &str, c: Counters) -> bool {
        if self.counts.get(key) == Some(&c) {
            return false;
        }
        self.counts.insert(key.to_string(), c);
        true
    }

    fn refresh_active_counts(&mut self) {
        if let ActiveView::Ready(s) = &self.active {
            if let Some(key) = s.list.key() {
                let c = views::counters(&s.tasks);
                self.put_counts(&key, c);
            }
        }
    }

    // ---- collection load (GET /lists/) ----

    pub fn begin_lists_load(&mut self) -> ListsTicket {
        self.lists_gen += 1;
        ListsTicket(self.lists_gen)
    }

    /// Apply a finished collection fetch. Stale tickets are discarded
    /// silently; a current failure keeps the previous collection and only
    /// records the error.
    pub fn commit_lists(&mut self, ticket: ListsTicket, result: SyncResult<Vec<TodoList>>) -> bool {
        if ticket.0 != self.lists_gen {
            return false;
        }
        match result {
            Ok(lists) => {
                self.lists = lists;
                self.lists_error = None;
            }
            Err(e) => self.lists_error = Some(e.to_string()),
        }
        self.notify();
        true
    }

    // ---- active list load ----

    pub fn begin_load(&mut self) -> LoadTicket {
        self.load_gen += 1;
        self.active = ActiveView::Loading;
        self.notify();
        LoadTicket(self.load_gen)
    }

    /// Apply a finished list load. A stale ticket is discarded without any
    /// observable effect (cancellation is not an error).
    pub fn commit_load(&mut self, ticket: LoadTicket, result: SyncResult<ListState>) -> bool {
        if ticket.0 != self.load_gen {
            return false;
        }
        match result {
            Ok(state) => {
                self.active = ActiveView::Ready(state);
                self.refresh_active_counts();
            }
            Err(e) => self.active = ActiveView::Failed(e.to_string()),
        }
        self.notify();
        true
    }

    /// Synchronous load: resolve, fetch, commit. Used where the caller can
    /// afford to block; the TUI routes loads through a worker thread and
    /// the same begin/commit pair instead.
    pub fn load_list(&mut self, lref: &ListRef) -> SyncResult<()> {
        let ticket = self.begin_load();
        let result = fetch_list_state(&self.api, lref);
        let failed = result.as_ref().err().cloned();
        self.commit_load(ticket, result);
        match failed {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn clear_active(&mut self) {
        self.load_gen += 1; // supersede any in-flight load
        self.active = ActiveView::None;
        self.notify();
    }

    // ---- counters sweep ----

    pub fn begin_count_sweep(&mut self) -> SweepTicket {
        self.sweep_gen += 1;
        SweepTicket(self.sweep_gen)
    }

    /// Keys (cache key, route key) of lists whose counters are unknown.
    pub fn lists_missing_counts(&self) -> Vec<(String, String)> {
        self.lists
            .iter()
            .filter_map(|l| match (l.key(), l.route_key()) {
                (Some(k), Some(r)) if !self.counts.contains_key(&k) => Some((k, r)),
                _ => None,
            })
            .collect()
    }

    /// Apply one fetched list from a counter sweep. Only lists that embed
    /// their tasks contribute; anything else is silently skipped, like a
    /// stale ticket.
    pub fn commit_counts(&mut self, ticket: SweepTicket, key: &str, fetched: SyncResult<TodoList>) -> bool {
        if ticket.0 != self.sweep_gen {
            return false;
        }
        let Ok(list) = fetched else { return false };
        let Some(tasks) = list.tasks.as_deref() else { return false };
        if self.put_counts(key, views::counters(tasks)) {
            self.notify();
            return true;
        }
        false
    }

    // ---- task mutations ----

    fn active_ready_mut(&mut self) -> SyncResult<&mut ListState> {
        match &mut self.active {
            ActiveView::Ready(s) => Ok(s),
            _ => Err(SyncError::ReferenceUnresolvable("active list")),
        }
    }

    /// POST the task, then prepend the server's version. No optimistic
    /// insert: subsequent operations need the server-assigned id.
    pub fn create_task(&mut self, draft: &TaskDraft) -> SyncResult<Task> {
        let (list_id, token) = {
            let state = self.active_ready_mut()?;
            let id = state.list.id.ok_or(SyncError::ReferenceUnresolvable("list"))?;
            (id, state.list.route_key())
        };
        let api = self.api.clone();
        let body = draft.create_body(list_id, token.as_deref());
        let task = api.create_task(&body).map_err(SyncError::into_mutation)?;
        let state = self.active_ready_mut()?;
        state.tasks.insert(0, task.clone());
        self.refresh_active_counts();
        self.notify();
        Ok(task)
    }

    /// Optimistic update: apply the draft locally, broadcast, then PATCH.
    /// On rejection the captured pre-mutation task is restored exactly.
    pub fn update_task(&mut self, task_id: i64, draft: &TaskDraft) -> SyncResult<()> {
        let api = self.api.clone();
        let snapshot = {
            let state = self.active_ready_mut()?;
            let idx = position_of(&state.tasks, task_id)
                .ok_or(SyncError::ReferenceUnresolvable("task"))?;
            let before = state.tasks[idx].clone();
            draft.apply_to(&mut state.tasks[idx]);
            (idx, before)
        };
        self.refresh_active_counts();
        self.notify();

        match api.update_task(task_id, &draft.patch_body()) {
            Ok(_) => Ok(()),
            Err(e) => {
                self.restore_task(snapshot);
                Err(e.into_mutation())
            }
        }
    }

    /// Optimistic delete: drop locally, broadcast, then DELETE. On failure
    /// the task returns to its former position.
    pub fn delete_task(&mut self, task_id: i64) -> SyncResult<()> {
        let api = self.api.clone();
        let snapshot = {
            let state = self.active_ready_mut()?;
            let idx = position_of(&state.tasks, task_id)
                .ok_or(SyncError::ReferenceUnresolvable("task"))?;
            (idx, state.tasks.remove(idx))
        };
        self.refresh_active_counts();
        self.notify();

        match api.delete_task(task_id) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.restore_task(snapshot);
                Err(e.into_mutation())
            }
        }
    }

    /// Flip the completion flag optimistically, then confirm against the
    /// server. Deployments disagree on whether the field is `done` or
    /// `is_done`, so an uninformative response triggers one retry with the
    /// alternate name; if neither attempt reports a boolean, or a request
    /// fails outright, the pre-toggle value comes back. The server's
    /// answer is adopted even when it contradicts the optimistic guess.
    pub fn toggle_done(&mut self, task_id: i64) -> SyncResult<bool> {
        let api = self.api.clone();
        let prev = {
            let state = self.active_ready_mut()?;
            let idx = position_of(&state.tasks, task_id)
                .ok_or(SyncError::ReferenceUnresolvable("task"))?;
            let prev = state.tasks[idx].done;
            state.tasks[idx].done = !prev;
            prev
        };
        let next = !prev;
        self.refresh_active_counts();
        self.notify();

        let outcome = (|| -> SyncResult<Option<bool>> {
            let first = api.update_task(task_id, &json!({ "done": next }))?;
            if let Some(b) = confirmed_done(&first) {
                return Ok(Some(b));
            }
            let second = api.update_task(task_id, &json!({ "is_done": next }))?;
            Ok(confirmed_done(&second))
        })();

        let (value, result) = match outcome {
            Ok(Some(server)) => (server, Ok(server)),
            Ok(None) => (prev, Err(SyncError::AmbiguousServerResponse)),
            Err(e) => (prev, Err(e.into_mutation())),
        };
        if let Ok(state) = self.active_ready_mut() {
            if let Some(idx) = position_of(&state.tasks, task_id) {
                state.tasks[idx].done = value;
            }
        }
        self.refresh_active_counts();
        self.notify();
        result
    }

    fn restore_task(&mut self, (idx, task): (usize, Task)) {
        if let Ok(state) = self.active_ready_mut() {
            let task_id = task.id;
            match task_id.and_then(|id| position_of(&state.tasks, id)) {
                Some(cur) => state.tasks[cur] = task,
                None => {
                    let at = idx.min(state.tasks.len());
                    state.tasks.insert(at, task);
                }
            }
        }
        self.refresh_active_counts();
        self.notify();
    }

    // ---- list mutations ----

    pub fn create_list(&mut self, draft: &ListDraft) -> SyncResult<TodoList> {
        let api = self.api.clone();
        let created = api.create_list(&draft.body()).map_err(SyncError::into_mutation)?;
        self.lists.push(created.clone());
        self.notify();
        Ok(created)
    }

    /// PATCH the active list, with the numeric-key fallback the read path
    /// uses: a purely numeric token that the token endpoint rejects is
    /// retried as an id. Server fields win; embedded tasks survive when
    /// the response omits them.
    pub fn update_active_list(&mut self, draft: &ListDraft) -> SyncResult<TodoList> {
        let api = self.api.clone();
        let route = {
            let state = self.active_ready_mut()?;
            state
                .list
                .route_key()
                .ok_or(SyncError::ReferenceUnresolvable("list"))?
        };
        let body = draft.body();
        let server = with_numeric_retry(&route, |r| api.update_list(r, &body))
            .map_err(SyncError::into_mutation)?;
        let merged = {
            let state = self.active_ready_mut()?;
            let merged = state.list.merged_with(&server);
            if let Some(tasks) = merged.tasks.clone() {
                state.tasks = tasks;
            }
            state.list = TodoList { tasks: None, ..merged.clone() };
            merged
        };
        if let Some(key) = merged.key() {
            for l in &mut self.lists {
                if l.key().as_deref() == Some(key.as_str()) {
                    *l = l.merged_with(&server);
                }
            }
        }
        self.refresh_active_counts();
        self.notify();
        Ok(merged)
    }

    /// DELETE the active list, drop it from the collection and every
    /// derived cache, and broadcast the explicit no-active-list state.
    pub fn delete_active_list(&mut self) -> SyncResult<()> {
        let api = self.api.clone();
        let (route, key) = {
            let state = self.active_ready_mut()?;
            let route = state
                .list
                .route_key()
                .ok_or(SyncError::ReferenceUnresolvable("list"))?;
            (route, state.list.key())
        };
        with_numeric_retry(&route, |r| api.delete_list(r)).map_err(SyncError::into_mutation)?;
        if let Some(key) = key {
            self.lists.retain(|l| l.key().as_deref() != Some(key.as_str()));
            self.counts.remove(&key);
        }
        self.load_gen += 1; // supersede any in-flight load of the dead list
        self.active = ActiveView::None;
        self.notify();
        Ok(())
    }
}

fn position_of(tasks: &[Task], task_id: i64) -> Option<usize> {
    tasks.iter().position(|t| t.id == Some(task_id))
}

fn confirmed_done(v: &Value) -> Option<bool> {
    v.get("done")
        .and_then(|x| x.as_bool())
        .or_else(|| v.get("is_done").and_then(|x| x.as_bool()))
}

/// Run an operation against the token endpoint; if the key is purely
/// numeric and the attempt was rejected, try once more against the id
/// endpoint.
fn with_numeric_retry<T>(route: &str, f: impl Fn(&str) -> SyncResult<T>) -> SyncResult<T> {
    match f(route) {
        Ok(v) => Ok(v),
        Err(e) => {
            if route.parse::<i64>().is_ok() {
                f(route)
            } else {
                Err(e)
            }
        }
    }
}

/// The list fetch strategy, independent of the store so worker threads can
/// run it with a cloned client.
///
/// 1. a caller-supplied list that already embeds its tasks is used as-is;
/// 2. list metadata comes from the token endpoint, retried on the id
///    endpoint for purely numeric keys — unresolvable metadata is fatal;
/// 3. tasks embedded on the fetched list win;
/// 4. otherwise tasks-by-list-id, tasks-by-list-path, tasks-by-list-token
///    are tried in that order, advancing only when the request itself
///    fails — an exhausted chain degrades to an empty set.
pub fn fetch_list_state(api: &ApiClient, lref: &ListRef) -> SyncResult<ListState> {
    if let ListRef::List(l) = lref {
        if let Some(tasks) = &l.tasks {
            let tasks = tasks.clone();
            let list = TodoList { tasks: None, ..(**l).clone() };
            return Ok(ListState { list, tasks });
        }
    }
    let route = lref
        .route_key()
        .ok_or(SyncError::ReferenceUnresolvable("list"))?;

    let list = with_numeric_retry(&route, |r| api.fetch_list(r))?;

    if let Some(tasks) = list.tasks.clone() {
        let list = TodoList { tasks: None, ..list };
        return Ok(ListState { list, tasks });
    }

    let tasks = match fetch_tasks_chain(api, &list, &route) {
        Ok(tasks) => tasks,
        Err(e) => {
            warn!("task fetch degraded to empty for {}: {}", route, e);
            Vec::new()
        }
    };
    Ok(ListState { list, tasks })
}

fn fetch_tasks_chain(api: &ApiClient, list: &TodoList, route: &str) -> SyncResult<Vec<Task>> {
    let mut last: Option<SyncError> = None;

    if let Some(id) = list.id {
        match api.tasks_by_list_id(id) {
            Ok(tasks) => return Ok(tasks),
            Err(e) => last = Some(e),
        }
    }
    match api.tasks_by_list_path(route) {
        Ok(tasks) => return Ok(tasks),
        Err(e) => last = Some(e),
    }
    match api.tasks_by_list_token(route) {
        Ok(tasks) => return Ok(tasks),
        Err(e) => last = Some(e),
    }
    Err(SyncError::FetchExhausted(
        last.map(|e| e.to_string()).unwrap_or_else(|| "no strategy applicable".into()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::ScriptedTransport;
    use crate::model::TaskDraft;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    fn store_with(t: &Arc<ScriptedTransport>) -> SyncStore {
        SyncStore::new(ApiClient::new("http://server", t.clone()))
    }

    fn list_value(v: serde_json::Value) -> TodoList {
        TodoList::from_value(&v)
    }

    fn ready_store(t: &Arc<ScriptedTransport>, list: serde_json::Value) -> SyncStore {
        let mut store = store_with(t);
        let l = list_value(list);
        store.load_list(&ListRef::from(&l)).expect("fast-path load");
        store
    }

    fn active_tasks(store: &SyncStore) -> Vec<Task> {
        store.active_state().expect("ready").tasks.clone()
    }

    #[test]
    fn embedded_tasks_fast_path_makes_no_network_call() {
        let t = ScriptedTransport::new();
        let mut store = store_with(&t);
        let l = list_value(json!({
            "id": 1, "public_token": "tok", "name": "L",
            "tasks": [{ "id": 5, "name": "carried", "done": false }]
        }));
        store.load_list(&ListRef::from(&l)).unwrap();
        assert_eq!(t.call_count(), 0);
        assert_eq!(active_tasks(&store).len(), 1);
        assert_eq!(store.active_counters(), Some(Counters { done: 0, open: 1 }));
    }

    #[test]
    fn numeric_key_retries_the_id_endpoint_after_rejection() {
        let t = ScriptedTransport::new();
        t.on("GET", "/lists/42/tasks/", 200, json!([]));
        t.once("GET", "/lists/42/", 404, json!({ "detail": "no token" }));
        t.once("GET", "/lists/42/", 200, json!({ "id": 42, "name": "Legacy" }));
        let mut store = store_with(&t);
        store.load_list(&ListRef::from(42)).unwrap();
        let state = store.active_state().expect("ready");
        assert_eq!(state.list.name, "Legacy");
        assert_eq!(t.call_count(), 3);
    }

    #[test]
    fn unresolvable_metadata_is_a_hard_error() {
        let t = ScriptedTransport::new();
        t.fail("GET", "/lists/xyz/");
        let mut store = store_with(&t);
        let err = store.load_list(&ListRef::from("xyz")).unwrap_err();
        assert!(matches!(err, SyncError::Network(_)));
        assert!(matches!(store.active(), ActiveView::Failed(_)));
        // non-numeric key: no id retry
        assert_eq!(t.call_count(), 1);
    }

    #[test]
    fn task_fetch_falls_back_past_a_404_to_the_path_endpoint() {
        let t = ScriptedTransport::new();
        t.on("GET", "/lists/tok/tasks/", 200, json!([{ "id": 1, "name": "found" }]));
        t.once("GET", "/lists/1/tasks/", 404, json!({ "detail": "nope" }));
        t.on("GET", "/lists/tok/", 200, json!({ "id": 1, "public_token": "tok", "name": "L" }));
        let mut store = store_with(&t);
        store.load_list(&ListRef::from("tok")).unwrap();
        let tasks = active_tasks(&store);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, Some(1));
    }

    #[test]
    fn an_empty_task_set_is_success_not_a_trigger_for_fallback() {
        let t = ScriptedTransport::new();
        t.on("GET", "/lists/1/tasks/", 200, json!([]));
        t.on("GET", "/lists/tok/", 200, json!({ "id": 1, "public_token": "tok", "name": "L" }));
        let mut store = store_with(&t);
        store.load_list(&ListRef::from("tok")).unwrap();
        assert!(active_tasks(&store).is_empty());
        // one list fetch + one task fetch, no further strategies
        assert_eq!(t.call_count(), 2);
    }

    #[test]
    fn exhausted_task_chain_degrades_to_an_empty_ready_list() {
        let t = ScriptedTransport::new();
        t.on("GET", "/lists/tok/", 200, json!({ "id": 1, "public_token": "tok", "name": "L" }));
        t.fail("GET", "/lists/1/tasks/");
        t.fail("GET", "/lists/tok/tasks/");
        t.fail("GET", "/tasks/?list_token=tok");
        let mut store = store_with(&t);
        store.load_list(&ListRef::from("tok")).unwrap();
        assert!(matches!(store.active(), ActiveView::Ready(_)));
        assert!(active_tasks(&store).is_empty());
        assert_eq!(t.call_count(), 4);
    }

    #[test]
    fn loading_twice_without_mutation_yields_identical_views() {
        let t = ScriptedTransport::new();
        t.on("GET", "/lists/tok/", 200, json!({
            "id": 1, "public_token": "tok", "name": "L",
            "categories": [{ "id": 1, "name": "Work" }],
            "tasks": [
                { "id": 1, "name": "a", "done": true, "categories": [1] },
                { "id": 2, "name": "b", "done": false }
            ]
        }));
        let mut store = store_with(&t);
        store.load_list(&ListRef::from("tok")).unwrap();
        let c1 = store.active_counters();
        let g1: Vec<(String, usize)> = store
            .active_buckets()
            .iter()
            .map(|b| (b.name.clone(), b.tasks.len()))
            .collect();
        store.load_list(&ListRef::from("tok")).unwrap();
        let c2 = store.active_counters();
        let g2: Vec<(String, usize)> = store
            .active_buckets()
            .iter()
            .map(|b| (b.name.clone(), b.tasks.len()))
            .collect();
        assert_eq!(c1, c2);
        assert_eq!(g1, g2);
    }

    #[test]
    fn superseded_load_results_are_silently_discarded() {
        let t = ScriptedTransport::new();
        let mut store = store_with(&t);
        let stale = store.begin_load();
        let current = store.begin_load();

        let won = ListState {
            list: list_value(json!({ "id": 2, "public_token": "new", "name": "new" })),
            tasks: vec![],
        };
        let lost = ListState {
            list: list_value(json!({ "id": 1, "public_token": "old", "name": "old" })),
            tasks: vec![],
        };
        assert!(!store.commit_load(stale, Ok(lost)));
        assert!(matches!(store.active(), ActiveView::Loading));
        // a stale failure is equally invisible
        assert!(!store.commit_load(stale, Err(SyncError::Network("late".into()))));
        assert!(matches!(store.active(), ActiveView::Loading));

        assert!(store.commit_load(current, Ok(won)));
        assert_eq!(store.active_state().unwrap().list.name, "new");
    }

    #[test]
    fn create_task_prepends_the_server_task_and_recounts() {
        let t = ScriptedTransport::new();
        t.on("POST", "/tasks/", 201, json!({ "id": 9, "name": "Milk", "done": false }));
        let mut store = ready_store(&t, json!({
            "id": 1, "public_token": "tok", "name": "L",
            "tasks": [{ "id": 5, "name": "old", "done": true }]
        }));
        let draft = TaskDraft { title: "Milk".into(), priority: 3, ..Default::default() };
        let created = store.create_task(&draft).unwrap();
        assert_eq!(created.id, Some(9));
        let tasks = active_tasks(&store);
        assert_eq!(tasks[0].id, Some(9));
        assert_eq!(store.active_counters(), Some(Counters { done: 1, open: 1 }));
        assert_eq!(store.counters_for("tok"), Some(Counters { done: 1, open: 1 }));

        let call = &t.calls()[0];
        assert_eq!(call.method, "POST");
        assert!(call.url.ends_with("/api/tasks/"));
        let body = call.body.as_ref().unwrap();
        assert_eq!(body.get("list"), Some(&json!(1)));
        assert_eq!(body.get("public_token"), Some(&json!("tok")));
        assert_eq!(body.get("name"), Some(&json!("Milk")));
    }

    #[test]
    fn rejected_update_restores_the_exact_prior_task_set() {
        let t = ScriptedTransport::new();
        t.on("PATCH", "/tasks/5/", 500, json!({ "detail": "boom" }));
        let mut store = ready_store(&t, json!({
            "id": 1, "public_token": "tok", "name": "L",
            "tasks": [
                { "id": 5, "name": "alpha", "done": false, "priority": 2 },
                { "id": 6, "name": "beta", "done": true }
            ]
        }));
        let before = active_tasks(&store);
        let draft = TaskDraft { title: "renamed".into(), priority: 4, ..Default::default() };
        let err = store.update_task(5, &draft).unwrap_err();
        assert!(matches!(err, SyncError::MutationRejected { status: 500, .. }));
        assert_eq!(active_tasks(&store), before);
    }

    #[test]
    fn rejected_delete_restores_the_task_at_its_position() {
        let t = ScriptedTransport::new();
        t.on("DELETE", "/tasks/6/", 403, json!({ "detail": "no" }));
        let mut store = ready_store(&t, json!({
            "id": 1, "public_token": "tok", "name": "L",
            "tasks": [
                { "id": 5, "name": "a" },
                { "id": 6, "name": "b" },
                { "id": 7, "name": "c" }
            ]
        }));
        let before = active_tasks(&store);
        let err = store.delete_task(6).unwrap_err();
        assert!(matches!(err, SyncError::MutationRejected { status: 403, .. }));
        assert_eq!(active_tasks(&store), before);
    }

    #[test]
    fn successful_delete_removes_locally_and_remotely() {
        let t = ScriptedTransport::new();
        t.on_raw("DELETE", "/tasks/5/", 204, "");
        let mut store = ready_store(&t, json!({
            "id": 1, "public_token": "tok", "name": "L",
            "tasks": [{ "id": 5, "name": "a", "done": false }]
        }));
        store.delete_task(5).unwrap();
        assert!(active_tasks(&store).is_empty());
        assert_eq!(store.active_counters(), Some(Counters { done: 0, open: 0 }));
    }

    #[test]
    fn toggle_adopts_a_confirmation_under_the_primary_name() {
        let t = ScriptedTransport::new();
        t.on("PATCH", "/tasks/5/", 200, json!({ "id": 5, "done": true }));
        let mut store = ready_store(&t, json!({
            "id": 1, "public_token": "tok", "name": "L",
            "tasks": [{ "id": 5, "name": "a", "done": false }]
        }));
        assert_eq!(store.toggle_done(5).unwrap(), true);
        assert!(active_tasks(&store)[0].done);
        let calls = t.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].body.as_ref().unwrap(), &json!({ "done": true }));
    }

    #[test]
    fn toggle_accepts_the_alternate_alias_with_identical_result() {
        let t = ScriptedTransport::new();
        t.on("PATCH", "/tasks/5/", 200, json!({ "id": 5, "is_done": true }));
        let mut store = ready_store(&t, json!({
            "id": 1, "public_token": "tok", "name": "L",
            "tasks": [{ "id": 5, "name": "a", "done": false }]
        }));
        assert_eq!(store.toggle_done(5).unwrap(), true);
        assert!(active_tasks(&store)[0].done);
    }

    #[test]
    fn ambiguous_first_response_triggers_the_alternate_field_retry() {
        let t = ScriptedTransport::new();
        t.once("PATCH", "/tasks/5/", 200, json!({ "id": 5 }));
        t.once("PATCH", "/tasks/5/", 200, json!({ "id": 5, "is_done": true }));
        let mut store = ready_store(&t, json!({
            "id": 1, "public_token": "tok", "name": "L",
            "tasks": [{ "id": 5, "name": "a", "done": false }]
        }));
        assert_eq!(store.toggle_done(5).unwrap(), true);
        let calls = t.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].body.as_ref().unwrap(), &json!({ "done": true }));
        assert_eq!(calls[1].body.as_ref().unwrap(), &json!({ "is_done": true }));
    }

    #[test]
    fn toggle_with_no_boolean_under_either_alias_rolls_back() {
        let t = ScriptedTransport::new();
        t.on("PATCH", "/tasks/5/", 200, json!({ "id": 5 }));
        let mut store = ready_store(&t, json!({
            "id": 1, "public_token": "tok", "name": "L",
            "tasks": [{ "id": 5, "name": "a", "done": false }]
        }));
        let err = store.toggle_done(5).unwrap_err();
        assert!(matches!(err, SyncError::AmbiguousServerResponse));
        assert!(!active_tasks(&store)[0].done);
        assert_eq!(store.active_counters(), Some(Counters { done: 0, open: 1 }));
    }

    #[test]
    fn toggle_adopts_a_server_value_that_contradicts_the_guess() {
        let t = ScriptedTransport::new();
        t.on("PATCH", "/tasks/5/", 200, json!({ "id": 5, "done": false }));
        let mut store = ready_store(&t, json!({
            "id": 1, "public_token": "tok", "name": "L",
            "tasks": [{ "id": 5, "name": "a", "done": false }]
        }));
        assert_eq!(store.toggle_done(5).unwrap(), false);
        assert!(!active_tasks(&store)[0].done);
    }

    #[test]
    fn toggle_rolls_back_when_a_request_throws() {
        let t = ScriptedTransport::new();
        t.fail("PATCH", "/tasks/5/");
        let mut store = ready_store(&t, json!({
            "id": 1, "public_token": "tok", "name": "L",
            "tasks": [{ "id": 5, "name": "a", "done": true }]
        }));
        assert!(store.toggle_done(5).is_err());
        assert!(active_tasks(&store)[0].done);
    }

    #[test]
    fn deleting_the_list_broadcasts_the_distinct_no_active_signal() {
        let t = ScriptedTransport::new();
        t.on_raw("DELETE", "/lists/tok/", 204, "");
        let mut store = ready_store(&t, json!({
            "id": 1, "public_token": "tok", "name": "L", "tasks": []
        }));
        let seen: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        store.subscribe(move |s| {
            sink.borrow_mut().push(match s.active() {
                ActiveView::None => "none",
                ActiveView::Loading => "loading",
                ActiveView::Failed(_) => "failed",
                ActiveView::Ready(_) => "ready",
            });
        });
        store.delete_active_list().unwrap();
        assert_eq!(seen.borrow().last(), Some(&"none"));
        assert!(store.lists().is_empty());
        assert_eq!(store.counters_for("tok"), None);

        // loading is a different observable state
        store.begin_load();
        assert_eq!(seen.borrow().last(), Some(&"loading"));
    }

    #[test]
    fn list_update_merges_server_fields_and_keeps_tasks() {
        let t = ScriptedTransport::new();
        t.on("PATCH", "/lists/tok/", 200, json!({
            "id": 1, "public_token": "tok", "name": "Renamed", "priority": 1
        }));
        let mut store = ready_store(&t, json!({
            "id": 1, "public_token": "tok", "name": "L",
            "tasks": [{ "id": 5, "name": "kept" }]
        }));
        let ticket = store.begin_lists_load();
        store.commit_lists(
            ticket,
            Ok(vec![list_value(json!({ "id": 1, "public_token": "tok", "name": "L" }))]),
        );
        let draft = ListDraft { name: "Renamed".into(), description: String::new(), priority: 1 };
        let merged = store.update_active_list(&draft).unwrap();
        assert_eq!(merged.name, "Renamed");
        let state = store.active_state().unwrap();
        assert_eq!(state.list.name, "Renamed");
        assert_eq!(state.tasks.len(), 1, "embedded tasks preserved");
        assert_eq!(store.lists()[0].name, "Renamed");
    }

    #[test]
    fn counter_sweep_commits_only_current_tickets() {
        let t = ScriptedTransport::new();
        let mut store = store_with(&t);
        let ticket = store.begin_lists_load();
        store.commit_lists(
            ticket,
            Ok(vec![
                list_value(json!({ "id": 1, "public_token": "a", "name": "A" })),
                list_value(json!({ "id": 2, "public_token": "b", "name": "B" })),
            ]),
        );
        assert_eq!(store.lists_missing_counts().len(), 2);

        let stale = store.begin_count_sweep();
        let current = store.begin_count_sweep();
        let fetched = list_value(json!({
            "id": 1, "public_token": "a", "name": "A",
            "tasks": [{ "id": 1, "name": "x", "done": true }]
        }));
        assert!(!store.commit_counts(stale, "a", Ok(fetched.clone())));
        assert_eq!(store.counters_for("a"), None);
        assert!(store.commit_counts(current, "a", Ok(fetched)));
        assert_eq!(store.counters_for("a"), Some(Counters { done: 1, open: 0 }));
        // a list fetched without embedded tasks contributes nothing
        assert!(!store.commit_counts(
            current,
            "b",
            Ok(list_value(json!({ "id": 2, "public_token": "b", "name": "B" })))
        ));
    }

    #[test]
    fn full_scenario_counters_track_create_toggle_delete() {
        let t = ScriptedTransport::new();
        t.on("POST", "/lists/", 201, json!({
            "id": 10, "public_token": "g", "name": "Groceries", "priority": 2
        }));
        t.on("GET", "/lists/10/tasks/", 200, json!([]));
        t.on("GET", "/lists/g/", 200, json!({
            "id": 10, "public_token": "g", "name": "Groceries", "priority": 2
        }));
        t.on("POST", "/tasks/", 201, json!({ "id": 1, "name": "Milk", "done": false }));
        t.on("PATCH", "/tasks/1/", 200, json!({ "id": 1, "done": true }));
        t.on_raw("DELETE", "/tasks/1/", 204, "");

        let mut store = store_with(&t);
        let created = store
            .create_list(&ListDraft { name: "Groceries".into(), description: String::new(), priority: 2 })
            .unwrap();
        assert_eq!(created.id, Some(10));
        assert_eq!(store.lists().len(), 1);

        store.load_list(&ListRef::from(&created)).unwrap();
        assert_eq!(store.active_counters(), Some(Counters { done: 0, open: 0 }));

        store
            .create_task(&TaskDraft { title: "Milk".into(), priority: 3, ..Default::default() })
            .unwrap();
        assert_eq!(store.active_counters(), Some(Counters { done: 0, open: 1 }));

        store.toggle_done(1).unwrap();
        assert_eq!(store.active_counters(), Some(Counters { done: 1, open: 0 }));
        assert_eq!(store.counters_for("g"), Some(Counters { done: 1, open: 0 }));

        store.delete_task(1).unwrap();
        assert_eq!(store.active_counters(), Some(Counters { done: 0, open: 0 }));
    }

    #[test]
    fn observers_are_notified_synchronously_per_commit() {
        let t = ScriptedTransport::new();
        t.on("POST", "/tasks/", 201, json!({ "id": 9, "name": "x" }));
        let mut store = ready_store(&t, json!({
            "id": 1, "public_token": "tok", "name": "L", "tasks": []
        }));
        let hits = Rc::new(RefCell::new(0usize));
        let sink = hits.clone();
        store.subscribe(move |_| *sink.borrow_mut() += 1);
        store
            .create_task(&TaskDraft { title: "x".into(), priority: 3, ..Default::default() })
            .unwrap();
        assert_eq!(*hits.borrow(), 1);
    }
}
