// app.rs
use crate::api::ApiClient;
use crate::config::ServerConfig;
use crate::error::SyncResult;
use crate::model::{DEFAULT_PRIORITY, ListDraft, ListRef, MAX_PRIORITY, Task, TaskDraft, TodoList};
use crate::store::{self, ListState, ListsTicket, LoadTicket, SweepTicket, SyncStore};
use crate::tui::parse_due_date;
use std::cell::Cell;
use std::rc::Rc;
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::thread;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Pane {
    Lists,
    Tasks,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TaskFormStep {
    Title,
    DueDate,
    Priority,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ListFormStep {
    Name,
    Description,
    Priority,
}

#[derive(PartialEq)]
pub enum InputMode {
    Normal,
    EditingTask,
    EditingList,
    ConfirmDeleteList,
}

/// Results worker threads hand back to the owning thread. Every message
/// carries the ticket issued when its fetch started; the store discards
/// anything superseded in the meantime.
pub enum Inbound {
    Lists(ListsTicket, SyncResult<Vec<TodoList>>),
    Active(LoadTicket, SyncResult<ListState>),
    Counts(SweepTicket, String, SyncResult<TodoList>),
}

pub struct App {
    pub store: SyncStore,

    pub input_mode: InputMode,
    pub focus: Pane,
    pub selected_list: usize,
    pub selected_task: usize,
    pub error_message: Option<String>,

    pub task_step: TaskFormStep,
    pub list_step: ListFormStep,
    pub input_buffer: String,
    task_form: TaskDraft,
    list_form: ListDraft,
    editing_task: Option<i64>,
    editing_list: bool,

    dirty: Rc<Cell<bool>>,
    tx: Sender<Inbound>,
    rx: Receiver<Inbound>,
}

impl App {
    pub fn new(cfg: &ServerConfig) -> SyncResult<Self> {
        let api = ApiClient::over_http(cfg.base_url.clone())?;
        let mut store = SyncStore::new(api);
        let dirty = Rc::new(Cell::new(true));
        let flag = dirty.clone();
        store.subscribe(move |_| flag.set(true));
        let (tx, rx) = channel();
        Ok(Self {
            store,
            input_mode: InputMode::Normal,
            focus: Pane::Lists,
            selected_list: 0,
            selected_task: 0,
            error_message: None,
            task_step: TaskFormStep::Title,
            list_step: ListFormStep::Name,
            input_buffer: String::new(),
            task_form: TaskDraft::default(),
            list_form: ListDraft::default(),
            editing_task: None,
            editing_list: false,
            dirty,
            tx,
            rx,
        })
    }

    /// True once since the last committed change; the TUI redraws on it.
    pub fn take_dirty(&self) -> bool {
        self.dirty.replace(false)
    }

    // ---- background fetches ----

    pub fn start_background_sync(&mut self) {
        let ticket = self.store.begin_lists_load();
        let api = self.store.api().clone();
        let tx = self.tx.clone();
        thread::spawn(move || {
            let _ = tx.send(Inbound::Lists(ticket, api.fetch_lists()));
        });
    }

    /// Apply everything the workers sent since the last tick. Stale
    /// tickets die inside the store commits.
    pub fn drain_inbound(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(Inbound::Lists(ticket, result)) => {
                    if self.store.commit_lists(ticket, result) {
                        self.clamp_selection();
                        self.start_count_sweep();
                    }
                }
                Ok(Inbound::Active(ticket, result)) => {
                    let failed = result.as_ref().err().map(|e| e.to_string());
                    if self.store.commit_load(ticket, result) {
                        self.selected_task = 0;
                        if let Some(msg) = failed {
                            self.error_message = Some(msg);
                        }
                    }
                }
                Ok(Inbound::Counts(ticket, key, result)) => {
                    self.store.commit_counts(ticket, &key, result);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    fn start_count_sweep(&mut self) {
        let pending = self.store.lists_missing_counts();
        if pending.is_empty() {
            return;
        }
        let ticket = self.store.begin_count_sweep();
        let api = self.store.api().clone();
        let tx = self.tx.clone();
        thread::spawn(move || {
            for (key, route) in pending {
                let _ = tx.send(Inbound::Counts(ticket, key, api.fetch_list(&route)));
            }
        });
    }

    // ---- navigation ----

    pub fn sorted_list_at(&self, idx: usize) -> Option<TodoList> {
        self.store.sorted_lists().get(idx).map(|l| (*l).clone())
    }

    /// The detail pane's rows: bucket order, flattened. A task in two
    /// categories appears twice, once per bucket.
    pub fn visible_tasks(&self) -> Vec<Task> {
        let mut out = Vec::new();
        for bucket in self.store.active_buckets() {
            for t in &bucket.tasks {
                out.push((*t).clone());
            }
        }
        out
    }

    pub fn selected_task_id(&self) -> Option<i64> {
        self.visible_tasks().get(self.selected_task).and_then(|t| t.id)
    }

    pub fn clamp_selection(&mut self) {
        let lists = self.store.lists().len();
        if self.selected_list >= lists {
            self.selected_list = lists.saturating_sub(1);
        }
        let tasks = self.visible_tasks().len();
        if self.selected_task >= tasks {
            self.selected_task = tasks.saturating_sub(1);
        }
    }

    /// Load the highlighted list. Navigation-carried task state resolves
    /// on-thread without a request; everything else goes through a worker,
    /// superseding whatever load was still in flight.
    pub fn open_selected_list(&mut self) {
        let Some(mut list) = self.sorted_list_at(self.selected_list) else {
            return;
        };
        self.selected_task = 0;
        self.error_message = None;
        self.focus = Pane::Tasks;
        // re-opening the active list carries its live task state along
        if let Some(state) = self.store.active_state() {
            if list.key().is_some() && state.list.key() == list.key() {
                list = state.merged_list();
            }
        }
        let lref = ListRef::from(&list);
        if list.tasks.is_some() {
            if let Err(e) = self.store.load_list(&lref) {
                self.error_message = Some(e.to_string());
            }
            return;
        }
        self.spawn_load(lref);
    }

    /// Re-fetch the active list from the server.
    pub fn refresh_active(&mut self) {
        let Some(route) = self.store.active_state().and_then(|s| s.list.route_key()) else {
            return;
        };
        self.spawn_load(ListRef::from(route.as_str()));
    }

    fn spawn_load(&mut self, lref: ListRef) {
        log::debug!("loading list {:?}", lref.resolve_key());
        let ticket = self.store.begin_load();
        let api = self.store.api().clone();
        let tx = self.tx.clone();
        thread::spawn(move || {
            let _ = tx.send(Inbound::Active(ticket, store::fetch_list_state(&api, &lref)));
        });
    }

    // ---- task operations ----

    pub fn toggle_selected(&mut self) {
        let Some(id) = self.selected_task_id() else {
            return;
        };
        if let Err(e) = self.store.toggle_done(id) {
            self.error_message = Some(e.to_string());
        }
    }

    pub fn delete_selected_task(&mut self) {
        let Some(id) = self.selected_task_id() else {
            return;
        };
        match self.store.delete_task(id) {
            Ok(()) => self.clamp_selection(),
            Err(e) => self.error_message = Some(e.to_string()),
        }
    }

    pub fn begin_task_create(&mut self) {
        if self.store.active_state().is_none() {
            self.error_message = Some("Select a list first.".to_string());
            return;
        }
        self.editing_task = None;
        self.task_form = TaskDraft { priority: DEFAULT_PRIORITY, ..TaskDraft::default() };
        self.input_buffer.clear();
        self.task_step = TaskFormStep::Title;
        self.input_mode = InputMode::EditingTask;
        self.error_message = None;
    }

    pub fn begin_task_edit(&mut self) {
        let Some(task) = self.visible_tasks().get(self.selected_task).cloned() else {
            return;
        };
        self.editing_task = task.id;
        self.task_form = TaskDraft {
            title: task.title.clone(),
            description: task.description.clone().unwrap_or_default(),
            priority: task.priority,
            due_date: task.due_date.clone(),
            reminder_at: task.reminder_at.clone(),
        };
        self.input_buffer = task.title;
        self.task_step = TaskFormStep::Title;
        self.input_mode = InputMode::EditingTask;
        self.error_message = None;
    }

    pub fn submit_task_step(&mut self) {
        match self.task_step {
            TaskFormStep::Title => {
                if self.input_buffer.trim().is_empty() {
                    self.error_message = Some("Title cannot be empty.".to_string());
                    return;
                }
                self.task_form.title = self.input_buffer.trim().to_string();
                self.input_buffer = self.task_form.due_date.clone().unwrap_or_default();
                self.task_step = TaskFormStep::DueDate;
            }
            TaskFormStep::DueDate => {
                let raw = self.input_buffer.trim().to_string();
                if raw.is_empty() {
                    self.task_form.due_date = None;
                } else {
                    match parse_due_date(&raw) {
                        Ok(parsed) => self.task_form.due_date = Some(parsed),
                        Err(e) => {
                            self.error_message = Some(e);
                            return;
                        }
                    }
                }
                self.input_buffer = self.task_form.priority.to_string();
                self.task_step = TaskFormStep::Priority;
                self.error_message = None;
            }
            TaskFormStep::Priority => {
                if let Some(p) = parse_priority(&self.input_buffer) {
                    self.task_form.priority = p;
                } else if !self.input_buffer.trim().is_empty() {
                    self.error_message = Some("Priority must be 0-5.".to_string());
                    return;
                }
                self.finish_task_form();
            }
        }
    }

    fn finish_task_form(&mut self) {
        let draft = self.task_form.clone();
        let result = match self.editing_task {
            Some(id) => self.store.update_task(id, &draft),
            None => self.store.create_task(&draft).map(|_| ()),
        };
        self.input_mode = InputMode::Normal;
        self.input_buffer.clear();
        match result {
            Ok(()) => self.error_message = None,
            Err(e) => self.error_message = Some(e.to_string()),
        }
    }

    // ---- list operations ----

    pub fn begin_list_create(&mut self) {
        self.editing_list = false;
        self.list_form = ListDraft { priority: DEFAULT_PRIORITY, ..ListDraft::default() };
        self.input_buffer.clear();
        self.list_step = ListFormStep::Name;
        self.input_mode = InputMode::EditingList;
        self.error_message = None;
    }

    pub fn begin_list_edit(&mut self) {
        let Some(state) = self.store.active_state() else {
            self.error_message = Some("Select a list first.".to_string());
            return;
        };
        self.editing_list = true;
        self.list_form = ListDraft {
            name: state.list.name.clone(),
            description: state.list.description.clone().unwrap_or_default(),
            priority: state.list.priority,
        };
        self.input_buffer = state.list.name.clone();
        self.list_step = ListFormStep::Name;
        self.input_mode = InputMode::EditingList;
        self.error_message = None;
    }

    pub fn submit_list_step(&mut self) {
        match self.list_step {
            ListFormStep::Name => {
                if self.input_buffer.trim().is_empty() {
                    self.error_message = Some("Name cannot be empty.".to_string());
                    return;
                }
                self.list_form.name = self.input_buffer.trim().to_string();
                self.input_buffer = self.list_form.description.clone();
                self.list_step = ListFormStep::Description;
            }
            ListFormStep::Description => {
                self.list_form.description = self.input_buffer.trim().to_string();
                self.input_buffer = self.list_form.priority.to_string();
                self.list_step = ListFormStep::Priority;
            }
            ListFormStep::Priority => {
                if let Some(p) = parse_priority(&self.input_buffer) {
                    self.list_form.priority = p;
                } else if !self.input_buffer.trim().is_empty() {
                    self.error_message = Some("Priority must be 0-5.".to_string());
                    return;
                }
                self.finish_list_form();
            }
        }
    }

    fn finish_list_form(&mut self) {
        let draft = self.list_form.clone();
        let result = if self.editing_list {
            self.store.update_active_list(&draft).map(|_| ())
        } else {
            self.store.create_list(&draft).map(|_| ())
        };
        self.input_mode = InputMode::Normal;
        self.input_buffer.clear();
        match result {
            Ok(()) => self.error_message = None,
            Err(e) => self.error_message = Some(e.to_string()),
        }
    }

    pub fn request_delete_list(&mut self) {
        if self.store.active_state().is_some() {
            self.input_mode = InputMode::ConfirmDeleteList;
        } else {
            self.error_message = Some("Select a list first.".to_string());
        }
    }

    pub fn confirm_delete_list(&mut self) {
        self.input_mode = InputMode::Normal;
        match self.store.delete_active_list() {
            Ok(()) => {
                self.focus = Pane::Lists;
                self.selected_task = 0;
                self.clamp_selection();
                self.error_message = None;
            }
            Err(e) => self.error_message = Some(e.to_string()),
        }
    }

    pub fn cancel_input(&mut self) {
        self.input_mode = InputMode::Normal;
        self.input_buffer.clear();
        self.error_message = None;
    }
}

fn parse_priority(input: &str) -> Option<u8> {
    let p: u8 = input.trim().parse().ok()?;
    (p <= MAX_PRIORITY).then_some(p)
}
