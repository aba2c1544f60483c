// views.rs
//
// Derived read models over a list's task set: the done/open counters shown
// next to every list in the sidebar, and the category buckets the detail
// pane renders. Both are pure functions of the current task sequence and
// are recomputed on every change; nothing here is patched incrementally.

use crate::model::{CategoryRef, Task, TodoList};
use std::collections::HashMap;

pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Counters {
    pub done: usize,
    pub open: usize,
}

pub fn counters(tasks: &[Task]) -> Counters {
    let mut c = Counters::default();
    for t in tasks {
        if t.done {
            c.done += 1;
        } else {
            c.open += 1;
        }
    }
    c
}

#[derive(Clone, Debug)]
pub struct CategoryBucket<'a> {
    pub name: String,
    pub tasks: Vec<&'a Task>,
}

impl CategoryBucket<'_> {
    pub fn has_open(&self) -> bool {
        self.tasks.iter().any(|t| !t.done)
    }
}

struct CategoryDict {
    by_id: HashMap<i64, String>,
    by_name: HashMap<String, String>,
}

impl CategoryDict {
    fn of(list: &TodoList) -> CategoryDict {
        let mut by_id = HashMap::new();
        let mut by_name = HashMap::new();
        for c in &list.categories {
            if let Some(id) = c.id {
                by_id.insert(id, c.name.clone());
            }
            by_name.insert(c.name.clone(), c.name.clone());
        }
        CategoryDict { by_id, by_name }
    }

    fn resolve(&self, r: &CategoryRef) -> Option<String> {
        match r {
            CategoryRef::Embedded { name, .. } => Some(name.clone()),
            CategoryRef::Id(id) => self.by_id.get(id).cloned(),
            // a bare string may be a stringified id; resolve it through the
            // dictionary first, else take it as the name itself
            CategoryRef::Name(s) => s
                .parse::<i64>()
                .ok()
                .and_then(|id| self.by_id.get(&id).cloned())
                .or_else(|| self.by_name.get(s).cloned())
                .or_else(|| Some(s.clone())),
        }
    }
}

fn category_names(task: &Task, dict: &CategoryDict) -> Vec<String> {
    let mut names = Vec::new();
    for r in &task.categories {
        if let Some(name) = dict.resolve(r) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

/// Partition tasks into named buckets. A task carrying two categories shows
/// up in both buckets; tasks with no resolvable category land in a single
/// "Uncategorized" bucket. Buckets containing at least one open task sort
/// before buckets where everything is done; ties break by case-insensitive
/// name order.
pub fn group_by_categories<'a>(tasks: &'a [Task], list: &TodoList) -> Vec<CategoryBucket<'a>> {
    let dict = CategoryDict::of(list);
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<&Task>> = HashMap::new();
    for task in tasks {
        let mut names = category_names(task, &dict);
        if names.is_empty() {
            names.push(UNCATEGORIZED.to_string());
        }
        for name in names {
            if !groups.contains_key(&name) {
                order.push(name.clone());
            }
            groups.entry(name).or_default().push(task);
        }
    }

    let mut buckets: Vec<CategoryBucket<'a>> = order
        .into_iter()
        .map(|name| {
            let tasks = groups.remove(&name).unwrap_or_default();
            CategoryBucket { name, tasks }
        })
        .collect();
    buckets.sort_by(|a, b| {
        b.has_open()
            .cmp(&a.has_open())
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
            .then_with(|| a.name.cmp(&b.name))
    });
    buckets
}
