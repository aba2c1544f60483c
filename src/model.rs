// model.rs
//
// Canonical in-memory shapes for lists and tasks. The backend is tolerant
// about field names (`title`/`name`, `done`/`is_done`, `due_date`/`due_at`,
// ids as numbers or numeric strings), so everything coming off the wire is
// normalized here, once, into these structs. Downstream code never probes
// aliases again.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

pub const DEFAULT_PRIORITY: u8 = 3;
pub const MAX_PRIORITY: u8 = 5;

fn value_i64(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

fn value_str(v: &Value, field: &str) -> Option<String> {
    v.get(field).and_then(|x| x.as_str()).map(|s| s.to_string())
}

/// Priority comes in as a number, a numeric string, something out of range,
/// or not at all. Absent and non-numeric collapse to the default; the rest
/// is clamped into 0..=5.
pub fn normalize_priority(v: Option<&Value>) -> u8 {
    let n = match v {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match n {
        Some(f) if f.is_finite() => f.round().clamp(0.0, MAX_PRIORITY as f64) as u8,
        _ => DEFAULT_PRIORITY,
    }
}

/// Normalize a date string to UTC ISO-8601 with a trailing `Z` for
/// transmission. A bare date is expanded to midnight UTC. Strings that are
/// already `Z`-terminated, and strings nothing here can parse, pass through
/// unchanged (the backend stays the arbiter).
pub fn to_iso_z(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if value.ends_with('Z') {
        return Some(value.to_string());
    }
    if value.len() > 10 {
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Some(dt.to_utc().format("%Y-%m-%dT%H:%M:%SZ").to_string());
        }
        for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
                return Some(dt.format("%Y-%m-%dT%H:%M:%SZ").to_string());
            }
        }
        log::debug!("to_iso_z: passing through unparseable datetime {:?}", value);
        return Some(value.to_string());
    }
    if NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok() {
        return Some(format!("{}T00:00:00Z", value));
    }
    log::debug!("to_iso_z: passing through unparseable date {:?}", value);
    Some(value.to_string())
}

#[derive(Clone, Debug, PartialEq)]
pub struct Category {
    pub id: Option<i64>,
    pub name: String,
}

/// A task's category reference as the backend sends it: an embedded
/// `{id, name}` object, a bare numeric id, or a bare name string.
#[derive(Clone, Debug, PartialEq)]
pub enum CategoryRef {
    Embedded { id: Option<i64>, name: String },
    Id(i64),
    Name(String),
}

impl CategoryRef {
    pub fn from_value(v: &Value) -> Option<CategoryRef> {
        match v {
            Value::Object(_) => {
                let id = v.get("id").and_then(value_i64);
                match value_str(v, "name") {
                    Some(name) => Some(CategoryRef::Embedded { id, name }),
                    None => id.map(CategoryRef::Id),
                }
            }
            Value::Number(_) => value_i64(v).map(CategoryRef::Id),
            Value::String(s) => Some(CategoryRef::Name(s.clone())),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Task {
    pub id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub done: bool,
    pub priority: u8,
    pub due_date: Option<String>,
    pub reminder_at: Option<String>,
    pub categories: Vec<CategoryRef>,
}

impl Task {
    pub fn from_value(v: &Value) -> Task {
        let title = value_str(v, "title")
            .or_else(|| value_str(v, "name"))
            .unwrap_or_default();
        let done = v
            .get("done")
            .and_then(|x| x.as_bool())
            .or_else(|| v.get("is_done").and_then(|x| x.as_bool()))
            .unwrap_or(false);
        let due_date = value_str(v, "due_date").or_else(|| value_str(v, "due_at"));
        let mut categories = Vec::new();
        if let Some(arr) = v.get("categories").and_then(|x| x.as_array()) {
            for c in arr {
                if let Some(cr) = CategoryRef::from_value(c) {
                    categories.push(cr);
                }
            }
        } else if let Some(single) = v.get("category") {
            // some deployments inline one category instead of a sequence
            if let Some(cr) = CategoryRef::from_value(single) {
                categories.push(cr);
            }
        }
        Task {
            id: v.get("id").and_then(value_i64),
            title,
            description: value_str(v, "description").filter(|s| !s.is_empty()),
            done,
            priority: normalize_priority(v.get("priority")),
            due_date,
            reminder_at: value_str(v, "reminder_at"),
            categories,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TodoList {
    pub id: Option<i64>,
    pub public_token: Option<String>,
    pub token: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub priority: u8,
    pub categories: Vec<Category>,
    pub tasks: Option<Vec<Task>>,
}

impl TodoList {
    pub fn from_value(v: &Value) -> TodoList {
        let mut categories = Vec::new();
        if let Some(arr) = v.get("categories").and_then(|x| x.as_array()) {
            for c in arr {
                let id = c.get("id").and_then(value_i64);
                if let Some(name) = value_str(c, "name") {
                    categories.push(Category { id, name });
                } else if let Some(id) = id {
                    categories.push(Category { id: Some(id), name: format!("#{}", id) });
                }
            }
        }
        let tasks = v
            .get("tasks")
            .and_then(|x| x.as_array())
            .map(|arr| arr.iter().map(Task::from_value).collect());
        TodoList {
            id: v.get("id").and_then(value_i64),
            public_token: value_str(v, "public_token").or_else(|| value_str(v, "publicToken")),
            token: value_str(v, "token"),
            name: value_str(v, "name")
                .or_else(|| value_str(v, "title"))
                .unwrap_or_default(),
            description: value_str(v, "description").filter(|s| !s.is_empty()),
            priority: normalize_priority(v.get("priority")),
            categories,
            tasks,
        }
    }

    /// Canonical cache key: `public_token` > `token` > `#<id>`.
    pub fn key(&self) -> Option<String> {
        self.public_token
            .clone()
            .or_else(|| self.token.clone())
            .or_else(|| self.id.map(|id| format!("#{}", id)))
    }

    /// The identifier usable in an endpoint path: a token if the list has
    /// one, else the bare id digits.
    pub fn route_key(&self) -> Option<String> {
        self.public_token
            .clone()
            .or_else(|| self.token.clone())
            .or_else(|| self.id.map(|id| id.to_string()))
    }

    /// Merge fields from a server response over this list. Server fields
    /// win; the previous embedded tasks survive when the response omits
    /// them.
    pub fn merged_with(&self, server: &TodoList) -> TodoList {
        let mut out = server.clone();
        if out.id.is_none() {
            out.id = self.id;
        }
        if out.public_token.is_none() {
            out.public_token = self.public_token.clone();
        }
        if out.token.is_none() {
            out.token = self.token.clone();
        }
        if out.tasks.is_none() {
            out.tasks = self.tasks.clone();
        }
        if out.categories.is_empty() {
            out.categories = self.categories.clone();
        }
        out
    }
}

/// How callers refer to a list: an opaque token, a numeric id, or a list
/// value carried over from a previous fetch (the navigation fast path).
#[derive(Clone, Debug)]
pub enum ListRef {
    Token(String),
    Id(i64),
    List(Box<TodoList>),
}

impl ListRef {
    /// Canonical cache key, `None` when nothing identifies the list. Pure.
    pub fn resolve_key(&self) -> Option<String> {
        match self {
            ListRef::Token(s) if !s.is_empty() => Some(s.clone()),
            ListRef::Token(_) => None,
            ListRef::Id(id) => Some(format!("#{}", id)),
            ListRef::List(l) => l.key(),
        }
    }

    /// The identifier to place in an endpoint path.
    pub fn route_key(&self) -> Option<String> {
        match self {
            ListRef::Token(s) if !s.is_empty() => Some(s.clone()),
            ListRef::Token(_) => None,
            ListRef::Id(id) => Some(id.to_string()),
            ListRef::List(l) => l.route_key(),
        }
    }

}

impl From<&TodoList> for ListRef {
    fn from(l: &TodoList) -> Self {
        ListRef::List(Box::new(l.clone()))
    }
}

impl From<&str> for ListRef {
    fn from(s: &str) -> Self {
        ListRef::Token(s.to_string())
    }
}

impl From<i64> for ListRef {
    fn from(id: i64) -> Self {
        ListRef::Id(id)
    }
}

/// Fields of the task create/edit form.
#[derive(Clone, Debug, Default)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub priority: u8,
    pub due_date: Option<String>,
    pub reminder_at: Option<String>,
}

impl TaskDraft {
    /// PATCH body for an existing task, backend-native field names.
    pub fn patch_body(&self) -> Value {
        let mut body = Map::new();
        body.insert("name".to_string(), Value::String(self.title.clone()));
        body.insert(
            "description".to_string(),
            Value::String(self.description.clone()),
        );
        body.insert(
            "priority".to_string(),
            Value::from(self.priority.min(MAX_PRIORITY)),
        );
        body.insert(
            "due_at".to_string(),
            match self.due_date.as_deref().and_then(to_iso_z) {
                Some(d) => Value::String(d),
                None => Value::Null,
            },
        );
        if let Some(r) = self.reminder_at.as_deref().and_then(to_iso_z) {
            body.insert("reminder_at".to_string(), Value::String(r));
        }
        Value::Object(body)
    }

    /// POST body for task creation; carries the owning list's numeric id
    /// and originating token.
    pub fn create_body(&self, list_id: i64, public_token: Option<&str>) -> Value {
        let mut body = match self.patch_body() {
            Value::Object(m) => m,
            _ => Map::new(),
        };
        body.insert("list".to_string(), Value::from(list_id));
        if let Some(tok) = public_token {
            body.insert("public_token".to_string(), Value::String(tok.to_string()));
        }
        Value::Object(body)
    }

    /// Apply this draft onto an in-memory task (the optimistic local step).
    pub fn apply_to(&self, task: &mut Task) {
        task.title = self.title.clone();
        task.description = if self.description.is_empty() {
            None
        } else {
            Some(self.description.clone())
        };
        task.priority = self.priority.min(MAX_PRIORITY);
        task.due_date = self.due_date.as_deref().and_then(to_iso_z);
        if let Some(r) = self.reminder_at.as_deref().and_then(to_iso_z) {
            task.reminder_at = Some(r);
        }
    }
}

/// Fields of the list create/edit form.
#[derive(Clone, Debug, Default)]
pub struct ListDraft {
    pub name: String,
    pub description: String,
    pub priority: u8,
}

impl ListDraft {
    pub fn body(&self) -> Value {
        let mut body = Map::new();
        body.insert("name".to_string(), Value::String(self.name.clone()));
        body.insert(
            "description".to_string(),
            Value::String(self.description.clone()),
        );
        body.insert(
            "priority".to_string(),
            Value::from(self.priority.min(MAX_PRIORITY)),
        );
        Value::Object(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolve_key_prefers_public_token_then_token_then_id() {
        let full = TodoList::from_value(&json!({
            "id": 7, "public_token": "pub-a", "token": "tok-b", "name": "L"
        }));
        assert_eq!(full.key().as_deref(), Some("pub-a"));

        let tokenish = TodoList::from_value(&json!({
            "id": 7, "token": "tok-b", "name": "L"
        }));
        assert_eq!(tokenish.key().as_deref(), Some("tok-b"));

        let legacy = TodoList::from_value(&json!({ "id": 7, "name": "L" }));
        assert_eq!(legacy.key().as_deref(), Some("#7"));
        assert_eq!(legacy.route_key().as_deref(), Some("7"));

        let bare = TodoList::from_value(&json!({ "name": "L" }));
        assert_eq!(bare.key(), None);
    }

    #[test]
    fn resolve_key_is_deterministic_for_raw_refs() {
        assert_eq!(ListRef::from("abc").resolve_key().as_deref(), Some("abc"));
        assert_eq!(ListRef::from("abc").resolve_key(), ListRef::from("abc").resolve_key());
        assert_eq!(ListRef::from(12).resolve_key().as_deref(), Some("#12"));
        assert_eq!(ListRef::from(12).route_key().as_deref(), Some("12"));
        assert_eq!(ListRef::Token(String::new()).resolve_key(), None);
    }

    #[test]
    fn task_accepts_either_title_or_name() {
        let a = Task::from_value(&json!({ "id": 1, "title": "Milk" }));
        let b = Task::from_value(&json!({ "id": 1, "name": "Milk" }));
        assert_eq!(a.title, "Milk");
        assert_eq!(a, b);
    }

    #[test]
    fn task_normalizes_completion_aliases_to_one_bool() {
        let a = Task::from_value(&json!({ "id": 1, "name": "x", "done": true }));
        let b = Task::from_value(&json!({ "id": 1, "name": "x", "is_done": true }));
        assert!(a.done && b.done);
        let neither = Task::from_value(&json!({ "id": 1, "name": "x" }));
        assert!(!neither.done);
    }

    #[test]
    fn task_ids_accept_numbers_and_numeric_strings() {
        assert_eq!(Task::from_value(&json!({ "id": 9, "name": "x" })).id, Some(9));
        assert_eq!(Task::from_value(&json!({ "id": "9", "name": "x" })).id, Some(9));
        assert_eq!(Task::from_value(&json!({ "name": "x" })).id, None);
    }

    #[test]
    fn priority_defaults_and_clamps() {
        assert_eq!(normalize_priority(None), 3);
        assert_eq!(normalize_priority(Some(&json!("not a number"))), 3);
        assert_eq!(normalize_priority(Some(&json!(2))), 2);
        assert_eq!(normalize_priority(Some(&json!("4"))), 4);
        assert_eq!(normalize_priority(Some(&json!(99))), 5);
        assert_eq!(normalize_priority(Some(&json!(-3))), 0);
    }

    #[test]
    fn category_refs_accept_all_three_wire_shapes() {
        assert_eq!(
            CategoryRef::from_value(&json!({ "id": 2, "name": "Work" })),
            Some(CategoryRef::Embedded { id: Some(2), name: "Work".into() })
        );
        assert_eq!(CategoryRef::from_value(&json!(2)), Some(CategoryRef::Id(2)));
        assert_eq!(
            CategoryRef::from_value(&json!("Work")),
            Some(CategoryRef::Name("Work".into()))
        );
        assert_eq!(CategoryRef::from_value(&json!(null)), None);
    }

    #[test]
    fn iso_z_expands_bare_dates_to_midnight_utc() {
        assert_eq!(to_iso_z("2026-03-01").as_deref(), Some("2026-03-01T00:00:00Z"));
        assert_eq!(
            to_iso_z("2026-03-01 14:30").as_deref(),
            Some("2026-03-01T14:30:00Z")
        );
        assert_eq!(
            to_iso_z("2026-03-01T14:30:00Z").as_deref(),
            Some("2026-03-01T14:30:00Z")
        );
        assert_eq!(
            to_iso_z("2026-03-01T14:30:00+02:00").as_deref(),
            Some("2026-03-01T12:30:00Z")
        );
        assert_eq!(to_iso_z("  ").as_deref(), None);
    }

    #[test]
    fn merge_preserves_embedded_tasks_when_server_omits_them() {
        let local = TodoList::from_value(&json!({
            "id": 1, "public_token": "t", "name": "old",
            "tasks": [{ "id": 5, "name": "keep me" }]
        }));
        let server = TodoList::from_value(&json!({
            "id": 1, "public_token": "t", "name": "new", "priority": 1
        }));
        let merged = local.merged_with(&server);
        assert_eq!(merged.name, "new");
        assert_eq!(merged.priority, 1);
        let tasks = merged.tasks.expect("tasks carried over");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "keep me");
    }
}
