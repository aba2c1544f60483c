//daemon.rs
use crate::api::ApiClient;
use crate::config::ServerConfig;
use crate::model::{Task, TodoList};
use chrono::{DateTime, Local, Utc};
use std::collections::HashSet;
use std::{thread, time::Duration};

#[cfg(target_os = "linux")]
use notify_rust::Notification;

#[cfg(target_os = "windows")]
use notifica::notify;

#[cfg(target_os = "macos")]
use mac_notification_sys::send_notification;

pub fn start_daemon(cfg: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let api = ApiClient::over_http(cfg.base_url.clone())?;
    let mut notified: HashSet<i64> = HashSet::new();
    loop {
        if let Ok(lists) = api.fetch_lists() {
            for list in &lists {
                for task in open_tasks(&api, list) {
                    let Some(id) = task.id else { continue };
                    if notified.contains(&id) {
                        continue;
                    }
                    if due_today(&task) || reminder_elapsed(&task) {
                        if raise_notification(&task).is_ok() {
                            notified.insert(id);
                        }
                    }
                }
            }
        }
        thread::sleep(Duration::from_secs(cfg.refresh_secs.max(60)));
    }
}

fn open_tasks(api: &ApiClient, list: &TodoList) -> Vec<Task> {
    let tasks = match &list.tasks {
        Some(t) => t.clone(),
        None => match list.route_key() {
            Some(route) => api.tasks_by_list_path(&route).unwrap_or_default(),
            None => Vec::new(),
        },
    };
    tasks.into_iter().filter(|t| !t.done).collect()
}

fn due_today(task: &Task) -> bool {
    let today = Local::now().format("%Y-%m-%d").to_string();
    task.due_date
        .as_deref()
        .map(|d| d.starts_with(&today))
        .unwrap_or(false)
}

fn reminder_elapsed(task: &Task) -> bool {
    task.reminder_at
        .as_deref()
        .and_then(|r| DateTime::parse_from_rfc3339(r).ok())
        .map(|r| r.to_utc() <= Utc::now())
        .unwrap_or(false)
}

fn raise_notification(task: &Task) -> Result<(), Box<dyn std::error::Error>> {
    let body = format!("\"{}\" is due today! Don't forget!", task.title);
    #[cfg(target_os = "linux")]
    Notification::new()
        .summary("Task due today!")
        .body(&body)
        .show()?;
    #[cfg(target_os = "windows")]
    {
        notify("RustyLists", &body);
    }
    #[cfg(target_os = "macos")]
    {
        send_notification("RustyLists", None, &body, None)?;
    }
    #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
    {
        let _ = &body;
    }
    Ok(())
}
