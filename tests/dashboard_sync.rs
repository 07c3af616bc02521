//! Integration tests for the dashboard against a mock task API.
//!
//! Each test starts its own `MockServer`, drives the dashboard through its
//! public intents and feeds every background event back in until nothing is
//! outstanding.

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use wiremock::matchers::{body_json, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use taskdeck::api::{ApiClient, NewTask, Priority, ProjectId, TaskId};
use taskdeck::bulk::BulkAction;
use taskdeck::{ContentView, Dashboard, LoadState, Severity, SyncEvent};

fn task_json(id: i64, project_id: i64, complete: bool) -> Value {
    json!({
        "id": id,
        "title": format!("task {}", id),
        "description": null,
        "priority": 2,
        "project_id": project_id,
        "due_date": null,
        "is_complete": complete
    })
}

fn project_json(id: i64, name: &str, total: u32, done: u32) -> Value {
    json!({
        "id": id,
        "name": name,
        "color": "#3b82f6",
        "task_count": total,
        "completed_count": done
    })
}

async fn mount_json(server: &MockServer, verb: &str, route: &str, body: Value) {
    Mock::given(method(verb))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn dashboard_for(server: &MockServer) -> (Dashboard, mpsc::Receiver<SyncEvent>) {
    let api = ApiClient::new(&server.uri(), Some(Duration::from_secs(5))).unwrap();
    Dashboard::new(api)
}

/// Handle events until every spawned request has reported back.
async fn settle(dashboard: &mut Dashboard, events: &mut mpsc::Receiver<SyncEvent>) {
    while dashboard.has_pending() {
        let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .expect("timed out waiting for background event")
            .expect("event channel closed");
        dashboard.handle_event(event);
    }
}

fn task_ids(dashboard: &Dashboard) -> Vec<i64> {
    dashboard.tasks().iter().map(|t| t.id.0).collect()
}

fn selected_ids(dashboard: &Dashboard) -> Vec<i64> {
    dashboard.selection().iter().map(|id| id.0).collect()
}

// ============================================================================
// Loading
// ============================================================================

#[tokio::test]
async fn test_initial_load_populates_collections() {
    let server = MockServer::start().await;
    mount_json(&server, "GET", "/projects/", json!([project_json(1, "Home", 2, 1)])).await;
    Mock::given(method("GET"))
        .and(path("/tasks/"))
        .and(query_param_is_missing("project_id"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([task_json(1, 1, false), task_json(2, 1, true)])),
        )
        .mount(&server)
        .await;
    mount_json(&server, "GET", "/notifications/", json!([task_json(1, 1, false)])).await;

    let (mut dash, mut events) = dashboard_for(&server);
    dash.reload();
    assert_eq!(dash.content_view(), ContentView::Loading);
    settle(&mut dash, &mut events).await;

    assert_eq!(dash.load_state(), LoadState::Ready);
    assert_eq!(task_ids(&dash), vec![1, 2]);
    assert_eq!(dash.active_count(), 1);
    assert_eq!(dash.notification_count(), 1);
    assert_eq!(dash.header_title(), "All Tasks");
    assert_eq!(dash.overall_progress(), 50);
    assert_eq!(dash.content_view(), ContentView::Tasks);
}

#[tokio::test]
async fn test_filter_change_during_load_ends_in_latest_filter() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "GET",
        "/projects/",
        json!([project_json(1, "Work", 1, 0), project_json(2, "Home", 1, 0)]),
    )
    .await;
    mount_json(&server, "GET", "/notifications/", json!([])).await;

    // The first filter's response arrives last
    Mock::given(method("GET"))
        .and(path("/tasks/"))
        .and(query_param("project_id", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([task_json(10, 1, false)]))
                .set_delay(Duration::from_millis(400)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tasks/"))
        .and(query_param("project_id", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([task_json(20, 2, false)])))
        .mount(&server)
        .await;

    let (mut dash, mut events) = dashboard_for(&server);
    dash.select_project(Some(ProjectId(1)));
    dash.select_project(Some(ProjectId(2)));
    settle(&mut dash, &mut events).await;

    assert_eq!(dash.selected_project(), Some(ProjectId(2)));
    assert_eq!(task_ids(&dash), vec![20]);
    assert_eq!(dash.header_title(), "Home");
    assert_eq!(dash.load_state(), LoadState::Ready);
}

#[tokio::test]
async fn test_partial_load_failure_keeps_previous_state() {
    let server = MockServer::start().await;
    mount_json(&server, "GET", "/projects/", json!([project_json(1, "Home", 1, 0)])).await;
    mount_json(&server, "GET", "/tasks/", json!([task_json(1, 1, false)])).await;
    Mock::given(method("GET"))
        .and(path("/notifications/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/notifications/"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let (mut dash, mut events) = dashboard_for(&server);
    dash.reload();
    settle(&mut dash, &mut events).await;
    assert_eq!(dash.load_state(), LoadState::Ready);

    dash.reload();
    settle(&mut dash, &mut events).await;

    assert_eq!(dash.load_state(), LoadState::Failed);
    assert_eq!(task_ids(&dash), vec![1]);
    assert_eq!(dash.projects().len(), 1);
    let notice = dash.notice().unwrap();
    assert_eq!(notice.message, "Failed to fetch data.");
    assert_eq!(notice.severity, Severity::Error);
}

#[tokio::test]
async fn test_no_projects_view() {
    let server = MockServer::start().await;
    mount_json(&server, "GET", "/projects/", json!([])).await;
    mount_json(&server, "GET", "/tasks/", json!([])).await;
    mount_json(&server, "GET", "/notifications/", json!([])).await;

    let (mut dash, mut events) = dashboard_for(&server);
    dash.reload();
    settle(&mut dash, &mut events).await;

    assert_eq!(dash.content_view(), ContentView::NoProjects);
    assert_eq!(dash.overall_progress(), 0);
}

// ============================================================================
// Task Mutations
// ============================================================================

#[tokio::test]
async fn test_create_task_adopts_server_entity() {
    let server = MockServer::start().await;
    mount_json(&server, "GET", "/projects/", json!([project_json(7, "Errands", 0, 0)])).await;
    mount_json(&server, "GET", "/tasks/", json!([])).await;
    mount_json(&server, "GET", "/notifications/", json!([])).await;
    Mock::given(method("POST"))
        .and(path("/tasks/"))
        .and(body_json(json!({
            "title": "Buy milk",
            "priority": 1,
            "project_id": 7
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 42,
            "title": "Buy milk",
            "description": null,
            "priority": 1,
            "project_id": 7,
            "due_date": null,
            "is_complete": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (mut dash, mut events) = dashboard_for(&server);
    dash.select_project(Some(ProjectId(7)));
    settle(&mut dash, &mut events).await;
    assert!(dash.tasks().is_empty());

    dash.set_composing_task(true);
    dash.create_task(NewTask::new("Buy milk", ProjectId(7)).priority(Priority::Low))
        .unwrap();
    // Nothing is fabricated before the server answers
    assert!(dash.tasks().is_empty());
    settle(&mut dash, &mut events).await;

    assert_eq!(dash.tasks().len(), 1);
    let task = &dash.tasks()[0];
    assert_eq!(task.id, TaskId(42));
    assert!(!task.is_complete);
    assert_eq!(dash.active_count(), 1);
    assert!(!dash.is_composing_task());
    assert_eq!(dash.notice().unwrap().message, "Task added!");
}

#[tokio::test]
async fn test_double_submitted_create_posts_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tasks/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(task_json(8, 1, false))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (mut dash, mut events) = dashboard_for(&server);
    dash.create_task(NewTask::new("Water plants", ProjectId(1))).unwrap();
    assert_eq!(
        dash.create_task(NewTask::new("Water plants", ProjectId(1))),
        Err(taskdeck::SyncError::TaskCreateInFlight)
    );
    settle(&mut dash, &mut events).await;

    assert_eq!(task_ids(&dash), vec![8]);
    assert!(!dash.is_creating_task());
}

#[tokio::test]
async fn test_rejected_create_leaves_collection_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tasks/"))
        .respond_with(ResponseTemplate::new(422).set_body_string("project not found"))
        .mount(&server)
        .await;

    let (mut dash, mut events) = dashboard_for(&server);
    dash.create_task(NewTask::new("Orphan", ProjectId(99))).unwrap();
    settle(&mut dash, &mut events).await;

    assert!(dash.tasks().is_empty());
    let notice = dash.notice().unwrap();
    assert_eq!(notice.message, "Failed to add task.");
    assert_eq!(notice.severity, Severity::Error);
}

#[tokio::test]
async fn test_toggle_complete_updates_active_count() {
    let server = MockServer::start().await;
    mount_json(&server, "GET", "/projects/", json!([project_json(1, "Home", 5, 2)])).await;
    mount_json(
        &server,
        "GET",
        "/tasks/",
        json!([
            task_json(1, 1, false),
            task_json(2, 1, true),
            task_json(3, 1, false),
            task_json(4, 1, true),
            task_json(5, 1, false)
        ]),
    )
    .await;
    mount_json(&server, "GET", "/notifications/", json!([])).await;
    Mock::given(method("PUT"))
        .and(path("/tasks/3"))
        .and(body_json(json!({"is_complete": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(task_json(3, 1, true)))
        .expect(1)
        .mount(&server)
        .await;

    let (mut dash, mut events) = dashboard_for(&server);
    dash.reload();
    settle(&mut dash, &mut events).await;
    assert_eq!(dash.active_count(), 3);

    dash.toggle_complete(TaskId(3)).unwrap();
    // No optimistic change
    assert_eq!(dash.active_count(), 3);
    settle(&mut dash, &mut events).await;

    assert_eq!(dash.active_count(), 2);
    assert_eq!(dash.notice().unwrap().message, "Task updated!");
}

#[tokio::test]
async fn test_edit_sends_only_changed_fields() {
    let server = MockServer::start().await;
    mount_json(&server, "GET", "/projects/", json!([project_json(1, "Home", 1, 0)])).await;
    mount_json(&server, "GET", "/tasks/", json!([task_json(1, 1, false)])).await;
    mount_json(&server, "GET", "/notifications/", json!([])).await;

    let mut canonical = task_json(1, 1, false);
    canonical["title"] = json!("Water plants");
    canonical["priority"] = json!(3);
    Mock::given(method("PUT"))
        .and(path("/tasks/1"))
        .and(body_json(json!({"title": "Water plants", "priority": 3})))
        .respond_with(ResponseTemplate::new(200).set_body_json(canonical))
        .expect(1)
        .mount(&server)
        .await;

    let (mut dash, mut events) = dashboard_for(&server);
    dash.reload();
    settle(&mut dash, &mut events).await;

    dash.begin_edit(TaskId(1)).unwrap();
    let mut edited = dash.editing_task().unwrap().clone();
    edited.title = "  Water plants ".to_string();
    edited.priority = Priority::High;
    dash.save_edit(&edited).unwrap();
    settle(&mut dash, &mut events).await;

    assert_eq!(dash.tasks()[0].title, "Water plants");
    assert_eq!(dash.tasks()[0].priority, Priority::High);
    assert!(dash.editing_task().is_none());
}

#[tokio::test]
async fn test_delete_task_prunes_selection() {
    let server = MockServer::start().await;
    mount_json(&server, "GET", "/projects/", json!([project_json(1, "Home", 2, 0)])).await;
    mount_json(
        &server,
        "GET",
        "/tasks/",
        json!([task_json(1, 1, false), task_json(2, 1, false)]),
    )
    .await;
    mount_json(&server, "GET", "/notifications/", json!([])).await;
    Mock::given(method("DELETE"))
        .and(path("/tasks/1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let (mut dash, mut events) = dashboard_for(&server);
    dash.reload();
    settle(&mut dash, &mut events).await;
    dash.select_all();

    dash.delete_task(TaskId(1)).unwrap();
    settle(&mut dash, &mut events).await;

    assert_eq!(task_ids(&dash), vec![2]);
    assert_eq!(selected_ids(&dash), vec![2]);
    assert_eq!(dash.notice().unwrap().severity, Severity::Info);
}

#[tokio::test]
async fn test_slow_update_does_not_restore_deleted_task() {
    let server = MockServer::start().await;
    mount_json(&server, "GET", "/projects/", json!([project_json(1, "Home", 2, 0)])).await;
    mount_json(
        &server,
        "GET",
        "/tasks/",
        json!([task_json(1, 1, false), task_json(2, 1, false)]),
    )
    .await;
    mount_json(&server, "GET", "/notifications/", json!([])).await;
    Mock::given(method("PUT"))
        .and(path("/tasks/1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(task_json(1, 1, true))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/tasks/1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let (mut dash, mut events) = dashboard_for(&server);
    dash.reload();
    settle(&mut dash, &mut events).await;

    dash.toggle_complete(TaskId(1)).unwrap();
    dash.delete_task(TaskId(1)).unwrap();
    settle(&mut dash, &mut events).await;

    assert_eq!(task_ids(&dash), vec![2]);
    assert_eq!(dash.active_count(), 1);
}

// ============================================================================
// Projects
// ============================================================================

#[tokio::test]
async fn test_delete_project_cascades_locally_and_reloads() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/projects/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            project_json(1, "Work", 2, 0),
            project_json(2, "Home", 1, 0)
        ])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_json(&server, "GET", "/projects/", json!([project_json(2, "Home", 1, 0)])).await;
    Mock::given(method("GET"))
        .and(path("/tasks/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            task_json(1, 1, false),
            task_json(2, 2, false),
            task_json(3, 1, false)
        ])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_json(&server, "GET", "/tasks/", json!([task_json(2, 2, false)])).await;
    mount_json(&server, "GET", "/notifications/", json!([])).await;
    Mock::given(method("DELETE"))
        .and(path("/projects/1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let (mut dash, mut events) = dashboard_for(&server);
    dash.reload();
    settle(&mut dash, &mut events).await;
    dash.select_all();
    assert_eq!(selected_ids(&dash), vec![1, 2, 3]);

    dash.delete_project(ProjectId(1)).unwrap();
    assert_eq!(
        dash.delete_project(ProjectId(1)),
        Err(taskdeck::SyncError::ProjectDeleteInFlight(ProjectId(1)))
    );
    settle(&mut dash, &mut events).await;

    assert_eq!(task_ids(&dash), vec![2]);
    assert_eq!(selected_ids(&dash), vec![2]);
    assert_eq!(dash.projects().len(), 1);
    assert_eq!(dash.load_state(), LoadState::Ready);
    let notice = dash.notice().unwrap();
    assert_eq!(notice.message, "Project deleted!");
    assert_eq!(notice.severity, Severity::Warning);
}

#[tokio::test]
async fn test_create_project_reloads_aggregates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/projects/"))
        .and(body_json(json!({"name": "Garden", "color": "#22c55e"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(project_json(5, "Garden", 0, 0)),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_json(&server, "GET", "/projects/", json!([project_json(5, "Garden", 0, 0)])).await;
    mount_json(&server, "GET", "/tasks/", json!([])).await;
    mount_json(&server, "GET", "/notifications/", json!([])).await;

    let (mut dash, mut events) = dashboard_for(&server);
    dash.set_composing_project(true);
    dash.create_project(" Garden ", Some("#22c55e")).unwrap();
    settle(&mut dash, &mut events).await;

    assert!(!dash.is_composing_project());
    assert!(!dash.is_creating_project());
    assert_eq!(dash.projects().len(), 1);
    assert_eq!(dash.content_view(), ContentView::Empty);
    assert_eq!(dash.notice().unwrap().message, "Project created!");
}

// ============================================================================
// Bulk
// ============================================================================

#[tokio::test]
async fn test_bulk_complete_with_one_failure() {
    let server = MockServer::start().await;
    mount_json(&server, "GET", "/projects/", json!([project_json(1, "Home", 3, 0)])).await;
    mount_json(
        &server,
        "GET",
        "/tasks/",
        json!([
            task_json(1, 1, false),
            task_json(2, 1, false),
            task_json(3, 1, false)
        ]),
    )
    .await;
    mount_json(&server, "GET", "/notifications/", json!([])).await;
    for id in [1, 3] {
        Mock::given(method("PUT"))
            .and(path(format!("/tasks/{}", id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(task_json(id, 1, true)))
            .mount(&server)
            .await;
    }
    Mock::given(method("PUT"))
        .and(path("/tasks/2"))
        .respond_with(ResponseTemplate::new(500).set_body_string("db error"))
        .mount(&server)
        .await;

    let (mut dash, mut events) = dashboard_for(&server);
    dash.reload();
    settle(&mut dash, &mut events).await;
    dash.select_all();

    dash.bulk_apply(BulkAction::Complete).unwrap();
    assert!(dash.is_bulk_in_flight());
    assert_eq!(
        dash.bulk_apply(BulkAction::Delete),
        Err(taskdeck::SyncError::BulkInFlight)
    );
    settle(&mut dash, &mut events).await;

    let completion: Vec<(i64, bool)> = dash
        .tasks()
        .iter()
        .map(|t| (t.id.0, t.is_complete))
        .collect();
    assert_eq!(completion, vec![(1, true), (2, false), (3, true)]);
    assert_eq!(selected_ids(&dash), vec![2]);
    assert!(!dash.is_bulk_in_flight());
    let notice = dash.notice().unwrap();
    assert_eq!(notice.message, "1 of 3 tasks failed to complete.");
    assert_eq!(notice.severity, Severity::Warning);
}

#[tokio::test]
async fn test_bulk_delete_all_succeed() {
    let server = MockServer::start().await;
    mount_json(&server, "GET", "/projects/", json!([project_json(1, "Home", 2, 0)])).await;
    mount_json(
        &server,
        "GET",
        "/tasks/",
        json!([task_json(1, 1, false), task_json(2, 1, false)]),
    )
    .await;
    mount_json(&server, "GET", "/notifications/", json!([])).await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .expect(2)
        .mount(&server)
        .await;

    let (mut dash, mut events) = dashboard_for(&server);
    dash.reload();
    settle(&mut dash, &mut events).await;
    dash.select_all();

    dash.bulk_apply(BulkAction::Delete).unwrap();
    settle(&mut dash, &mut events).await;

    assert!(dash.tasks().is_empty());
    assert!(dash.selection().is_empty());
    assert_eq!(dash.content_view(), ContentView::Empty);
    assert_eq!(dash.notice().unwrap().message, "2 tasks deleted.");
}
