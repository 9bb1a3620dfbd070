//! Submission lifecycle: dedup, the revalidation handoff, and error
//! surfacing.

mod common;

use common::*;
use serde_json::json;
use std::{cell::RefCell, rc::Rc};
use vorma_client::{
    get_status, on_status, submit, submit_json, Status, SubmitError, SubmitInit, SubmitOptions,
};

fn collect_statuses() -> Rc<RefCell<Vec<Status>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    std::mem::forget(on_status(move |status| sink.borrow_mut().push(*status)));
    seen
}

fn keyed(key: &str) -> SubmitOptions {
    SubmitOptions {
        dedupe_key: Some(key.to_string()),
        revalidate: false,
        ..Default::default()
    }
}

#[test]
fn deduped_submission_aborts_its_predecessor() {
    let stub = setup();
    let _stay_pending = manual_step(&stub);
    stub.push(Script::Respond(ok_response(r#"{"n":2}"#.into())));

    let first = spawn_result(submit("/x", SubmitInit::method("POST"), keyed("k")));
    pump();
    assert_eq!(stub.request_count(), 1);
    assert!(get_status().is_submitting);

    let second = spawn_result(submit("/x", SubmitInit::method("POST"), keyed("k")));
    pump();

    assert_eq!(*first.borrow(), Some(Err(SubmitError::Aborted)));
    assert_eq!(*second.borrow(), Some(Ok(Some(json!({"n": 2})))));
    assert_eq!(stub.request_count(), 2);
    assert!(!get_status().is_submitting);
}

#[test]
fn aborted_submissions_report_the_plain_aborted_string() {
    assert_eq!(SubmitError::Aborted.to_string(), "Aborted");
    assert_eq!(SubmitError::Status(404).to_string(), "404");
}

#[test]
fn post_submissions_revalidate_before_returning() {
    let stub = setup();
    let statuses = collect_statuses();
    let release_post = manual_step(&stub);
    let release_reval = manual_step(&stub);

    let result = spawn_result(submit(
        "/api/x",
        SubmitInit::method("POST"),
        SubmitOptions::default(),
    ));
    pump();
    assert!(get_status().is_submitting);

    release_post
        .send(ok_response(r#"{"ok":true}"#.into()))
        .unwrap();
    pump();

    assert_eq!(*result.borrow(), Some(Ok(Some(json!({"ok": true})))));
    let mid = get_status();
    assert!(mid.is_revalidating, "revalidation began before submit returned");
    assert!(!mid.is_submitting);

    release_reval
        .send(ok_response(payload_json("Home", &["/"])))
        .unwrap();
    pump();
    assert!(!get_status().is_busy());
    assert_eq!(stub.request_count(), 2, "submission + revalidation");

    // the indicator hands off without an all-clear gap in between
    let events = statuses.borrow();
    assert!(!events.last().unwrap().is_busy());
    assert!(
        events[..events.len() - 1].iter().all(|s| s.is_busy()),
        "no idle gap mid-handoff: {events:?}"
    );
}

#[test]
fn revalidate_false_issues_exactly_one_fetch() {
    let stub = setup();
    stub.push(Script::Respond(ok_response(r#"{"saved":true}"#.into())));

    let result = spawn_result(submit(
        "/api/x",
        SubmitInit::method("POST"),
        SubmitOptions {
            revalidate: false,
            ..Default::default()
        },
    ));
    pump();

    assert_eq!(*result.borrow(), Some(Ok(Some(json!({"saved": true})))));
    assert_eq!(stub.request_count(), 1);
}

#[test]
fn get_submissions_do_not_revalidate() {
    let stub = setup();
    stub.push(Script::Respond(ok_response(r#"{"rows":[]}"#.into())));

    let result = spawn_result(submit("/api/q", SubmitInit::default(), SubmitOptions::default()));
    pump();

    assert_eq!(*result.borrow(), Some(Ok(Some(json!({"rows": []})))));
    assert_eq!(stub.request_count(), 1);
}

#[test]
fn non_ok_statuses_surface_as_the_status_code() {
    let stub = setup();
    let mut response = ok_response(String::new());
    response.ok = false;
    response.status = 422;
    stub.push(Script::Respond(response));

    let result = spawn_result(submit(
        "/api/x",
        SubmitInit::method("POST"),
        SubmitOptions::default(),
    ));
    pump();

    assert_eq!(*result.borrow(), Some(Err(SubmitError::Status(422))));
    assert_eq!(result.borrow().as_ref().unwrap().as_ref().unwrap_err().to_string(), "422");
    assert_eq!(stub.request_count(), 1, "failed submissions skip revalidation");
    assert!(!get_status().is_busy());
}

#[test]
fn submit_json_sends_a_json_body() {
    let stub = setup();
    stub.push(Script::Respond(ok_response(r#"{"ok":true}"#.into())));

    let body = json!({"name": "vorma"});
    let result = spawn_result(async move {
        submit_json(
            "/api/x",
            "POST",
            &body,
            SubmitOptions {
                revalidate: false,
                ..Default::default()
            },
        )
        .await
    });
    pump();

    assert_eq!(*result.borrow(), Some(Ok(Some(json!({"ok": true})))));
    let requests = stub.requests.borrow();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "POST");
}

#[test]
fn indicator_skipping_submissions_stay_invisible() {
    let stub = setup();
    let release = manual_step(&stub);

    let result = spawn_result(submit(
        "/api/quiet",
        SubmitInit::method("POST"),
        SubmitOptions {
            skip_global_loading_indicator: true,
            revalidate: false,
            ..Default::default()
        },
    ));
    pump();
    assert!(!get_status().is_submitting);

    release.send(ok_response(r#"{"ok":true}"#.into())).unwrap();
    pump();
    assert_eq!(*result.borrow(), Some(Ok(Some(json!({"ok": true})))));
}
