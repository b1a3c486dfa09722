//! Scenario tests for the job state machine.
//!
//! Each test drives [`JobMachine`] through a full lifecycle and checks the
//! effects it emits plus the ActiveJob/status invariant after every step.

use assert_matches::assert_matches;
use sketchflow_core::history::MAX_HISTORY;
use sketchflow_core::machine::{DispatchId, Effect, Input, JobEvent, JobMachine};
use sketchflow_core::types::{
    BaseImage, GenerationRequest, ImagePayload, JobStatus, ResultPayload,
};

fn request(tag: u8) -> GenerationRequest {
    GenerationRequest::new(ImagePayload::from(vec![tag])).with_prompt(format!("prompt {tag}"))
}

fn result(job_id: &str, relative: &str) -> Input {
    Input::Job(JobEvent::Result(ResultPayload {
        job_id: Some(job_id.to_string()),
        url: format!("http://localhost:8000{relative}"),
        relative_url: relative.to_string(),
        seed: Some(7),
        quality_effective: None,
        quality_degraded: None,
        download_token: Some("tok".into()),
    }))
}

/// Acknowledgement of the `dispatch`-th create call.
fn accepted(dispatch: DispatchId, job_id: &str) -> Input {
    Input::CreateAccepted {
        dispatch,
        job_id: job_id.to_string(),
        quality_effective: None,
        degraded: false,
    }
}

/// ActiveJob is set exactly when the status is busy.
fn assert_invariant(machine: &JobMachine) {
    assert_eq!(
        machine.active_job().is_some(),
        machine.status().is_busy(),
        "active job {:?} vs status {}",
        machine.active_job(),
        machine.status(),
    );
}

/// Feed inputs one by one, checking the invariant after each, and collect
/// every effect emitted.
fn drive(machine: &mut JobMachine, inputs: Vec<Input>) -> Vec<Effect> {
    let mut effects = Vec::new();
    for input in inputs {
        effects.extend(machine.handle(input));
        assert_invariant(machine);
    }
    effects
}

fn count_creates(effects: &[Effect]) -> usize {
    effects
        .iter()
        .filter(|e| matches!(e, Effect::CreateJob { .. }))
        .count()
}

fn count_cancels(effects: &[Effect]) -> usize {
    effects
        .iter()
        .filter(|e| matches!(e, Effect::CancelJob { .. }))
        .count()
}

// ---------------------------------------------------------------------------
// Scenario A: submit, run, result
// ---------------------------------------------------------------------------

#[test]
fn scenario_a_submit_to_result() {
    let mut m = JobMachine::with_base_image(BaseImage::new("base"));

    let effects = drive(&mut m, vec![Input::Submit(request(1)), accepted(1, "job-1")]);
    assert_eq!(count_creates(&effects), 1);
    assert_eq!(count_cancels(&effects), 0);
    assert_eq!(m.status(), JobStatus::Queued);
    assert_eq!(m.active_job(), Some("job-1"));

    drive(
        &mut m,
        vec![Input::Job(JobEvent::Status {
            job_id: None,
            status: JobStatus::Running,
        })],
    );
    assert_eq!(m.status(), JobStatus::Running);
    assert_eq!(m.active_job(), Some("job-1"));

    drive(&mut m, vec![result("job-1", "/r/1.png")]);
    assert_eq!(m.status(), JobStatus::Done);
    assert!(m.active_job().is_none());

    let history = m.history();
    assert_eq!(history.len(), 1);
    let current = history.current().expect("current result");
    assert_eq!(current.id, "job-1");
    assert_eq!(current.url, "http://localhost:8000/r/1.png");
}

// ---------------------------------------------------------------------------
// Scenario B: submit while running cancels once and replays the latest
// ---------------------------------------------------------------------------

#[test]
fn scenario_b_replacement_waits_for_cancellation() {
    let mut m = JobMachine::with_base_image(BaseImage::new("base"));
    drive(
        &mut m,
        vec![
            Input::Submit(request(1)),
            accepted(1, "job-1"),
            Input::Job(JobEvent::Status {
                job_id: None,
                status: JobStatus::Running,
            }),
        ],
    );

    let effects = drive(&mut m, vec![Input::Submit(request(2))]);
    assert_eq!(
        effects,
        vec![Effect::CancelJob {
            job_id: "job-1".into()
        }]
    );
    assert_eq!(m.pending(), Some(&request(2)));
    assert_eq!(m.active_job(), Some("job-1"));

    let effects = drive(&mut m, vec![Input::Job(JobEvent::Cancelled { job_id: None })]);
    assert_eq!(m.status(), JobStatus::Cancelled);
    assert!(m.active_job().is_none());
    assert_matches!(
        effects.as_slice(),
        [Effect::CreateJob { request: sent, .. }] if *sent == request(2)
    );

    drive(&mut m, vec![accepted(2, "job-2")]);
    assert_eq!(m.status(), JobStatus::Queued);
    assert_eq!(m.active_job(), Some("job-2"));
}

#[test]
fn many_submits_in_one_busy_period_send_one_cancel_and_one_create() {
    let mut m = JobMachine::with_base_image(BaseImage::new("base"));
    drive(&mut m, vec![Input::Submit(request(1)), accepted(1, "job-1")]);

    let mut inputs: Vec<Input> = (2..=6).map(|i| Input::Submit(request(i))).collect();
    inputs.push(Input::Job(JobEvent::Error {
        job_id: Some("job-1".into()),
        message: Some("interrupted".into()),
    }));
    let effects = drive(&mut m, inputs);

    assert_eq!(count_cancels(&effects), 1);
    assert_eq!(count_creates(&effects), 1);
    assert_matches!(
        effects.last(),
        Some(Effect::CreateJob { request: sent, .. }) if *sent == request(6)
    );
}

#[test]
fn done_also_frees_the_slot_for_pending() {
    let mut m = JobMachine::with_base_image(BaseImage::new("base"));
    let effects = drive(
        &mut m,
        vec![
            Input::Submit(request(1)),
            accepted(1, "job-1"),
            Input::Submit(request(2)),
            result("job-1", "/r/1.png"),
        ],
    );
    assert_eq!(count_creates(&effects), 2);
    assert_eq!(m.history().len(), 1);
    assert!(m.pending().is_none());
}

// ---------------------------------------------------------------------------
// Scenario D: unauthorized
// ---------------------------------------------------------------------------

#[test]
fn scenario_d_unauthorized_resets() {
    let mut m = JobMachine::with_base_image(BaseImage::new("base"));
    drive(
        &mut m,
        vec![
            Input::Submit(request(1)),
            accepted(1, "job-1"),
            Input::Submit(request(2)),
        ],
    );

    let effects = drive(&mut m, vec![Input::Unauthorized, Input::Unauthorized]);
    assert_eq!(effects, vec![Effect::RedirectToLogin]);
    assert_eq!(m.status(), JobStatus::Idle);
    assert!(m.active_job().is_none());
    assert!(m.pending().is_none());

    // A late cancellation for the old job changes nothing.
    let effects = drive(&mut m, vec![Input::Job(JobEvent::Cancelled { job_id: None })]);
    assert!(effects.is_empty());
    assert_eq!(m.status(), JobStatus::Idle);
}

// ---------------------------------------------------------------------------
// Scenario E: undo
// ---------------------------------------------------------------------------

#[test]
fn scenario_e_undo_drops_newest() {
    let mut m = JobMachine::with_base_image(BaseImage::new("base"));
    drive(
        &mut m,
        vec![
            Input::Submit(request(1)),
            accepted(1, "r1"),
            result("r1", "/r/1.png"),
            Input::Submit(request(2)),
            accepted(2, "r2"),
            result("r2", "/r/2.png"),
        ],
    );
    assert_eq!(m.history().current().unwrap().id, "r2");

    assert_eq!(m.handle(Input::Undo), vec![Effect::Undo]);
    drive(&mut m, vec![Input::UndoSucceeded]);

    let ids: Vec<_> = m.history().items().iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, ["r1"]);
    assert_eq!(m.history().current().unwrap().id, "r1");
    assert_eq!(m.status(), JobStatus::Done);
}

#[test]
fn failed_undo_keeps_history() {
    let mut m = JobMachine::with_base_image(BaseImage::new("base"));
    drive(
        &mut m,
        vec![
            Input::Submit(request(1)),
            accepted(1, "r1"),
            result("r1", "/r/1.png"),
        ],
    );
    drive(&mut m, vec![Input::UndoFailed("nothing to undo".into())]);
    assert_eq!(m.history().len(), 1);
    assert_eq!(m.status(), JobStatus::Error);
    assert_eq!(m.message(), Some("nothing to undo"));
}

// ---------------------------------------------------------------------------
// History bounds through the machine
// ---------------------------------------------------------------------------

#[test]
fn history_stays_bounded_across_many_jobs() {
    let mut m = JobMachine::with_base_image(BaseImage::new("base"));
    for i in 0..8 {
        let id = format!("job-{i}");
        drive(
            &mut m,
            vec![
                Input::Submit(request(i as u8)),
                accepted(i + 1, &id),
                result(&id, &format!("/r/{i}.png")),
            ],
        );
        assert!(m.history().len() <= MAX_HISTORY);
    }
    assert_eq!(m.history().items()[0].id, "job-3");
    assert_eq!(m.history().current().unwrap().id, "job-7");
}

#[test]
fn stale_running_after_result_is_ignored() {
    let mut m = JobMachine::with_base_image(BaseImage::new("base"));
    drive(
        &mut m,
        vec![
            Input::Submit(request(1)),
            accepted(1, "job-1"),
            result("job-1", "/r/1.png"),
            Input::Job(JobEvent::Status {
                job_id: Some("job-1".into()),
                status: JobStatus::Running,
            }),
        ],
    );
    assert_eq!(m.status(), JobStatus::Done);
}

// ---------------------------------------------------------------------------
// Create-call answers that outlive a reset
// ---------------------------------------------------------------------------

#[test]
fn reset_during_dispatch_tracks_only_the_newest_call() {
    let mut m = JobMachine::with_base_image(BaseImage::new("base"));
    drive(
        &mut m,
        vec![
            Input::Submit(request(1)),
            accepted(1, "job-1"),
            result("job-1", "/r/1.png"),
        ],
    );

    // Create call 2 is in flight when an apply call comes back 401.
    let effects = drive(
        &mut m,
        vec![
            Input::Submit(request(2)),
            Input::ApplyResult,
            Input::Unauthorized,
            Input::Submit(request(3)),
        ],
    );
    assert_matches!(
        effects.last(),
        Some(Effect::CreateJob { dispatch: 3, request: sent, .. }) if *sent == request(3)
    );

    let effects = drive(&mut m, vec![accepted(2, "job-2"), accepted(3, "job-3")]);
    assert_eq!(
        effects,
        vec![Effect::CancelJob {
            job_id: "job-2".into()
        }]
    );
    assert_eq!(m.active_job(), Some("job-3"));
    assert_eq!(m.status(), JobStatus::Queued);
}
