//! Job-control state machine tests against a scripted process host.
//!
//! Every scenario here drives the table through `FakeHost`, so pids are
//! predictable (100, 101, …) and status changes arrive exactly when the test
//! delivers them.

use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;
use smash_kernel::scheduler::{ForegroundReturn, JobControl, JobController, JobTarget};
use smash_kernel::{
    JobError, JobId, JobStatus, LaunchMode, ProcessHost, SignalBridge, SignalEvent, WaitOutcome,
};
use smash_testutil::{eventually, FakeHost};

struct Harness {
    host: Arc<FakeHost>,
    control: Arc<JobControl>,
    jobs: JobController,
    bridge: SignalBridge,
}

fn harness() -> Harness {
    let host = Arc::new(FakeHost::new());
    let control = Arc::new(JobControl::new(host.clone()));
    Harness {
        jobs: JobController::new(control.clone()),
        bridge: SignalBridge::new(control.clone()),
        host,
        control,
    }
}

fn argv(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}

fn pid(n: i32) -> Pid {
    Pid::from_raw(n)
}

impl Harness {
    async fn background(&self, line: &str) -> (JobId, Pid) {
        let launched = self
            .control
            .launch(&argv(line), line, LaunchMode::Background)
            .await
            .expect("background launch");
        assert!(launched.outcome.is_none());
        (launched.id, launched.pid)
    }

    fn status_of(&self, id: JobId) -> Option<JobStatus> {
        self.control.job(id).map(|j| j.status)
    }
}

// ============================================================================
// Launching
// ============================================================================

#[tokio::test]
async fn background_launch_inserts_running_job() {
    let h = harness();
    let (id, pid) = h.background("sleep 100").await;

    assert_eq!(id, JobId(1));
    assert_eq!(pid, Pid::from_raw(100));
    let jobs = h.jobs.list_jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Running);
    assert_eq!(jobs[0].command, "sleep 100");
    assert_eq!(h.control.foreground_pid(), None);
    assert_eq!(h.host.spawned()[0].1, ["sleep", "100"]);
}

#[tokio::test]
async fn spawn_failure_leaves_table_untouched() {
    let h = harness();
    h.host.fail_spawns();
    let err = h
        .control
        .launch(&argv("sleep 1"), "sleep 1", LaunchMode::Background)
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::LaunchFailed { .. }));
    assert!(h.jobs.list_jobs().is_empty());
    assert_eq!(h.control.foreground_pid(), None);
}

#[tokio::test]
async fn empty_argv_is_invalid() {
    let h = harness();
    let err = h
        .control
        .launch(&[], "", LaunchMode::Foreground)
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::InvalidArguments(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn foreground_launch_blocks_until_exit() {
    let h = harness();
    let control = h.control.clone();
    let task = tokio::spawn(async move {
        control
            .launch(&argv("make all"), "make all", LaunchMode::Foreground)
            .await
    });

    assert!(eventually(Duration::from_secs(2), || h.control.foreground_pid() == Some(pid(100))).await);
    assert!(!task.is_finished());
    assert_eq!(h.jobs.list_jobs().len(), 1);

    h.host.deliver_exit(pid(100), 0);
    let launched = task.await.unwrap().unwrap();

    assert_eq!(launched.outcome, Some(WaitOutcome::Exited(0)));
    assert_eq!(h.control.foreground_pid(), None);
    assert!(h.jobs.list_jobs().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn foreground_exec_failure_reports_status() {
    let h = harness();
    h.host.deliver_exit(pid(100), smash_kernel::scheduler::EXEC_FAILED_STATUS);
    let launched = h
        .control
        .launch(&argv("no-such-cmd"), "no-such-cmd", LaunchMode::Foreground)
        .await
        .unwrap();
    assert_eq!(launched.outcome, Some(WaitOutcome::Exited(127)));
    assert_eq!(launched.outcome.unwrap().exit_code(), 127);
    assert!(h.jobs.list_jobs().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ctrl_z_unblocks_foreground_and_keeps_job() {
    let h = harness();
    h.host
        .react(pid(100), Signal::SIGTSTP, WaitStatus::Stopped(pid(100), Signal::SIGTSTP));

    let control = h.control.clone();
    let task = tokio::spawn(async move {
        control
            .launch(&argv("vim notes"), "vim notes", LaunchMode::Foreground)
            .await
    });
    assert!(eventually(Duration::from_secs(2), || h.control.foreground_pid().is_some()).await);

    h.bridge.handle(SignalEvent::Stop);
    let launched = task.await.unwrap().unwrap();

    assert_eq!(launched.outcome, Some(WaitOutcome::Stopped(Signal::SIGTSTP)));
    assert_eq!(launched.outcome.unwrap().exit_code(), 148);
    assert_eq!(h.control.foreground_pid(), None);
    assert_eq!(h.status_of(launched.id), Some(JobStatus::Stopped));
    assert_eq!(h.host.signals_to(pid(100)), [Signal::SIGTSTP]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ctrl_c_terminates_foreground_job() {
    let h = harness();
    h.host.react(
        pid(100),
        Signal::SIGINT,
        WaitStatus::Signaled(pid(100), Signal::SIGINT, false),
    );

    let control = h.control.clone();
    let task = tokio::spawn(async move {
        control
            .launch(&argv("yes"), "yes", LaunchMode::Foreground)
            .await
    });
    assert!(eventually(Duration::from_secs(2), || h.control.foreground_pid().is_some()).await);

    h.bridge.handle(SignalEvent::Interrupt);
    let launched = task.await.unwrap().unwrap();

    assert_eq!(launched.outcome, Some(WaitOutcome::Killed(Signal::SIGINT)));
    assert!(h.jobs.list_jobs().is_empty());
}

// ============================================================================
// Ids and ordering
// ============================================================================

#[tokio::test]
async fn job_ids_never_reused() {
    let h = harness();
    let (a, pa) = h.background("a").await;
    let (b, _) = h.background("b").await;

    h.host.deliver_exit(pa, 0);
    h.bridge.handle(SignalEvent::ChildChanged);
    assert!(h.control.job(a).is_none());

    let (c, _) = h.background("c").await;
    assert!(a < b && b < c);
    assert_eq!(c, JobId(3));
}

#[tokio::test]
async fn listing_follows_insertion_order() {
    let h = harness();
    for name in ["one", "two", "three", "four"] {
        h.background(name).await;
    }
    h.host.deliver_exit(pid(101), 0);
    h.host.deliver_stop(pid(102));
    h.bridge.handle(SignalEvent::ChildChanged);

    let names: Vec<_> = h.jobs.list_jobs().into_iter().map(|j| j.command).collect();
    assert_eq!(names, ["one", "three", "four"]);
}

// ============================================================================
// Signal bridge
// ============================================================================

#[tokio::test]
async fn child_changes_follow_state_machine() {
    let h = harness();
    let (id, pid) = h.background("sleep 100").await;

    h.host.deliver_stop(pid);
    h.bridge.handle(SignalEvent::ChildChanged);
    assert_eq!(h.status_of(id), Some(JobStatus::Stopped));

    h.host.deliver_continue(pid);
    h.bridge.handle(SignalEvent::ChildChanged);
    assert_eq!(h.status_of(id), Some(JobStatus::Running));

    h.host.deliver(pid, WaitStatus::Signaled(pid, Signal::SIGTERM, false));
    h.bridge.handle(SignalEvent::ChildChanged);
    assert_eq!(h.status_of(id), None);
}

#[tokio::test]
async fn no_stop_after_exit_in_one_batch() {
    let h = harness();
    let (id, pid) = h.background("flaky").await;

    h.host.deliver_stop(pid);
    h.host.deliver_exit(pid, 1);
    h.host.deliver_stop(pid);
    h.bridge.handle(SignalEvent::ChildChanged);

    assert!(h.control.job(id).is_none());
    h.bridge.handle(SignalEvent::ChildChanged);
    assert!(h.control.job(id).is_none());
}

#[tokio::test]
async fn reaping_handles_many_exits_in_one_pass() {
    let h = harness();
    for n in 0..5 {
        h.background(&format!("job{n}")).await;
    }
    for n in [100, 101, 103, 104] {
        h.host.deliver_exit(pid(n), 0);
    }
    h.bridge.handle(SignalEvent::ChildChanged);

    let left: Vec<_> = h.jobs.list_jobs().into_iter().map(|j| j.pid).collect();
    assert_eq!(left, [102]);
}

#[tokio::test]
async fn interrupt_and_stop_without_foreground_are_noops() {
    let h = harness();
    let (id, _) = h.background("sleep 5").await;
    h.bridge.handle(SignalEvent::Interrupt);
    h.bridge.handle(SignalEvent::Stop);
    assert!(h.host.signals().is_empty());
    assert_eq!(h.status_of(id), Some(JobStatus::Running));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reaping_skips_foreground_job() {
    let h = harness();
    let (bg_id, bg_pid) = h.background("sleep 100").await;

    let control = h.control.clone();
    let task = tokio::spawn(async move {
        control
            .launch(&argv("cat"), "cat", LaunchMode::Foreground)
            .await
    });
    assert!(eventually(Duration::from_secs(2), || h.control.foreground_pid() == Some(pid(101))).await);

    // A background exit while the foreground wait is in progress.
    h.host.deliver_exit(bg_pid, 0);
    h.bridge.handle(SignalEvent::ChildChanged);
    assert!(h.control.job(bg_id).is_none());
    assert_eq!(h.jobs.list_jobs().len(), 1);
    assert!(!task.is_finished());

    h.host.deliver_exit(pid(101), 3);
    let launched = task.await.unwrap().unwrap();
    assert_eq!(launched.outcome, Some(WaitOutcome::Exited(3)));
    assert!(h.jobs.list_jobs().is_empty());
}

// ============================================================================
// fg / bg / kill
// ============================================================================

#[tokio::test]
async fn fg_on_empty_table_is_noop() {
    let h = harness();
    let mut out = Vec::new();
    let ret = h
        .jobs
        .bring_to_foreground(JobTarget::Latest, &mut out)
        .await
        .unwrap();
    assert!(ret.is_none());
    assert!(out.is_empty());

    // Even an explicit id is a no-op while nothing is tracked.
    let ret = h
        .jobs
        .bring_to_foreground(JobTarget::Id(JobId(7)), &mut out)
        .await
        .unwrap();
    assert!(ret.is_none());
}

#[tokio::test]
async fn fg_unknown_id_is_no_such_job() {
    let h = harness();
    h.background("sleep 100").await;
    let mut out = Vec::new();
    let err = h
        .jobs
        .bring_to_foreground(JobTarget::Id(JobId(9)), &mut out)
        .await
        .unwrap_err();
    assert_eq!(err, JobError::NoSuchJob(JobId(9)));
    assert_eq!(h.control.foreground_pid(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fg_without_id_picks_oldest_job() {
    let h = harness();
    h.background("first").await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    h.background("second").await;

    h.host.deliver_exit(pid(100), 0);
    let mut out = Vec::new();
    let ret = h
        .jobs
        .bring_to_foreground(JobTarget::Latest, &mut out)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(ret.job.command, "first");
    assert_eq!(String::from_utf8(out).unwrap(), "first\n");
    let names: Vec<_> = h.jobs.list_jobs().into_iter().map(|j| j.command).collect();
    assert_eq!(names, ["second"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fg_continues_stopped_job_and_waits() {
    let h = harness();
    let (id, pid) = h.background("top").await;
    h.host.deliver_stop(pid);
    h.bridge.handle(SignalEvent::ChildChanged);
    assert_eq!(h.status_of(id), Some(JobStatus::Stopped));

    let jobs = h.jobs.clone();
    let task = tokio::spawn(async move {
        let mut out = Vec::new();
        let ret = jobs.bring_to_foreground(JobTarget::Id(id), &mut out).await;
        (ret, out)
    });

    assert!(eventually(Duration::from_secs(2), || h.control.foreground_pid() == Some(pid)).await);
    assert_eq!(h.status_of(id), Some(JobStatus::Running));
    assert_eq!(h.host.signals_to(pid), [Signal::SIGCONT]);

    h.host.deliver_exit(pid, 0);
    let (ret, out) = task.await.unwrap();
    let ForegroundReturn { job, outcome } = ret.unwrap().unwrap();
    assert_eq!(job.id, id);
    assert_eq!(outcome, WaitOutcome::Exited(0));
    assert_eq!(out, b"top\n");
    assert_eq!(h.control.foreground_pid(), None);
    assert!(h.jobs.list_jobs().is_empty());
}

#[tokio::test]
async fn fg_continue_failure_aborts_before_waiting() {
    let h = harness();
    let (id, pid) = h.background("top").await;
    h.host.deliver_stop(pid);
    h.bridge.handle(SignalEvent::ChildChanged);
    h.host.refuse_signals_to(pid);

    let mut out = Vec::new();
    let err = h
        .jobs
        .bring_to_foreground(JobTarget::Id(id), &mut out)
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::SignalFailed { .. }));
    assert_eq!(h.control.foreground_pid(), None);
    assert_eq!(h.status_of(id), Some(JobStatus::Stopped));
}

#[tokio::test]
async fn bg_without_stopped_job_is_noop() {
    let h = harness();
    h.background("sleep 100").await;
    let mut out = Vec::new();
    let ret = h.jobs.send_to_background(JobTarget::Latest, &mut out).unwrap();
    assert!(ret.is_none());
    assert!(h.host.signals().is_empty());
}

#[tokio::test]
async fn bg_picks_most_recently_stopped() {
    let h = harness();
    let (a, pa) = h.background("a").await;
    let (b, pb) = h.background("b").await;

    h.host.deliver_stop(pb);
    h.bridge.handle(SignalEvent::ChildChanged);
    tokio::time::sleep(Duration::from_millis(5)).await;
    h.host.deliver_stop(pa);
    h.bridge.handle(SignalEvent::ChildChanged);

    let mut out = Vec::new();
    let info = h
        .jobs
        .send_to_background(JobTarget::Latest, &mut out)
        .unwrap()
        .unwrap();
    assert_eq!(info.id, a);
    assert_eq!(h.host.signals_to(pa), [Signal::SIGCONT]);
    assert_eq!(h.status_of(a), Some(JobStatus::Running));
    assert_eq!(h.status_of(b), Some(JobStatus::Stopped));
}

#[tokio::test]
async fn bg_unknown_id_is_no_such_job() {
    let h = harness();
    let mut out = Vec::new();
    let err = h
        .jobs
        .send_to_background(JobTarget::Id(JobId(2)), &mut out)
        .unwrap_err();
    assert_eq!(err, JobError::NoSuchJob(JobId(2)));
}

#[tokio::test]
async fn kill_unknown_job_leaves_table_unchanged() {
    let h = harness();
    h.background("sleep 100").await;
    let before = h.jobs.list_jobs();

    let err = h.jobs.send_signal(JobId(42), 9, &mut std::io::sink()).unwrap_err();
    assert_eq!(err, JobError::NoSuchJob(JobId(42)));
    assert_eq!(h.jobs.list_jobs(), before);
    assert!(h.host.signals().is_empty());
}

#[tokio::test]
async fn kill_sends_numeric_signal() {
    let h = harness();
    let (id, pid) = h.background("sleep 100").await;
    h.jobs.send_signal(id, 15, &mut std::io::sink()).unwrap();
    assert_eq!(h.host.signals(), [(pid, Signal::SIGTERM)]);
    // Removal waits for the exit notification.
    assert!(h.control.job(id).is_some());
}

#[tokio::test]
async fn kill_passes_realtime_signal_through() {
    let h = harness();
    let (id, pid) = h.background("sleep 100").await;
    h.jobs.send_signal(id, 34, &mut std::io::sink()).unwrap();
    h.jobs.send_signal(id, 0, &mut std::io::sink()).unwrap();
    assert_eq!(h.host.signal_numbers_to(pid), [34, 0]);
    assert_eq!(h.status_of(id), Some(JobStatus::Running));
}

#[tokio::test]
async fn kill_with_bogus_signal_fails() {
    let h = harness();
    let (id, _) = h.background("sleep 100").await;
    let err = h.jobs.send_signal(id, 999, &mut std::io::sink()).unwrap_err();
    assert!(matches!(err, JobError::SignalFailed { .. }));
}

#[tokio::test]
async fn kill_delivery_failure_is_signal_failed() {
    let h = harness();
    let (id, pid) = h.background("sleep 100").await;
    h.host.refuse_signals_to(pid);
    let err = h.jobs.send_signal(id, 2, &mut std::io::sink()).unwrap_err();
    assert!(matches!(err, JobError::SignalFailed { pid: 100, .. }));
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn scenario_background_stop_resume_exit() {
    let h = harness();
    let (id, pid) = h.background("sleep 100").await;
    assert_eq!((id, pid), (JobId(1), Pid::from_raw(100)));
    assert_eq!(h.status_of(id), Some(JobStatus::Running));

    h.host.deliver_stop(pid);
    h.bridge.handle(SignalEvent::ChildChanged);
    assert_eq!(h.status_of(id), Some(JobStatus::Stopped));
    {
        let state = h.control.lock();
        let job = state.jobs.find_by_id(id).unwrap();
        assert!(job.suspension_time().is_some());
    }

    let mut out = Vec::new();
    let resumed = h
        .jobs
        .send_to_background(JobTarget::Latest, &mut out)
        .unwrap()
        .unwrap();
    assert_eq!(resumed.id, id);
    assert_eq!(out, b"sleep 100\n");
    assert_eq!(h.host.signals(), [(pid, Signal::SIGCONT)]);
    assert_eq!(h.control.foreground_pid(), None);

    h.host.deliver_exit(pid, 0);
    h.bridge.handle(SignalEvent::ChildChanged);
    assert!(h.jobs.list_jobs().is_empty());
}

#[tokio::test(start_paused = true)]
async fn terminate_all_escalates_laggards() {
    let h = harness();
    let (a, pa) = h.background("polite").await;
    let (b, pb) = h.background("stubborn").await;
    let (c, pc) = h.background("suspended").await;
    h.host.deliver_stop(pc);
    h.bridge.handle(SignalEvent::ChildChanged);

    h.host
        .react(pa, Signal::SIGTERM, WaitStatus::Signaled(pa, Signal::SIGTERM, false));
    h.host
        .react(pc, Signal::SIGCONT, WaitStatus::Signaled(pc, Signal::SIGTERM, false));

    let mut out = Vec::new();
    let report = h
        .jobs
        .terminate_all(Duration::from_secs(5), &mut out)
        .await;

    assert_eq!(report.terminated, [a, c]);
    assert_eq!(report.killed, [b]);
    assert!(report.is_clean());
    assert_eq!(h.host.signals_to(pa), [Signal::SIGTERM]);
    assert_eq!(h.host.signals_to(pb), [Signal::SIGTERM, Signal::SIGKILL]);
    assert_eq!(h.host.signals_to(pc), [Signal::SIGTERM, Signal::SIGCONT]);
    assert!(h.jobs.list_jobs().is_empty());

    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("[2] Sending SIGTERM... (5 seconds passed) Sending SIGKILL... Done."));
}

#[tokio::test(start_paused = true)]
async fn terminate_all_is_best_effort() {
    let h = harness();
    let (a, pa) = h.background("unreachable").await;
    let (b, pb) = h.background("normal").await;
    h.host.refuse_signals_to(pa);
    h.host
        .react(pb, Signal::SIGTERM, WaitStatus::Exited(pb, 0));

    let mut out = Vec::new();
    let report = h
        .jobs
        .terminate_all(Duration::from_millis(300), &mut out)
        .await;

    assert_eq!(report.terminated, [b]);
    let failed: Vec<_> = report.failures.iter().map(|(id, _)| *id).collect();
    assert_eq!(failed, [a, a]);
    assert!(h.jobs.list_jobs().is_empty());
}

#[tokio::test]
async fn terminate_all_on_empty_table() {
    let h = harness();
    let mut out = Vec::new();
    let report = h.jobs.terminate_all(Duration::from_secs(5), &mut out).await;
    assert_eq!(report, Default::default());
    assert!(out.is_empty());
}

#[tokio::test]
async fn bridge_stands_down_while_draining() {
    let h = harness();
    let (id, pid) = h.background("sleep 1").await;
    h.control.lock().draining = true;
    h.host.deliver_exit(pid, 0);
    h.bridge.handle(SignalEvent::ChildChanged);
    assert!(h.control.job(id).is_some());
    h.control.lock().draining = false;
    h.bridge.handle(SignalEvent::ChildChanged);
    assert!(h.control.job(id).is_none());
}

// ============================================================================
// Foreground wait failures
// ============================================================================

#[tokio::test]
async fn wait_on_reaped_child_counts_as_exit() {
    let h = harness();
    let (id, pid) = h.background("sleep 100").await;
    // Someone else collects the exit first.
    h.host.deliver_exit(pid, 0);
    assert!(matches!(h.host.poll(pid), Ok(WaitStatus::Exited(_, 0))));

    h.control.lock().foreground = Some(pid);
    let outcome = h.control.wait_for_job(pid).await.unwrap();
    assert_eq!(outcome, WaitOutcome::Reaped);
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(h.control.foreground_pid(), None);
    assert!(h.control.job(id).is_none());
}

#[tokio::test]
async fn failed_wait_clears_foreground_and_keeps_job() {
    let h = harness();
    let (id, pid) = h.background("sleep 100").await;
    h.host.fail_next_wait(pid, nix::errno::Errno::EINVAL);

    h.control.lock().foreground = Some(pid);
    let err = h.control.wait_for_job(pid).await.unwrap_err();
    assert!(matches!(err, JobError::WaitFailed { pid: 100, .. }), "{err:?}");
    assert_eq!(h.control.foreground_pid(), None);
    assert_eq!(h.status_of(id), Some(JobStatus::Running));
}

#[tokio::test]
async fn failed_fg_wait_surfaces_as_wait_failed() {
    let h = harness();
    let (id, pid) = h.background("sleep 100").await;
    h.host.fail_next_wait(pid, nix::errno::Errno::EINVAL);

    let mut out = Vec::new();
    let err = h
        .jobs
        .bring_to_foreground(JobTarget::Id(id), &mut out)
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::WaitFailed { .. }));
    assert_eq!(h.control.foreground_pid(), None);
    assert!(h.control.job(id).is_some());
}
