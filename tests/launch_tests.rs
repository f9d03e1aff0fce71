
use procscope::layout::StructKind;
use procscope::{ArchitectureProfile, Error, LaunchRequest, Timeout, WaitOutcome};
use rstest::rstest;
use shared::{SimulatedMachine, assert_no_leaks, control};

#[rstest]
#[case(ArchitectureProfile::X86, 68)]
#[case(ArchitectureProfile::X64, 104)]
#[test_log::test]
fn test_launch_decodes_creation_result(
    #[case] profile: ArchitectureProfile,
    #[case] startup_size: u32,
) {
    let machine = SimulatedMachine::new(profile);
    let control = control(&machine);

    let launched = control
        .launch(&LaunchRequest::new("cmd.exe /c echo hello").no_window())
        .unwrap();
    assert_eq!(launched.pid, 9000);
    assert_eq!(launched.tid, 9001);
    assert_ne!(launched.process.raw(), 0);
    assert_ne!(launched.thread.raw(), 0);
    assert_eq!(
        startup_size as usize,
        profile.layout(StructKind::StartupParameters).size
    );
    machine.with_stats(|stats| assert_eq!(stats.startup_cb, vec![startup_size]));

    // Both structure buffers are gone once launch returns.
    assert_eq!(machine.live_reservations(), 0);
    assert_eq!(machine.open_handles(), 2);

    assert_eq!(launched.close().unwrap(), (true, true));
    assert_no_leaks(&machine);
}

#[test_log::test]
fn test_dropping_launch_result_closes_handles() {
    let machine = SimulatedMachine::new(ArchitectureProfile::X64);
    let control = control(&machine);

    {
        let _launched = control.launch(&LaunchRequest::new("cmd.exe")).unwrap();
        assert_eq!(machine.open_handles(), 2);
    }
    assert_no_leaks(&machine);
}

#[rstest]
#[case(2, Some("file not found"))]
#[case(3, Some("path not found"))]
#[case(5, Some("access denied"))]
#[case(193, Some("not a valid executable"))]
#[case(1450, None)]
#[test_log::test]
fn test_launch_failure_is_classified(#[case] code: u32, #[case] meaning: Option<&str>) {
    let machine = SimulatedMachine::new(ArchitectureProfile::X64);
    machine.fail_launches_with(code);
    let control = control(&machine);

    let request = LaunchRequest::new("C:\\does\\not\\exist.exe")
        .application_name("C:\\does\\not\\exist.exe");
    match control.launch(&request).unwrap_err() {
        Error::Launch(err) => {
            assert_eq!(err.code, code);
            assert_eq!(err.meaning, meaning);
        }
        other => panic!("expected a launch error, got {other:?}"),
    }
    assert_no_leaks(&machine);
}

#[test_log::test]
fn test_file_not_found_message() {
    let machine = SimulatedMachine::new(ArchitectureProfile::X86);
    machine.fail_launches_with(2);
    let control = control(&machine);

    let err = control.launch(&LaunchRequest::new("missing.exe")).unwrap_err();
    assert_eq!(
        err.to_string(),
        "process creation failed with error 2 (0x2): file not found"
    );
}

#[rstest]
#[case(0, 68)]
#[case(1, 16)]
#[test_log::test]
fn test_allocation_failure_releases_earlier_buffers(
    #[case] succeed: usize,
    #[case] failed_size: usize,
) {
    let machine = SimulatedMachine::new(ArchitectureProfile::X86);
    machine.fail_reservations_after(succeed);
    let control = control(&machine);

    let err = control.launch(&LaunchRequest::new("cmd.exe")).unwrap_err();
    assert!(matches!(err, Error::AllocationFailed { size } if size == failed_size));
    machine.with_stats(|stats| {
        assert_eq!(stats.reservations, succeed);
        assert_eq!(stats.frees, succeed);
    });
    assert_eq!(machine.call_count("CreateProcessW"), 0);
    assert_no_leaks(&machine);
}

#[rstest]
#[case(ArchitectureProfile::X86)]
#[case(ArchitectureProfile::X64)]
#[test_log::test]
fn test_wait_and_collect_exit_code(#[case] profile: ArchitectureProfile) {
    let machine = SimulatedMachine::new(profile);
    let control = control(&machine);

    let launched = control
        .launch(&LaunchRequest::new("cmd.exe /c exit 3"))
        .unwrap();
    let (outcome, code) = control
        .wait_and_collect(&launched.process, Timeout::Millis(5000))
        .unwrap();
    assert_eq!(outcome, WaitOutcome::Signaled);
    assert_eq!(code, Some(3));

    drop(launched);
    assert_no_leaks(&machine);
}

#[test_log::test]
fn test_wait_and_collect_with_configured_timeout() {
    let machine = SimulatedMachine::new(ArchitectureProfile::X64);
    let control = control(&machine);

    let launched = control.launch(&LaunchRequest::new("cmd.exe")).unwrap();
    let (outcome, code) = control.wait_and_collect_default(&launched.process).unwrap();
    assert_eq!(outcome, WaitOutcome::Signaled);
    assert_eq!(code, Some(0));
}

#[test_log::test]
fn test_immediate_wait_on_running_child_reports_no_exit_code() {
    let machine = SimulatedMachine::new(ArchitectureProfile::X64);
    let control = control(&machine);

    let launched = control.launch(&LaunchRequest::new("cmd.exe")).unwrap();
    let (outcome, code) = control
        .wait_and_collect(&launched.process, Timeout::IMMEDIATE)
        .unwrap();
    assert_eq!(outcome, WaitOutcome::TimedOut);
    assert_eq!(code, None);
}
