//! Runs the `nextfit` binary end to end.

use std::{
    io::Write,
    process::{Command, Output, Stdio},
};

fn run_with(input: &[u8], region_size: Option<&str>) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_nextfit"));
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .env_remove("NEXTFIT_REGION_SIZE");

    if let Some(size) = region_size {
        command.env("NEXTFIT_REGION_SIZE", size);
    }

    let mut child = command.spawn().unwrap();

    // The binary may exit before reading anything, a broken pipe is fine.
    let _ = child.stdin.take().unwrap().write_all(input);

    child.wait_with_output().unwrap()
}

fn run(input: &[u8]) -> Output {
    run_with(input, None)
}

#[test]
fn mixed_commands() {
    let output = run(b"aaabcaa");

    assert!(output.status.success());
    assert_eq!(output.stdout, b"Count: 7\nCollection: 0,1,5,6\n");
}

#[test]
fn empty_input() {
    let output = run(b"");

    assert!(output.status.success());
    assert_eq!(output.stdout, b"Count: 0\nCollection: \n");
}

#[test]
fn stops_at_first_unknown_byte() {
    let output = run(b"abab\naaaa");

    assert!(output.status.success());
    assert_eq!(output.stdout, b"Count: 4\nCollection: 0,2\n");
}

#[test]
fn remove_everything() {
    let output = run(b"aaaccccc");

    assert!(output.status.success());
    assert_eq!(output.stdout, b"Count: 8\nCollection: \n");
}

#[test]
fn long_input_reuses_memory() {
    // 10_000 appends each followed by a removal never need more than one
    // node at a time, even in the smallest region.
    let input = b"ac".repeat(10_000);
    let output = run_with(&input, Some("1"));

    assert!(output.status.success());
    assert_eq!(output.stdout, b"Count: 20000\nCollection: \n");
}

#[test]
fn invalid_region_size_fails() {
    let output = run_with(b"aaa", Some("lots"));

    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("NEXTFIT_REGION_SIZE"));
}
