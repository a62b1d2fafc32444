//! Operator console formatting.

use bedrock_warden::console::{line_ending, Console};

#[test]
fn log_lines_are_timestamped() {
    let (console, out) = Console::capture();

    console.log("snapshot saves/manual/20210102-010000 created");

    let text = out.contents();
    assert!(text.starts_with('['));
    let (stamp, rest) = text.split_once("] ").unwrap();
    assert_eq!(stamp.len(), "[20210102-01:00:00".len());
    assert_eq!(
        rest,
        format!("snapshot saves/manual/20210102-010000 created{}", line_ending())
    );
}

#[test]
fn println_and_print_write_verbatim() {
    let (console, out) = Console::capture();

    console.print("> ");
    console.println("* saves/manual/a abc1234 msg (2 days ago)");

    assert_eq!(
        out.contents(),
        format!("> * saves/manual/a abc1234 msg (2 days ago){}", line_ending())
    );
}

#[test]
fn clones_share_one_sink() {
    let (console, out) = Console::capture();
    let other = console.clone();

    console.println("one");
    other.println("two");

    assert!(out.contains("one"));
    assert!(out.contains("two"));
}
