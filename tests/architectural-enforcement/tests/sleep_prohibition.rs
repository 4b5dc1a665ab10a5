//! Integration Test: Sleep Prohibition
//!
//! Production code waits on I/O, channels or cancellation, never on the
//! clock. The one exception is the retry backoff in the session controller.
//! `std::thread::sleep` is never allowed.

use architectural_enforcement::{code_part, is_test_code, production_sources, Violation};

#[test]
fn test_no_sleep_in_production_code() {
    let mut violations = Vec::new();

    for file in production_sources() {
        let lines = file.lines();
        for (idx, line) in lines.iter().enumerate() {
            let code = code_part(line);
            if !(code.contains("::sleep(") || code.contains(".sleep(")) {
                continue;
            }
            if is_test_code(&lines, idx) {
                continue;
            }
            let thread_sleep = code.contains("thread::sleep");
            if !thread_sleep && is_backoff_context(&lines, idx) {
                continue;
            }
            violations.push(Violation {
                path: file.path.clone(),
                line: idx + 1,
                kind: "Sleep",
                text: line.trim().to_string(),
            });
        }
    }

    if !violations.is_empty() {
        eprintln!("\nSleep calls found in production code:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nAllowed: tokio::time::sleep on a delay from RetryPolicy::backoff_for_attempt");
        eprintln!("Use channels, CancellationToken or tokio::time::interval instead.");
        panic!("Found {} sleep violation(s)", violations.len());
    }
}

/// A sleep is backoff when a retry delay is computed just above it
fn is_backoff_context(lines: &[&str], idx: usize) -> bool {
    let window = &lines[idx.saturating_sub(25)..(idx + 5).min(lines.len())];

    let has_delay = window
        .iter()
        .any(|l| l.contains("backoff_for_attempt") || l.contains("<<") || l.contains("pow"));
    let has_retry = window.iter().any(|l| {
        let l = l.to_lowercase();
        l.contains("retry") || l.contains("attempt")
    });

    has_delay && has_retry
}

#[test]
fn test_backoff_detection() {
    let code = [
        "Attempt::Transport(error) => {",
        "    if attempt < self.retry.max_retries {",
        "        let delay = self.retry.backoff_for_attempt(attempt);",
        "        observer.on_retry(attempt, delay, &error);",
        "        tokio::select! {",
        "            () = tokio::time::sleep(delay) => {}",
        "        }",
        "    }",
        "}",
    ];
    assert!(is_backoff_context(&code, 5));
}

#[test]
fn test_polling_sleep_is_not_backoff() {
    let code = [
        "loop {",
        "    if ready() { break; }",
        "    tokio::time::sleep(Duration::from_millis(10)).await;",
        "}",
    ];
    assert!(!is_backoff_context(&code, 2));
}
