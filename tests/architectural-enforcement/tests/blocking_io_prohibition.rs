//! Integration Test: Blocking I/O Prohibition
//!
//! Async functions use `tokio::fs`, `tokio::net`, `tokio::io` and the async
//! reqwest client. Blocking calls are tolerated in plain functions that run
//! before the runtime starts (config loading) and in tests.

use architectural_enforcement::{
    code_part, is_in_async_fn, is_test_code, production_sources, Violation,
};

const FORBIDDEN: &[(&str, &str)] = &[
    ("std::fs::", "Blocking file I/O"),
    ("std::net::TcpStream", "Blocking network I/O"),
    ("std::net::TcpListener", "Blocking network I/O"),
    ("std::process::Command", "Blocking process I/O"),
    ("reqwest::blocking", "Blocking HTTP client"),
    ("std::io::stdin()", "Blocking stdin"),
    ("std::io::stdout()", "Blocking stdout"),
    ("thread::sleep", "Blocking sleep"),
];

fn blocking_call(code: &str) -> Option<&'static str> {
    FORBIDDEN
        .iter()
        .find(|(pattern, _)| code.contains(pattern))
        .map(|(_, kind)| *kind)
}

#[test]
fn test_no_blocking_io_in_async_code() {
    let mut violations = Vec::new();

    for file in production_sources() {
        let lines = file.lines();
        for (idx, line) in lines.iter().enumerate() {
            let Some(kind) = blocking_call(code_part(line)) else {
                continue;
            };
            if is_test_code(&lines, idx) || !is_in_async_fn(&lines, idx) {
                continue;
            }
            violations.push(Violation {
                path: file.path.clone(),
                line: idx + 1,
                kind,
                text: line.trim().to_string(),
            });
        }
    }

    if !violations.is_empty() {
        eprintln!("\nBlocking I/O found in async code:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nUse tokio::fs, tokio::net, tokio::io::stdin/stdout or move the call");
        eprintln!("into a plain function that runs before the runtime.");
        panic!("Found {} blocking I/O violation(s)", violations.len());
    }
}

#[test]
fn test_detects_blocking_calls() {
    assert_eq!(
        blocking_call("let s = std::fs::read_to_string(path)?;"),
        Some("Blocking file I/O")
    );
    assert_eq!(
        blocking_call("let out = std::io::stdout();"),
        Some("Blocking stdout")
    );
    assert_eq!(blocking_call("let out = tokio::io::stdout();"), None);
    assert_eq!(blocking_call("let body = response.bytes_stream();"), None);
}
