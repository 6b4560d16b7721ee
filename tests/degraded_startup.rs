//! Startup contract of the bot process: missing credentials put it into
//! degraded mode with a warning instead of terminating it.

use std::process::{Command, Stdio};
use std::time::Duration;

#[test]
fn missing_token_keeps_the_process_alive_and_warns() {
    let dir = tempfile::tempdir().expect("tempdir");

    // Run from an empty directory so no .env or config files leak in.
    let mut child = Command::new(env!("CARGO_BIN_EXE_artovix-bot"))
        .current_dir(dir.path())
        .env_remove("BOT_TOKEN")
        .env_remove("GROQ_API_KEY")
        .env_remove("HF_API_KEY")
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn bot binary");

    std::thread::sleep(Duration::from_secs(2));

    let still_running = child.try_wait().expect("try_wait").is_none();
    if !still_running {
        let output = child.wait_with_output().expect("collect output");
        panic!(
            "process exited in degraded mode: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }

    child.kill().expect("kill idling bot");
    let output = child.wait_with_output().expect("collect output");
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(
        stderr.contains("BOT_TOKEN"),
        "degraded warning must name the missing credential, got:\n{stderr}"
    );
    assert!(
        stderr.contains("GROQ_API_KEY"),
        "degraded warning must name the missing LLM key, got:\n{stderr}"
    );
}
