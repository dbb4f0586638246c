use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

const SESSION: &str = r#"
library: [math, counter, text]
links:
  greeting: "hello"
  limit: 2
invoke:
  - procedure: onTick
    args: [5]
  - procedure: onTick
    args: [7]
"#;

const SCRIPT: &str = r#"
var c = counter.create(10)
log(greeting, math.add(limit, 3))
log(text.upper(greeting), text.join(["a", 1, true], "-"))
function onTick(n) {
  log("tick", n, c.inc())
}
"#;

#[test]
fn run_prints_sandbox_logs_and_invocations() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(dir.path().join("heavenly.yml"), SESSION)?;
    fs::write(dir.path().join("script.js"), SCRIPT)?;

    #[allow(deprecated)]
    let assert = Command::cargo_bin("heavenly")?
        .current_dir(dir.path())
        .args(["run", "script.js"])
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        lines,
        vec!["hello 5", "HELLO a-1-true", "tick 5 11", "tick 7 12"]
    );

    Ok(())
}

#[test]
fn script_path_is_relative_to_the_config() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let session = dir.path().join("session");
    fs::create_dir_all(&session)?;
    fs::write(session.join("demo.yml"), "links:\n  who: world\n")?;
    fs::write(session.join("hello.js"), "log('hello', who)\n")?;

    #[allow(deprecated)]
    Command::cargo_bin("heavenly")?
        .current_dir(dir.path())
        .args(["--config", "session/demo.yml", "run", "hello.js"])
        .assert()
        .success()
        .stdout(predicate::eq("hello world\n"));

    Ok(())
}

#[test]
fn run_without_config_uses_an_empty_session() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(dir.path().join("plain.js"), "var x = 40\nlog(x + 2)\n")?;

    #[allow(deprecated)]
    Command::cargo_bin("heavenly")?
        .current_dir(dir.path())
        .args(["run", "plain.js"])
        .assert()
        .success()
        .stdout(predicate::eq("42\n"));

    Ok(())
}

#[test]
fn emit_prints_the_linking_preamble() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(dir.path().join("heavenly.yml"), SESSION)?;
    fs::write(dir.path().join("script.js"), SCRIPT)?;

    #[allow(deprecated)]
    Command::cargo_bin("heavenly")?
        .current_dir(dir.path())
        .args(["emit", "script.js"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            r#"var math = linkHeavenlyObject(["_global_math"], ["pi","add","max","sqrt"]);"#,
        ))
        .stdout(predicate::str::contains(
            r#"var counter = linkHeavenlyObject(["_global_counter"], ["create"]);"#,
        ))
        .stdout(predicate::str::contains("var greeting = \"hello\";"))
        .stdout(predicate::str::contains("var limit = 2;"))
        .stdout(predicate::str::contains("tick").not());

    Ok(())
}

#[test]
fn host_errors_fail_the_run() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(dir.path().join("heavenly.yml"), "library: [math]\n")?;
    fs::write(dir.path().join("bad.js"), "log('before')\nmath.sqrt(-1)\n")?;

    #[allow(deprecated)]
    Command::cargo_bin("heavenly")?
        .current_dir(dir.path())
        .args(["run", "bad.js"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("sqrt of negative number"));

    Ok(())
}

#[test]
fn syntax_errors_are_reported() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(dir.path().join("broken.js"), "var = 3\n")?;

    #[allow(deprecated)]
    Command::cargo_bin("heavenly")?
        .current_dir(dir.path())
        .args(["run", "broken.js"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Parser error"));

    Ok(())
}
