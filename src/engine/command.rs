//! External program invocation for the command-backed engines.
//!
//! The `CommandRunner` trait keeps the separator, converter and downloader
//! testable without the real tools installed.

use std::collections::HashMap;
use std::process::Command;

/// Trait for executing external programs.
///
/// Object-safe, Send + Sync for use from the blocking pool.
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args`, returning stdout on success.
    ///
    /// The error string is already suitable for a user-facing report.
    fn run(&self, program: &str, args: &[String]) -> Result<String, String>;
}

/// Production runner using std::process::Command.
#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<String, String> {
        tracing::debug!(program, ?args, "running external command");
        let output = Command::new(program).args(args).output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                format!("{} not found in PATH", program)
            } else {
                format!("failed to execute {}: {}", program, e)
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr.lines().rev().take(5).collect::<Vec<_>>().join(" | ");
            return Err(format!(
                "{} failed with status {:?}: {}",
                program, output.status, tail
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Replaces `{key}` placeholders in every argument.
///
/// Substitution is a single left-to-right pass, so text coming from a value
/// is never expanded again. Unknown placeholders are kept verbatim.
pub fn render_args(template: &[String], vars: &HashMap<&str, String>) -> Vec<String> {
    template.iter().map(|arg| render_arg(arg, vars)).collect()
}

fn render_arg(arg: &str, vars: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(arg.len());
    let mut rest = arg;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let key = &after[..close];
                match vars.get(key) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
pub(crate) mod testing {
    use super::CommandRunner;
    use std::sync::Mutex;

    /// Records invocations and hands each one to a closure.
    pub struct RecordingRunner<F> {
        pub calls: Mutex<Vec<(String, Vec<String>)>>,
        pub on_run: F,
    }

    impl<F> RecordingRunner<F>
    where
        F: Fn(&[String]) -> Result<String, String> + Send + Sync,
    {
        pub fn new(on_run: F) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                on_run,
            }
        }
    }

    impl<F> CommandRunner for RecordingRunner<F>
    where
        F: Fn(&[String]) -> Result<String, String> + Send + Sync,
    {
        fn run(&self, program: &str, args: &[String]) -> Result<String, String> {
            self.calls
                .lock()
                .unwrap()
                .push((program.to_string(), args.to_vec()));
            (self.on_run)(args)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_args_substitutes_all_placeholders() {
        let template = vec![
            "-i".to_string(),
            "{input}".to_string(),
            "--out={output}".to_string(),
            "{untouched}".to_string(),
        ];
        let vars = HashMap::from([
            ("input", "/tmp/a.wav".to_string()),
            ("output", "/tmp/b.wav".to_string()),
        ]);

        assert_eq!(
            render_args(&template, &vars),
            vec!["-i", "/tmp/a.wav", "--out=/tmp/b.wav", "{untouched}"]
        );
    }

    #[test]
    fn substituted_values_are_not_expanded_again() {
        let template = vec!["{url}".to_string(), "-o".to_string(), "{output}".to_string()];
        let vars = HashMap::from([
            ("url", "https://example.com/{output}?q={model}".to_string()),
            ("output", "/tmp/source.wav".to_string()),
            ("model", "/models/alto.pth".to_string()),
        ]);

        assert_eq!(
            render_args(&template, &vars),
            vec!["https://example.com/{output}?q={model}", "-o", "/tmp/source.wav"]
        );
    }

    #[test]
    fn unbalanced_braces_are_kept() {
        let vars = HashMap::from([("input", "a.wav".to_string())]);
        assert_eq!(
            render_args(&["{input}-{".to_string(), "}{".to_string()], &vars),
            vec!["a.wav-{", "}{"]
        );
    }

    #[test]
    fn missing_program_reports_not_found() {
        let err = SystemCommandRunner::new()
            .run("voicover-definitely-missing-binary", &[])
            .unwrap_err();
        assert!(err.contains("not found"));
    }

    #[cfg(unix)]
    #[test]
    fn failing_program_reports_status() {
        let err = SystemCommandRunner::new()
            .run("sh", &["-c".to_string(), "echo boom >&2; exit 3".to_string()])
            .unwrap_err();
        assert!(err.contains("boom"));
    }

    #[cfg(unix)]
    #[test]
    fn successful_program_returns_stdout() {
        let out = SystemCommandRunner::new()
            .run("sh", &["-c".to_string(), "printf ok".to_string()])
            .unwrap();
        assert_eq!(out, "ok");
    }
}
