//! Batch execution: tiered pre-validation, fallback-command retries, and
//! sandboxed subprocess execution for a single [`crate::workflow::model::Batch`].
//!
//! Grounded in `developer.py`'s `_filesystem_checks` / `_pre_validate_step` /
//! `_execute_step_with_fallbacks` trio: fast filesystem checks run for every
//! step regardless of risk, high-risk steps additionally get an LLM semantic
//! pass, and command steps try `command` then each of `fallback_commands` in
//! order until one succeeds. Commands are never handed to a shell — each is
//! split into argv with `shell-words` and rejected outright if it contains
//! shell metacharacters, mirroring `SafeShellExecutor`'s `ShellInjectionError`
//! / `BlockedCommandError` / `DangerousCommandError` taxonomy.

use crate::integration::driver::Driver;
use crate::workflow::model::{ActionType, Batch, DeveloperStatus, ExecutionPlan, PlanStep, RiskLevel, StepResult};
use crate::OrchestratorError;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Instant;
use tokio::time::Duration;

/// Raw characters that indicate the caller intended shell interpretation
/// (pipes, redirection, substitution, sequencing) rather than a plain argv.
const SHELL_METACHARACTERS: &[char] = &[';', '|', '&', '$', '`', '<', '>', '\n'];

fn dangerous_patterns() -> &'static [regex::Regex] {
    static PATTERNS: OnceLock<Vec<regex::Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"rm\s+-[a-zA-Z]*r[a-zA-Z]*f\s+/(\s|$)",
            r"rm\s+-[a-zA-Z]*f[a-zA-Z]*r\s+/(\s|$)",
            r":\(\)\s*\{\s*:\|:&\s*\}\s*;:",
            r"mkfs\.",
            r"dd\s+if=.*of=/dev/",
            r"git\s+push\s+.*--force(\s|$)(?!.*--force-with-lease)",
            r">\s*/dev/sd[a-z]",
        ]
        .iter()
        .map(|p| regex::Regex::new(p).expect("static dangerous-command pattern must compile"))
        .collect()
    })
}

/// Executables blocked outright regardless of arguments.
const BLOCKED_EXECUTABLES: &[&str] = &["shutdown", "reboot", "halt", "mkfs", "fdisk", "sudo", "su"];

/// Parse `command` into argv, rejecting shell-metacharacter use and known
/// dangerous/blocked commands. Never invokes a shell: the returned argv is
/// passed straight to [`tokio::process::Command`].
fn guard_command(command: &str, allowlist: Option<&[String]>) -> Result<Vec<String>, OrchestratorError> {
    if command.contains(SHELL_METACHARACTERS) {
        return Err(OrchestratorError::ShellInjection(command.to_string()));
    }

    for pattern in dangerous_patterns() {
        if pattern.is_match(command) {
            return Err(OrchestratorError::DangerousCommand(command.to_string()));
        }
    }

    let argv = shell_words::split(command)
        .map_err(|e| OrchestratorError::ShellInjection(format!("{command}: {e}")))?;
    let Some(executable) = argv.first() else {
        return Err(OrchestratorError::ShellInjection("empty command".to_string()));
    };

    if BLOCKED_EXECUTABLES.contains(&executable.as_str()) {
        return Err(OrchestratorError::BlockedCommand(command.to_string()));
    }

    if let Some(allowlist) = allowlist {
        if !allowlist.iter().any(|a| a == executable) {
            return Err(OrchestratorError::CommandNotAllowed(command.to_string()));
        }
    }

    Ok(argv)
}

/// Outcome of the cheap, non-LLM pre-execution checks.
struct ValidationResult {
    ok: bool,
    issue: Option<String>,
}

impl ValidationResult {
    fn ok() -> Self {
        Self { ok: true, issue: None }
    }

    fn fail(issue: impl Into<String>) -> Self {
        Self {
            ok: false,
            issue: Some(issue.into()),
        }
    }
}

pub struct BatchExecutor {
    driver: Arc<dyn Driver>,
    allowlist: Option<Vec<String>>,
    command_timeout: Duration,
}

impl BatchExecutor {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            allowlist: None,
            command_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_allowlist(mut self, allowlist: Vec<String>) -> Self {
        self.allowlist = Some(allowlist);
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Working directory exists (if specified), code actions target an
    /// existing file or a directory that can hold a new one, command actions
    /// name an executable actually on `PATH`. No LLM call is involved.
    fn filesystem_checks(&self, step: &PlanStep) -> ValidationResult {
        if let Some(cwd) = &step.cwd {
            if !Path::new(cwd).is_dir() {
                return ValidationResult::fail(format!("working directory does not exist: {cwd}"));
            }
        }

        match step.action_type {
            ActionType::Code => {
                if let Some(file_path) = &step.file_path {
                    let path = Path::new(file_path);
                    if path.exists() {
                        return ValidationResult::ok();
                    }
                    match path.parent() {
                        Some(parent) if parent.as_os_str().is_empty() || parent.is_dir() => ValidationResult::ok(),
                        _ => ValidationResult::fail(format!("parent directory does not exist for file: {file_path}")),
                    }
                } else {
                    ValidationResult::ok()
                }
            }
            ActionType::Command => {
                if let Some(command) = &step.command {
                    match guard_command(command, self.allowlist.as_deref()) {
                        Ok(argv) => {
                            let executable = &argv[0];
                            if Path::new(executable).is_absolute() {
                                if Path::new(executable).exists() {
                                    ValidationResult::ok()
                                } else {
                                    ValidationResult::fail(format!("command not found: {executable}"))
                                }
                            } else if which::which(executable).is_ok() {
                                ValidationResult::ok()
                            } else {
                                ValidationResult::fail(format!("command not found: {executable}"))
                            }
                        }
                        Err(e) => ValidationResult::fail(e.to_string()),
                    }
                } else {
                    ValidationResult::ok()
                }
            }
            ActionType::Validation | ActionType::Manual => ValidationResult::ok(),
        }
    }

    /// Tiered pre-validation: filesystem checks always run; high-risk steps
    /// additionally get a semantic pass through the driver. The call site and
    /// its error path are real; the pass/fail judgment itself is a stub that
    /// lets any answered call through and only fails on the call erroring
    /// outright, leaving the hook ready for a stricter verdict parse later.
    async fn pre_validate_step(&self, step: &PlanStep) -> ValidationResult {
        let fs_result = self.filesystem_checks(step);
        if !fs_result.ok || step.risk_level != RiskLevel::High {
            return fs_result;
        }

        let prompt = format!(
            "A high-risk step is about to execute. Note anything that looks unsafe.\n\n\
             Description: {}\nCommand: {:?}\nFile: {:?}",
            step.description, step.command, step.file_path
        );
        match self.driver.execute_agentic(&prompt, step.cwd.as_deref().unwrap_or(".")).await {
            Ok(_) => ValidationResult::ok(),
            Err(e) => ValidationResult::fail(format!("semantic validation unavailable: {e}")),
        }
    }

    /// Run one step, trying `command` then each `fallback_commands` entry in
    /// order until one succeeds, or running the code-write/validation paths.
    async fn execute_step(&self, step: &PlanStep) -> StepResult {
        let start = Instant::now();

        let result = match step.action_type {
            ActionType::Code => self.execute_code_step(step).await,
            ActionType::Command => self.execute_command_step(step).await,
            ActionType::Validation => self.execute_validation_step(step).await,
            ActionType::Manual => Err(("manual steps require a human and are never auto-executed".to_string(), None)),
        };

        let duration_seconds = start.elapsed().as_secs_f64();
        match result {
            Ok((output, executed_command)) => StepResult {
                step_id: step.id.clone(),
                status: DeveloperStatus::Completed,
                output,
                error: None,
                executed_command,
                duration_seconds,
            },
            Err((error, executed_command)) => StepResult {
                step_id: step.id.clone(),
                status: DeveloperStatus::Failed,
                output: String::new(),
                error: Some(error),
                executed_command,
                duration_seconds,
            },
        }
    }

    async fn execute_code_step(&self, step: &PlanStep) -> Result<(String, Option<String>), (String, Option<String>)> {
        let (Some(file_path), Some(code_change)) = (&step.file_path, &step.code_change) else {
            return Err(("code action requires file_path and code_change".to_string(), None));
        };

        if let Some(parent) = Path::new(file_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| (format!("failed to create parent directory: {e}"), None))?;
            }
        }
        tokio::fs::write(file_path, code_change)
            .await
            .map_err(|e| (format!("failed to write {file_path}: {e}"), None))?;

        let mut output = format!("wrote code to {file_path}");

        if let Some(validation_command) = &step.validation_command {
            match self.run_argv(validation_command, None).await {
                Ok(validation_output) => {
                    output.push_str(&format!("\nvalidation: {validation_output}"));
                    Ok((output, None))
                }
                Err(e) => Err((format!("validation failed: {e}"), Some(validation_command.clone()))),
            }
        } else {
            Ok((output, None))
        }
    }

    async fn execute_command_step(&self, step: &PlanStep) -> Result<(String, Option<String>), (String, Option<String>)> {
        let Some(primary) = &step.command else {
            return Err(("command action requires a command".to_string(), None));
        };

        let mut last_error = None;
        for candidate in std::iter::once(primary).chain(step.fallback_commands.iter()) {
            if candidate.trim().is_empty() {
                continue;
            }
            match self.run_argv(candidate, step.expected_output_pattern.as_deref()).await {
                Ok(output) => return Ok((output, Some(candidate.clone()))),
                Err(e) => last_error = Some((e, candidate.clone())),
            }
        }

        match last_error {
            Some((error, command)) => Err((error, Some(command))),
            None => Err(("no command or fallback to run".to_string(), None)),
        }
    }

    async fn execute_validation_step(&self, step: &PlanStep) -> Result<(String, Option<String>), (String, Option<String>)> {
        let Some(validation_command) = &step.validation_command else {
            return Err(("validation action requires validation_command".to_string(), None));
        };
        self.run_argv(validation_command, step.expected_output_pattern.as_deref())
            .await
            .map(|output| (output, Some(validation_command.clone())))
            .map_err(|e| (e, Some(validation_command.clone())))
    }

    /// Guard, spawn (argv only, no shell), strip ANSI, and validate exit code
    /// plus optional output pattern.
    async fn run_argv(&self, command: &str, expected_output_pattern: Option<&str>) -> Result<String, String> {
        let argv = guard_command(command, self.allowlist.as_deref()).map_err(|e| e.to_string())?;

        let mut cmd = tokio::process::Command::new(&argv[0]);
        cmd.args(&argv[1..]);
        cmd.kill_on_drop(true);

        let output = tokio::time::timeout(self.command_timeout, cmd.output())
            .await
            .map_err(|_| format!("command timed out after {:?}: {command}", self.command_timeout))?
            .map_err(|e| format!("failed to spawn {command}: {e}"))?;

        let stdout = strip_ansi_escapes::strip_str(&String::from_utf8_lossy(&output.stdout));
        let stderr = strip_ansi_escapes::strip_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(format!("exit code {:?}: {stderr}", output.status.code()));
        }

        if let Some(pattern) = expected_output_pattern {
            let re = regex::Regex::new(pattern).map_err(|e| format!("invalid expected_output_pattern: {e}"))?;
            if !re.is_match(&stdout) {
                return Err(format!("output did not match expected pattern `{pattern}`"));
            }
        }

        Ok(stdout)
    }

    /// Execute every step of `batch` in order, skipping anything already in
    /// `already_skipped` and cascading a skip to any step whose dependency
    /// fails or is skipped within this batch.
    pub async fn execute_batch(
        &self,
        plan: &ExecutionPlan,
        batch: &Batch,
        already_skipped: &HashSet<String>,
    ) -> crate::workflow::model::BatchResult {
        let _ = plan;
        let mut unmet: HashSet<String> = already_skipped.clone();
        let mut step_results = Vec::with_capacity(batch.steps.len());
        let mut cascaded_skips = Vec::new();

        for step in &batch.steps {
            if unmet.contains(&step.id) {
                cascaded_skips.push(step.id.clone());
                step_results.push(StepResult {
                    step_id: step.id.clone(),
                    status: DeveloperStatus::Skipped,
                    output: String::new(),
                    error: Some("skipped: depends on a failed or skipped step".to_string()),
                    executed_command: None,
                    duration_seconds: 0.0,
                });
                continue;
            }

            if step.depends_on.iter().any(|d| unmet.contains(d)) {
                unmet.insert(step.id.clone());
                cascaded_skips.push(step.id.clone());
                step_results.push(StepResult {
                    step_id: step.id.clone(),
                    status: DeveloperStatus::Skipped,
                    output: String::new(),
                    error: Some("skipped: depends on a failed or skipped step".to_string()),
                    executed_command: None,
                    duration_seconds: 0.0,
                });
                continue;
            }

            let validation = self.pre_validate_step(step).await;
            let result = if !validation.ok {
                unmet.insert(step.id.clone());
                StepResult {
                    step_id: step.id.clone(),
                    status: DeveloperStatus::Failed,
                    output: String::new(),
                    error: validation.issue,
                    executed_command: None,
                    duration_seconds: 0.0,
                }
            } else {
                let result = self.execute_step(step).await;
                if result.status == DeveloperStatus::Failed {
                    unmet.insert(step.id.clone());
                }
                result
            };
            step_results.push(result);
        }

        let all_succeeded = !step_results.iter().any(|r| r.status == DeveloperStatus::Failed);

        crate::workflow::model::BatchResult {
            batch_id: batch.id.clone(),
            step_results,
            cascaded_skips,
            all_succeeded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::driver::test_support::FakeDriver;
    use crate::workflow::model::{Batch, ExecutionPlan, ReviewResult};

    fn fake_executor() -> BatchExecutor {
        BatchExecutor::new(Arc::new(FakeDriver {
            plan: ExecutionPlan {
                summary: String::new(),
                rationale: None,
                batches: vec![],
                total_estimated_minutes: 0,
                tdd_approach: false,
            },
            review: ReviewResult {
                approved: true,
                feedback: String::new(),
                requested_changes: vec![],
            },
        }))
    }

    fn step(id: &str, action: ActionType) -> PlanStep {
        PlanStep {
            id: id.to_string(),
            description: String::new(),
            action_type: action,
            risk_level: RiskLevel::Low,
            file_path: None,
            code_change: None,
            command: None,
            cwd: None,
            validation_command: None,
            expected_output_pattern: None,
            fallback_commands: vec![],
            depends_on: vec![],
            requires_human_judgment: false,
            expect_exit_code: 0,
            is_test_step: false,
            validates_step: None,
        }
    }

    #[test]
    fn guard_command_rejects_shell_metacharacters() {
        let err = guard_command("echo hi; rm -rf /", None).unwrap_err();
        assert!(matches!(err, OrchestratorError::ShellInjection(_)));
    }

    #[test]
    fn guard_command_rejects_dangerous_patterns() {
        let err = guard_command("rm -rf /", None).unwrap_err();
        assert!(matches!(err, OrchestratorError::DangerousCommand(_)));
    }

    #[test]
    fn guard_command_rejects_blocked_executables() {
        let err = guard_command("sudo apt-get update", None).unwrap_err();
        assert!(matches!(err, OrchestratorError::BlockedCommand(_)));
    }

    #[test]
    fn guard_command_enforces_allowlist() {
        let allowlist = vec!["cargo".to_string()];
        assert!(guard_command("cargo test", Some(&allowlist)).is_ok());
        let err = guard_command("npm test", Some(&allowlist)).unwrap_err();
        assert!(matches!(err, OrchestratorError::CommandNotAllowed(_)));
    }

    #[tokio::test]
    async fn command_step_falls_back_on_primary_failure() {
        let executor = fake_executor();
        let mut s = step("s1", ActionType::Command);
        s.command = Some("false".to_string());
        s.fallback_commands = vec!["true".to_string()];

        let result = executor.execute_step(&s).await;
        assert_eq!(result.status, DeveloperStatus::Completed);
        assert_eq!(result.executed_command.as_deref(), Some("true"));
    }

    #[tokio::test]
    async fn command_step_fails_when_all_fallbacks_exhausted() {
        let executor = fake_executor();
        let mut s = step("s1", ActionType::Command);
        s.command = Some("false".to_string());

        let result = executor.execute_step(&s).await;
        assert_eq!(result.status, DeveloperStatus::Failed);
    }

    #[tokio::test]
    async fn failed_step_cascades_skip_to_dependent() {
        let executor = fake_executor();
        let mut failing = step("a", ActionType::Command);
        failing.command = Some("false".to_string());
        let mut dependent = step("b", ActionType::Validation);
        dependent.depends_on = vec!["a".to_string()];
        dependent.validation_command = Some("true".to_string());

        let batch = Batch {
            id: "b1".to_string(),
            description: String::new(),
            steps: vec![failing, dependent],
            requires_approval: false,
            risk_summary: RiskLevel::Low,
        };
        let plan = ExecutionPlan {
            summary: String::new(),
            rationale: None,
            batches: vec![batch.clone()],
            total_estimated_minutes: 0,
            tdd_approach: false,
        };

        let result = executor.execute_batch(&plan, &batch, &HashSet::new()).await;
        assert!(!result.all_succeeded);
        assert_eq!(result.cascaded_skips, vec!["b".to_string()]);
        assert_eq!(result.step_results[1].status, DeveloperStatus::Skipped);
    }

    #[tokio::test]
    async fn already_skipped_steps_are_not_executed() {
        let executor = fake_executor();
        let mut s = step("a", ActionType::Command);
        s.command = Some("true".to_string());
        let batch = Batch {
            id: "b1".to_string(),
            description: String::new(),
            steps: vec![s],
            requires_approval: false,
            risk_summary: RiskLevel::Low,
        };
        let plan = ExecutionPlan {
            summary: String::new(),
            rationale: None,
            batches: vec![batch.clone()],
            total_estimated_minutes: 0,
            tdd_approach: false,
        };

        let mut skipped = HashSet::new();
        skipped.insert("a".to_string());
        let result = executor.execute_batch(&plan, &batch, &skipped).await;
        assert_eq!(result.step_results[0].status, DeveloperStatus::Skipped);
    }

    #[tokio::test]
    async fn code_step_writes_file_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("out.txt");
        let executor = fake_executor();
        let mut s = step("a", ActionType::Code);
        s.file_path = Some(file_path.to_string_lossy().to_string());
        s.code_change = Some("hello".to_string());
        s.validation_command = Some("true".to_string());

        let result = executor.execute_step(&s).await;
        assert_eq!(result.status, DeveloperStatus::Completed);
        assert_eq!(tokio::fs::read_to_string(&file_path).await.unwrap(), "hello");
    }
}
