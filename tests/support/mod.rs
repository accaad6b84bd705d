// ABOUTME: Test support utilities.
// ABOUTME: Scripted fake shells and prompts so every phase runs without SSH or Docker.

use async_trait::async_trait;
use deckhand::config::Config;
use deckhand::prompt::Confirm;
use deckhand::shell::{CommandOutput, Shell, ShellError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Once;
use std::time::Duration;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("deckhand=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// What a scripted command does.
#[derive(Debug, Clone)]
pub enum Reply {
    Output(CommandOutput),
    /// Never finishes on its own; the call times out.
    Hang,
}

impl Reply {
    pub fn ok(stdout: &str) -> Self {
        Reply::Output(CommandOutput {
            exit_code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        })
    }

    pub fn exit(code: u32, stderr: &str) -> Self {
        Reply::Output(CommandOutput {
            exit_code: code,
            stdout: String::new(),
            stderr: stderr.to_string(),
        })
    }
}

struct Rule {
    pattern: String,
    /// Replies in order; the last one repeats.
    replies: VecDeque<Reply>,
}

/// A host that answers commands from a script and records every call.
///
/// Rules match by substring; rules added later take precedence. Commands
/// without a matching rule succeed with empty output.
#[allow(dead_code)]
pub struct FakeShell {
    host: String,
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<String>>,
    inputs: Mutex<Vec<(String, Vec<u8>)>>,
    uploads: Mutex<Vec<(PathBuf, String)>>,
}

#[allow(dead_code)]
impl FakeShell {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            rules: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            inputs: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn on(&self, pattern: &str, stdout: &str) -> &Self {
        self.on_sequence(pattern, vec![Reply::ok(stdout)])
    }

    pub fn on_exit(&self, pattern: &str, code: u32, stderr: &str) -> &Self {
        self.on_sequence(pattern, vec![Reply::exit(code, stderr)])
    }

    pub fn on_hang(&self, pattern: &str) -> &Self {
        self.on_sequence(pattern, vec![Reply::Hang])
    }

    pub fn on_sequence(&self, pattern: &str, replies: Vec<Reply>) -> &Self {
        self.rules.lock().push(Rule {
            pattern: pattern.to_string(),
            replies: replies.into(),
        });
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn called(&self, pattern: &str) -> bool {
        self.count(pattern) > 0
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.contains(pattern)).count()
    }

    /// Index of the first call containing `pattern`.
    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.calls.lock().iter().position(|c| c.contains(pattern))
    }

    pub fn inputs(&self) -> Vec<(String, Vec<u8>)> {
        self.inputs.lock().clone()
    }

    pub fn uploads(&self) -> Vec<(PathBuf, String)> {
        self.uploads.lock().clone()
    }

    fn reply(&self, command: &str) -> Reply {
        self.calls.lock().push(command.to_string());
        let mut rules = self.rules.lock();
        match rules
            .iter_mut()
            .rev()
            .find(|rule| command.contains(&rule.pattern))
        {
            Some(rule) if rule.replies.len() > 1 => rule.replies.pop_front().unwrap(),
            Some(rule) => rule.replies.front().cloned().unwrap_or_else(|| Reply::ok("")),
            None => Reply::ok(""),
        }
    }

    async fn answer(&self, command: &str, timeout: Duration) -> Result<CommandOutput, ShellError> {
        match self.reply(command) {
            Reply::Output(output) => Ok(output),
            Reply::Hang => {
                tokio::time::sleep(timeout).await;
                Err(ShellError::Timeout(timeout))
            }
        }
    }
}

#[async_trait]
impl Shell for FakeShell {
    fn host(&self) -> &str {
        &self.host
    }

    fn default_timeout(&self) -> Duration {
        Duration::from_secs(30)
    }

    async fn exec_with_timeout(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, ShellError> {
        self.answer(command, timeout).await
    }

    async fn exec_with_input(
        &self,
        command: &str,
        input: &[u8],
    ) -> Result<CommandOutput, ShellError> {
        self.inputs.lock().push((command.to_string(), input.to_vec()));
        self.answer(command, self.default_timeout()).await
    }

    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<(), ShellError> {
        self.calls.lock().push(format!("upload {}", remote_path));
        self.uploads
            .lock()
            .push((local_path.to_path_buf(), remote_path.to_string()));
        Ok(())
    }
}

/// Prompt answering from a script and recording the questions.
#[allow(dead_code)]
pub struct ScriptedPrompt {
    interactive: bool,
    answers: Mutex<VecDeque<String>>,
    asked: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl ScriptedPrompt {
    /// Behaves like `--force` or CI: never asks.
    pub fn non_interactive() -> Self {
        Self {
            interactive: false,
            answers: Mutex::new(VecDeque::new()),
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn answering(answers: &[&str]) -> Self {
        Self {
            interactive: true,
            answers: Mutex::new(answers.iter().map(|a| a.to_string()).collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().clone()
    }

    fn next(&self, question: &str) -> Option<String> {
        self.asked.lock().push(question.to_string());
        self.answers.lock().pop_front()
    }
}

impl Confirm for ScriptedPrompt {
    fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn confirm(&self, question: &str) -> bool {
        self.interactive && self.next(question).is_some_and(|a| a == "y")
    }

    fn confirm_typed(&self, question: &str, expected: &str) -> bool {
        self.interactive && self.next(question).is_some_and(|a| a == expected)
    }
}

/// Config for project `shop` deployed to `/opt/shop`, with fast health polling.
#[allow(dead_code)]
pub fn shop_config(state_dir: &Path) -> Config {
    let yaml = format!(
        r#"
project: shop
target:
  host: prod.example.com
  user: deploy
  root: /opt/shop
images:
  - shop-api
  - shop-web
required_files:
  - .env
ports: [3000, 8080]
registry:
  url: registry.example.com
  user: ci
  token: s3cret
backup:
  command: ./scripts/backup.sh
  min_size_bytes: 102400
health:
  settle: 0s
  interval: 10ms
  attempts: 2
  timeout: 5s
  checks:
    - name: api
      url: http://localhost:3000/health
      expect: json:status=healthy
    - name: web
      url: http://localhost:8080/
      expect: http-ok
state_dir: {}
"#,
        state_dir.display()
    );
    Config::from_yaml(&yaml).expect("fixture config parses")
}

/// Remote host where every step of a deployment succeeds and nothing was
/// deployed before.
#[allow(dead_code)]
pub fn healthy_remote() -> FakeShell {
    let remote = FakeShell::new("prod.example.com");
    remote
        .on("test -e", "exists\n")
        .on("docker image inspect", "sha256:1111\n")
        .on("localhost:3000/health", "{\"status\":\"healthy\"}\n200")
        .on("localhost:8080/", "<html></html>\n200")
        .on("du -sb", "204800\n")
        .on("find '/opt/shop/backups'", "/opt/shop/backups/20250101-120000\n");
    remote
}

/// Operator machine at revision `abc1234` with the images already built.
#[allow(dead_code)]
pub fn operator_machine() -> FakeShell {
    let local = FakeShell::new("localhost");
    local
        .on("git rev-parse --short HEAD", "abc1234\n")
        .on("docker image inspect", "sha256:1111\n");
    local
}

/// Make `version` the current version on `remote`, with its images present.
#[allow(dead_code)]
pub fn with_previous(remote: &FakeShell, version: &str) {
    remote
        .on("cat '/opt/shop/.deploy/current_version'", &format!("{}\n", version))
        .on("cat '/opt/shop/.deploy/current_method'", "tar\n");
}
