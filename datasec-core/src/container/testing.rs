//! 测试用的可编排 ProcessRunner：按 argv 前缀返回预设结果并记录全部调用

use super::command::{ProcessOutput, ProcessRunner};
use crate::Result;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Hook = Arc<dyn Fn(&[String]) + Send + Sync>;

struct Rule {
    prefix: Vec<String>,
    exit_code: i32,
    output: String,
}

#[derive(Default)]
pub(crate) struct RecordingRunner {
    rules: Mutex<Vec<Rule>>,
    hooks: Mutex<Vec<(Vec<String>, Hook)>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl RecordingRunner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 预设响应；多条规则匹配时取前缀最长的一条，未匹配时返回成功的空输出
    pub(crate) fn respond(&self, prefix: &[&str], exit_code: i32, output: &str) {
        lock(&self.rules).push(Rule {
            prefix: prefix.iter().map(|s| s.to_string()).collect(),
            exit_code,
            output: output.to_string(),
        });
    }

    /// 命令执行时的副作用（例如模拟容器写出归档文件）
    pub(crate) fn on_call(&self, prefix: &[&str], hook: impl Fn(&[String]) + Send + Sync + 'static) {
        lock(&self.hooks).push((
            prefix.iter().map(|s| s.to_string()).collect(),
            Arc::new(hook),
        ));
    }

    pub(crate) fn calls(&self) -> Vec<Vec<String>> {
        lock(&self.calls).clone()
    }

    /// 以空格拼接后的调用列表，便于断言
    pub(crate) fn call_lines(&self) -> Vec<String> {
        self.calls().iter().map(|c| c.join(" ")).collect()
    }
}

impl ProcessRunner for RecordingRunner {
    fn run(&self, argv: &[String]) -> Result<ProcessOutput> {
        lock(&self.calls).push(argv.to_vec());

        // 回调在锁外执行，回调 panic 后 Drop 中的恢复命令仍可记录
        let hooks: Vec<Hook> = lock(&self.hooks)
            .iter()
            .filter(|(prefix, _)| argv.starts_with(prefix))
            .map(|(_, hook)| Arc::clone(hook))
            .collect();
        for hook in hooks {
            hook(argv);
        }

        let rules = lock(&self.rules);
        let rule = rules
            .iter()
            .filter(|rule| argv.starts_with(&rule.prefix))
            .max_by_key(|rule| rule.prefix.len());

        Ok(match rule {
            Some(rule) => ProcessOutput {
                exit_code: rule.exit_code,
                output: rule.output.clone(),
            },
            None => ProcessOutput {
                exit_code: 0,
                output: String::new(),
            },
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
