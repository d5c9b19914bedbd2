use std::fs::{self, File};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, error, warn};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use crate::{exception::Exception, util::temp_sibling};

/// 外部 PHP 解释器桥接。
///
/// 解释器的标准输出写入缓存目录下的 `<key>.html`，标准错误直接继承服务端进程。
/// 参数通过参数向量传递，查询串中的字符不会经过任何 shell。
#[derive(Debug, Clone)]
pub struct PhpBridge {
    binary: String,
    timeout: Duration,
}

impl PhpBridge {
    pub fn new(binary: &str, timeout: Duration) -> Self {
        Self {
            binary: binary.to_string(),
            timeout,
        }
    }

    pub fn run(
        &self,
        source: &Path,
        output: &Path,
        query: Option<&str>,
        id: u128,
    ) -> Result<Bytes, Exception> {
        let tmp = temp_sibling(output);
        let out_file = File::create(&tmp).map_err(|e| {
            error!("[ID{}]无法创建PHP输出文件{}：{}", id, tmp.display(), e);
            Exception::CacheUnwritable
        })?;

        let mut command = Command::new(&self.binary);
        command.arg(source);
        if let Some(arg) = php_argument(query) {
            command.arg(arg);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::from(out_file))
            .stderr(Stdio::inherit());

        let result = self.wait(&mut command, id).and_then(|_| {
            fs::read(&tmp).map(Bytes::from).map_err(|e| {
                error!("[ID{}]无法读取PHP输出{}：{}", id, tmp.display(), e);
                Exception::InterpreterFailure
            })
        });
        match result {
            Ok(content) => {
                if let Err(e) = fs::rename(&tmp, output) {
                    warn!("[ID{}]无法写入PHP输出缓存{}：{}", id, output.display(), e);
                    let _ = fs::remove_file(&tmp);
                }
                Ok(content)
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                Err(e)
            }
        }
    }

    /// 子进程交给等待线程阻塞回收，当前线程只在超时后补发 SIGKILL
    fn wait(&self, command: &mut Command, id: u128) -> Result<(), Exception> {
        let mut child = command.spawn().map_err(|e| {
            error!("[ID{}]无法启动PHP解释器{}：{}", id, self.binary, e);
            Exception::InterpreterUnavailable
        })?;
        let pid = Pid::from_raw(child.id() as i32);

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(child.wait());
        });

        let status = match rx.recv_timeout(self.timeout) {
            Ok(status) => status,
            Err(RecvTimeoutError::Timeout) => {
                error!("[ID{}]PHP解释器运行超过{:?}，强制结束", id, self.timeout);
                if let Err(e) = kill(pid, Signal::SIGKILL) {
                    warn!("[ID{}]无法结束PHP解释器：{}", id, e);
                }
                let _ = rx.recv();
                return Err(Exception::InterpreterTimeout);
            }
            Err(RecvTimeoutError::Disconnected) => {
                error!("[ID{}]PHP等待线程意外退出", id);
                return Err(Exception::InterpreterFailure);
            }
        };

        match status {
            Ok(status) if status.success() => {
                debug!("[ID{}]PHP解释器正常退出", id);
                Ok(())
            }
            Ok(status) => {
                error!("[ID{}]PHP解释器出错：{}", id, status);
                Err(Exception::InterpreterFailure)
            }
            Err(e) => {
                error!("[ID{}]等待PHP解释器时出错：{}", id, e);
                Err(Exception::InterpreterFailure)
            }
        }
    }
}

/// 查询串中的 `&` 替换为空格，作为单个参数传给解释器
fn php_argument(query: Option<&str>) -> Option<String> {
    match query {
        Some(q) if !q.is_empty() => Some(q.replace('&', " ")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_php_argument() {
        assert_eq!(php_argument(None), None);
        assert_eq!(php_argument(Some("")), None);
        assert_eq!(php_argument(Some("a=1")), Some("a=1".to_string()));
        assert_eq!(php_argument(Some("a=1&b=2&c")), Some("a=1 b=2 c".to_string()));
    }

    #[test]
    fn test_missing_interpreter() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("x.php");
        fs::write(&source, b"<?php ?>").unwrap();
        let bridge = PhpBridge::new("/definitely/not/php", Duration::from_secs(1));
        let err = bridge
            .run(&source, &dir.path().join("out.html"), None, 0)
            .unwrap_err();
        assert_eq!(err, Exception::InterpreterUnavailable);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    // 以 sh 充当解释器，脚本把收到的参数回显出来
    #[cfg(unix)]
    mod with_shell {
        use super::*;
        use std::time::Instant;
        use tempfile::TempDir;

        fn script(body: &str) -> (TempDir, std::path::PathBuf) {
            let dir = tempfile::tempdir().unwrap();
            let source = dir.path().join("page.php");
            fs::write(&source, body).unwrap();
            (dir, source)
        }

        fn bridge() -> PhpBridge {
            PhpBridge::new("sh", Duration::from_secs(5))
        }

        #[test]
        fn test_output_is_captured_and_cached() {
            let (dir, source) = script("printf 'argc=%s first=%s' \"$#\" \"$1\"");
            let output = dir.path().join("cpIpage.php.html");
            let content = bridge().run(&source, &output, Some("a=1&b=2"), 0).unwrap();
            assert_eq!(&content[..], b"argc=1 first=a=1 b=2");
            assert_eq!(fs::read(&output).unwrap(), b"argc=1 first=a=1 b=2");
        }

        #[test]
        fn test_no_query_passes_no_argument() {
            let (dir, source) = script("printf '%s' \"$#\"");
            let content = bridge()
                .run(&source, &dir.path().join("out.html"), None, 0)
                .unwrap();
            assert_eq!(&content[..], b"0");
        }

        #[test]
        fn test_query_is_not_shell_interpreted() {
            let (dir, source) = script("printf '%s' \"$1\"");
            let marker = dir.path().join("pwned");
            let query = format!("x;touch%20{}&$(touch {})", marker.display(), marker.display());
            let content = bridge()
                .run(&source, &dir.path().join("out.html"), Some(&query), 0)
                .unwrap();
            assert_eq!(content, Bytes::from(query.replace('&', " ")));
            assert!(!marker.exists());
        }

        #[test]
        fn test_nonzero_exit_is_failure() {
            let (dir, source) = script("echo partial; exit 3");
            let output = dir.path().join("out.html");
            let err = bridge().run(&source, &output, None, 0).unwrap_err();
            assert_eq!(err, Exception::InterpreterFailure);
            assert!(!output.exists());
        }

        #[test]
        fn test_quick_exit_returns_before_deadline() {
            let (dir, source) = script("printf done");
            let bridge = PhpBridge::new("sh", Duration::from_secs(30));
            let started = Instant::now();
            let content = bridge
                .run(&source, &dir.path().join("out.html"), None, 0)
                .unwrap();
            assert_eq!(&content[..], b"done");
            assert!(started.elapsed() < Duration::from_secs(10));
        }

        #[test]
        fn test_timeout_kills_interpreter() {
            let (dir, source) = script("sleep 5");
            let bridge = PhpBridge::new("sh", Duration::from_millis(100));
            let started = Instant::now();
            let err = bridge
                .run(&source, &dir.path().join("out.html"), None, 0)
                .unwrap_err();
            assert_eq!(err, Exception::InterpreterTimeout);
            assert!(started.elapsed() < Duration::from_secs(4));
        }
    }
}
