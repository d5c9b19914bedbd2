use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

use crate::param::ERROR_TEXTS;

pub struct HtmlBuilder {
    heading: String,
    body: String,
}

impl HtmlBuilder {
    /// 没有默认说明文字的状态码只生成标题
    pub fn from_status_code(code: u16) -> Self {
        let heading = format!("Error {:03}", code);
        let body = match ERROR_TEXTS.get(&code) {
            Some(d) => format!("<p>{}</p>", d),
            None => String::new(),
        };
        Self { heading, body }
    }

    pub fn build(&self) -> String {
        format!(
            "<html><body><h1>{}</h1>{}</body></html>",
            self.heading, self.body
        )
    }
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// 生成与 `path` 同目录的唯一临时文件名，用于先写后重命名
pub fn temp_sibling(path: &Path) -> PathBuf {
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("entry"));
    name.push(format!(".{}.{}.tmp", std::process::id(), n));
    path.with_file_name(name)
}

lazy_static! {
    static ref PHP_VERSION: Regex = Regex::new(r"PHP (\d+\.\d+\.\d+)").unwrap();
}

/// 从 `php -v` 的输出中提取版本号
pub fn parse_php_version(output: &str) -> Option<&str> {
    PHP_VERSION
        .captures(output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// 探测 PHP 解释器。找不到解释器时返回 `None`
pub fn probe_php(binary: &str) -> Option<String> {
    let output = Command::new(binary).arg("-v").output().ok()?;
    if !output.status.success() {
        debug!("{} -v 以非零状态退出", binary);
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Some(
        parse_php_version(&stdout)
            .unwrap_or("unknown")
            .to_string(),
    )
}
