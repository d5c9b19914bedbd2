//! 脚本路由。
//!
//! 启动时扫描 `scripts/*.bns`，交给 [`ScriptEngine`] 编译。每个脚本带有最多 16 个
//! glob 模式；请求到来时按加载顺序、模式声明顺序依次匹配，第一个命中的脚本负责生成
//! 完整的响应字节（包括状态行）。脚本表在启动后不再变化。

use std::fs;
use std::path::Path;

use glob::Pattern;
use log::{debug, error, info, warn};

use crate::{
    exception::Exception,
    param::{MAX_SCRIPT_PATTERNS, SCRIPT_EXTENSION},
    request::Request,
};

/// 编译后的脚本，由脚本引擎持有其内部表示
#[cfg_attr(test, mockall::automock)]
pub trait CompiledScript: Send + Sync {
    /// 针对请求运行脚本，返回完整的响应字节
    fn exec(&self, request: &Request) -> Result<Vec<u8>, Exception>;
}

/// 把脚本源码编译为可执行形式的引擎
pub trait ScriptEngine {
    fn load(&self, source: &[u8]) -> Result<LoadedScript, Exception>;
}

pub struct LoadedScript {
    patterns: Vec<Pattern>,
    program: Box<dyn CompiledScript>,
}

impl LoadedScript {
    /// 超出上限的模式会被丢弃并记录警告
    pub fn new(mut patterns: Vec<Pattern>, program: Box<dyn CompiledScript>) -> Self {
        if patterns.len() > MAX_SCRIPT_PATTERNS {
            warn!(
                "脚本声明了{}个路由模式，只保留前{}个",
                patterns.len(),
                MAX_SCRIPT_PATTERNS
            );
            patterns.truncate(MAX_SCRIPT_PATTERNS);
        }
        Self { patterns, program }
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn matches(&self, true_path: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(true_path))
    }
}

#[derive(Default)]
pub struct ScriptTable {
    scripts: Vec<LoadedScript>,
}

impl ScriptTable {
    pub fn new(scripts: Vec<LoadedScript>) -> Self {
        Self { scripts }
    }

    /// 加载目录下的全部 `.bns` 文件，按文件名排序。
    ///
    /// 目录不存在时返回空表；任何一个脚本加载失败都会中止启动。
    pub fn load_dir(dir: &Path, engine: &dyn ScriptEngine) -> Result<Self, Exception> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("无法打开脚本目录{}：{}", dir.display(), e);
                warn!("请在服务器根目录下创建 scripts、public、cache 三个目录（cache 建议挂载为 ramfs）");
                return Ok(Self::default());
            }
        };

        let mut paths: Vec<_> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                let hidden = p
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map_or(true, |n| n.starts_with('.'));
                !hidden && p.extension().map_or(false, |ext| ext == SCRIPT_EXTENSION) && p.is_file()
            })
            .collect();
        paths.sort();

        let mut scripts = Vec::with_capacity(paths.len());
        for path in paths {
            let source = fs::read(&path).map_err(|e| {
                error!("无法读取脚本{}：{}", path.display(), e);
                Exception::ScriptLoadFailed
            })?;
            let script = engine.load(&source).map_err(|e| {
                error!("无法加载脚本{}：{}", path.display(), e);
                e
            })?;
            info!(
                "已加载脚本{}，路由：{}",
                path.display(),
                script
                    .patterns()
                    .iter()
                    .map(|p| p.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            scripts.push(script);
        }
        Ok(Self { scripts })
    }

    /// 查找第一个匹配 `true_path` 的脚本
    pub fn find(&self, true_path: &str) -> Option<usize> {
        self.scripts.iter().position(|s| s.matches(true_path))
    }

    pub fn exec(&self, index: usize, request: &Request, id: u128) -> Result<Vec<u8>, Exception> {
        let script = self.scripts.get(index).ok_or(Exception::ScriptEngineFailure)?;
        debug!("[ID{}](Script) #{}", id, index);
        script.program.exec(request)
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}
