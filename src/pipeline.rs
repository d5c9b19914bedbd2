//! 单个请求从原始字节到响应字节的处理流程。
//!
//! 解析请求行 -> 脚本路由 -> 静态文件 / PHP。任何一步失败都转为对应状态码的错误页。
//! 这里的工作全部是同步的文件系统与子进程操作，由调用方放到阻塞线程池中执行。

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info, warn};

use crate::{
    cache::DiskCache,
    config::ServerConfig,
    error_page::ErrorPages,
    escape::escape,
    exception::Exception,
    param::HttpRequestMethod,
    php::PhpBridge,
    request::Request,
    response::Response,
    script::ScriptTable,
};

pub struct Pipeline {
    config: Arc<ServerConfig>,
    scripts: Arc<ScriptTable>,
    loader: DiskCache,
    php: PhpBridge,
    errors: ErrorPages,
}

impl Pipeline {
    pub fn new(config: Arc<ServerConfig>, scripts: Arc<ScriptTable>) -> Self {
        let tunables = config.tunables();
        Self {
            loader: DiskCache::new(config.disable_cache()),
            php: PhpBridge::new(tunables.php_binary(), tunables.php_timeout()),
            errors: ErrorPages::new(&config),
            config,
            scripts,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// 处理一次读取到的请求字节，返回要写回客户端的全部字节
    pub fn respond(&self, buffer: &[u8], id: u128) -> Vec<u8> {
        let start_time = Instant::now();

        let request = match Request::try_from(buffer, id, &self.config) {
            Ok(request) => request,
            Err(e) => {
                warn!("[ID{}]解析HTTP请求失败：{}", id, e);
                return self.errors.render(e.status_code(), id).as_bytes();
            }
        };
        debug!("[ID{}]成功解析HTTP请求", id);

        if let Some(index) = self.scripts.find(request.true_path()) {
            let bytes = match self.scripts.exec(index, &request, id) {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!("[ID{}]脚本执行失败：{}", id, e);
                    self.errors.render(500, id).as_bytes()
                }
            };
            info!(
                "[ID{}] {}, {}, {}, (Script)",
                id,
                request.version(),
                request.path(),
                request.method()
            );
            return bytes;
        }

        let response = match self.serve_file(&request, id) {
            Ok(response) => response,
            Err(e) => {
                warn!("[ID{}]{}：{}", id, request.true_path(), e);
                self.errors.render(e.status_code(), id)
            }
        };
        debug!(
            "[ID{}]HTTP响应构建完成，服务端用时{}ms。",
            id,
            start_time.elapsed().as_millis()
        );
        info!(
            "[ID{}] {}, {}, {}, {}, {}",
            id,
            request.version(),
            request.path(),
            request.method(),
            response.status_code(),
            response.information(),
        );
        response.as_bytes()
    }

    fn serve_file(&self, request: &Request, id: u128) -> Result<Response, Exception> {
        let true_path = request.true_path();
        if true_path.split('/').any(|c| c == "..") {
            return Err(Exception::PathTraversal);
        }

        if request.method() == HttpRequestMethod::Options {
            return Ok(Response::options());
        }

        let public_path = self.config.public_dir().join(true_path.trim_start_matches('/'));
        if public_path.is_dir() {
            debug!("[ID{}]{}是目录", id, public_path.display());
            return Err(Exception::SourceUnreadable(std::io::ErrorKind::NotFound));
        }
        // 即使缓存里还有副本，源文件不可读时也不再提供
        if let Err(e) = File::open(&public_path) {
            debug!("[ID{}]无法打开{}：{}", id, public_path.display(), e);
            return Err(Exception::from_source_error(&e));
        }

        let key = escape(true_path.as_bytes());
        let cache_path = self.config.cache_dir().join(&key);
        let mut content = self.loader.load(&public_path, &cache_path, id)?;

        if true_path.ends_with(".php") {
            let source: PathBuf = if self.loader.disabled() {
                cache_path
            } else {
                public_path
            };
            let output = self.config.cache_dir().join(format!("{}.html", key));
            content = self.php.run(&source, &output, request.query(), id)?;
        }

        let mut response = Response::from_content(content);
        if request.method() == HttpRequestMethod::Head {
            response.strip_content();
        }
        Ok(response)
    }
}
