//! 状态码到错误页的解析。
//!
//! 优先使用 `public/NNN.html`（经由磁盘缓存加载），找不到或读取失败时退回内置文字。

use std::path::PathBuf;

use bytes::Bytes;
use log::debug;

use crate::{
    cache::DiskCache, config::ServerConfig, escape::escape, response::Response, util::HtmlBuilder,
};

#[derive(Debug, Clone)]
pub struct ErrorPages {
    public_dir: PathBuf,
    cache_dir: PathBuf,
    loader: DiskCache,
    overrides_disabled: bool,
}

impl ErrorPages {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            public_dir: config.public_dir(),
            cache_dir: config.cache_dir(),
            loader: DiskCache::new(config.disable_cache()),
            overrides_disabled: config.disable_error_pages(),
        }
    }

    /// 构建状态码对应的完整响应
    pub fn render(&self, status: u16, id: u128) -> Response {
        let body = self
            .load_override(status, id)
            .unwrap_or_else(|| Bytes::from(HtmlBuilder::from_status_code(status).build()));
        let mut response = Response::from_content(body);
        response.set_code(status);
        response
    }

    fn load_override(&self, status: u16, id: u128) -> Option<Bytes> {
        if self.overrides_disabled {
            return None;
        }
        let name = format!("/{:03}.html", status);
        let public_path = self.public_dir.join(&name[1..]);
        let cache_path = self.cache_dir.join(escape(name.as_bytes()));
        match self.loader.load(&public_path, &cache_path, id) {
            Ok(content) => Some(content),
            Err(e) => {
                debug!("[ID{}]没有可用的{}：{}，使用内置错误页", id, name, e);
                None
            }
        }
    }
}
