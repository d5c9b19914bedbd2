// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求处理模块
//!
//! 负责将 TCP 流中读取的原始字节解析为强类型的 `Request` 结构体：
//! 1. 请求行（Request-Line）的解析（方法、路径、协议）。
//! 2. 根路径 `/` 到首页文件的重定向。
//! 3. 路径与查询串的拆分。
//!
//! 请求头与请求体会被读入，但不做解析。

use std::path::Path;

use log::{debug, error};

use crate::{config::ServerConfig, exception::Exception, param::*};

/// 表示一个已解析的 HTTP 请求行。
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// HTTP 请求方法
    method: HttpRequestMethod,
    /// 请求路径（包含查询字符串）
    path: String,
    /// 去掉查询字符串后的路径
    true_path: String,
    /// `?` 之后的部分
    query: Option<String>,
    /// 客户端发送的协议标记，原样保存
    protocol: String,
    version: HttpVersion,
}

impl Request {
    /// 从原始字节缓冲区解析请求行。
    ///
    /// 检查顺序：请求行是否完整 -> UTF-8 -> 三段式 -> 协议 -> 方法。
    /// 通过校验后对 `/` 应用首页重定向（除非配置禁用）。
    pub fn try_from(buffer: &[u8], id: u128, config: &ServerConfig) -> Result<Self, Exception> {
        let line = first_line(buffer).ok_or_else(|| {
            error!("[ID{}]请求行超过{}字节", id, MAX_REQUEST_SIZE);
            Exception::RequestTooLarge
        })?;

        let line = std::str::from_utf8(line).map_err(|_| {
            error!("[ID{}]无法解析HTTP请求", id);
            Exception::RequestIsNotUtf8
        })?;

        let parts: Vec<&str> = line.split(' ').filter(|s| !s.is_empty()).collect();
        if parts.len() < 3 {
            debug!("[ID{}]HTTP/0.9风格的请求行：{:?}", id, line);
            return Err(Exception::MalformedRequest);
        }
        let (verb, raw_path, protocol) = (parts[0], parts[1], parts[2]);

        let version = match HttpVersion::from_token(protocol) {
            Some(v) => v,
            None => {
                debug!("[ID{}]不支持的协议：{}", id, protocol);
                return Err(Exception::UnsupportedProtocol);
            }
        };

        let method = match HttpRequestMethod::from_token(verb) {
            Some(m) => m,
            None => {
                debug!("[ID{}]无法识别的请求方法：{}", id, verb);
                return Err(Exception::UnknownVerb);
            }
        };

        let mut path = raw_path.to_string();
        if !config.disable_redirect() && path == "/" {
            path = resolve_index(&config.public_dir(), id);
        }

        let (true_path, query) = match path.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (path.clone(), None),
        };

        Ok(Self {
            method,
            path,
            true_path,
            query,
            protocol: protocol.to_string(),
            version,
        })
    }
}

/// 取出第一行（不含行尾）。缓冲区已满却没有换行时返回 `None`
fn first_line(buffer: &[u8]) -> Option<&[u8]> {
    match buffer.iter().position(|&b| b == b'\n') {
        Some(end) => {
            let line = &buffer[..end];
            Some(line.strip_suffix(b"\r").unwrap_or(line))
        }
        None if buffer.len() >= MAX_REQUEST_SIZE => None,
        None => Some(buffer),
    }
}

/// 依次查找 `index.html`、`index.php`，都不存在时保持 `/`
fn resolve_index(public_dir: &Path, id: u128) -> String {
    for candidate in INDEX_CANDIDATES {
        if public_dir.join(&candidate[1..]).is_file() {
            debug!("[ID{}]重定向到{}", id, candidate);
            return candidate.to_string();
        }
    }
    debug!("[ID{}]没有找到首页文件", id);
    "/".to_string()
}

// --- Getter 访问器实现 ---

impl Request {
    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }

    /// 获取请求路径（含查询参数，已应用首页重定向）
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn true_path(&self) -> &str {
        &self.true_path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn version(&self) -> HttpVersion {
        self.version
    }
}
